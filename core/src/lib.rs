// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Core types shared by the logvault crates.
//!
//! * [`Error`] and [`ErrorKind`] describe every failure of the store and its bridges.
//! * [`Trap`] receives errors and warnings that cannot be returned to a caller.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod error;
pub mod trap;

pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::trap::Trap;
