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

//! Day-partitioned log files with threshold based gzip archival.
//!
//! A [`LogStore`] owns a base directory with two subdirectories:
//!
//! * `unarchived/` holds one active file per calendar day, named `<YYYY-MM-DD>.AU_LOG`.
//! * `archived/` holds the gzip of each former active file, named `<YYYY-MM-DD>.AU_LOG.gz`, or
//!   `<YYYY-MM-DD>.AU_LOG.gz_X` when the primary name is already taken.
//!
//! [`LogStore::append`] writes one line to the file of the timestamp's date and, by default,
//! sweeps the active directory right away; see [`ArchiveTrigger`] for the alternatives.
//!
//! # Example
//!
//! ```
//! use jiff::Timestamp;
//! use logvault_store::LogStore;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut store = LogStore::builder(dir.path())
//!     .archive_threshold_days(7)
//!     .build()
//!     .unwrap();
//!
//! store.append(Timestamp::now(), "service started").unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use self::store::ACTIVE_DIR;
pub use self::store::ACTIVE_EXTENSION;
pub use self::store::ARCHIVE_DIR;
pub use self::store::COLLISION_MARKER;
pub use self::store::DEFAULT_ARCHIVE_THRESHOLD_DAYS;
pub use self::store::LogStore;
pub use self::store::LogStoreBuilder;
pub use self::trigger::ArchiveTrigger;

mod archive;
mod clock;
mod store;
mod trigger;
