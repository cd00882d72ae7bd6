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

use jiff::SignedDuration;
use jiff::Timestamp;

/// Decides when an append is followed by a sweep of the active directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveTrigger {
    /// Sweep after every successful append.
    #[default]
    EveryWrite,
    /// Sweep after an append only if the interval elapsed since the last completed sweep.
    ///
    /// The first append of a store always sweeps. No background thread is involved, so an idle
    /// store is never swept.
    Interval(SignedDuration),
    /// Never sweep on append. Call [`LogStore::sweep`](crate::LogStore::sweep) explicitly.
    Manual,
}

impl ArchiveTrigger {
    /// The earliest instant an append may sweep again, given a sweep completed at `now`.
    ///
    /// `None` means there is no schedule to honor.
    pub(crate) fn next_sweep_timestamp(&self, now: Timestamp) -> Option<Timestamp> {
        match *self {
            ArchiveTrigger::Interval(interval) => now.checked_add(interval).ok(),
            ArchiveTrigger::EveryWrite | ArchiveTrigger::Manual => None,
        }
    }

    pub(crate) fn should_sweep_on_write(&self, now: Timestamp, next: Option<Timestamp>) -> bool {
        match *self {
            ArchiveTrigger::EveryWrite => true,
            ArchiveTrigger::Interval(_) => next.is_none_or(|ts| now >= ts),
            ArchiveTrigger::Manual => false,
        }
    }
}
