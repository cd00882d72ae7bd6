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

use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::TimeZone;

/// Where a store reads "now" from. Tests pin it to a fixed instant.
#[derive(Debug, Default)]
pub(crate) struct Clock {
    #[cfg(test)]
    pinned: Option<Timestamp>,
}

impl Clock {
    #[cfg(test)]
    pub(crate) fn pinned(now: Timestamp) -> Clock {
        Clock { pinned: Some(now) }
    }

    #[cfg(test)]
    pub(crate) fn set_now(&mut self, now: Timestamp) {
        self.pinned = Some(now);
    }

    #[cfg(not(test))]
    pub(crate) fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    #[cfg(test)]
    pub(crate) fn now(&self) -> Timestamp {
        self.pinned.unwrap_or_else(Timestamp::now)
    }

    /// The wall clock reading of `ts` in `tz`.
    pub(crate) fn wall_time(ts: Timestamp, tz: &TimeZone) -> DateTime {
        tz.to_datetime(ts)
    }
}
