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

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use jiff::SignedDuration;
use jiff::Span;
use jiff::Timestamp;
use jiff::civil::Date;
use jiff::tz::TimeZone;
use logvault_core::Error;
use logvault_core::ErrorKind;
use logvault_core::Trap;
use logvault_core::trap::DefaultTrap;

use crate::clock::Clock;
use crate::trigger::ArchiveTrigger;

/// Extension of every active log file.
pub const ACTIVE_EXTENSION: &str = "AU_LOG";
/// Suffix appended to an archive path that is already occupied.
pub const COLLISION_MARKER: &str = "_X";
/// Name of the directory holding active log files.
pub const ACTIVE_DIR: &str = "unarchived";
/// Name of the directory holding compressed log files.
pub const ARCHIVE_DIR: &str = "archived";
/// Default number of days before a day file is archived.
pub const DEFAULT_ARCHIVE_THRESHOLD_DAYS: u32 = 30;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// A builder for configuring [`LogStore`].
#[derive(Debug)]
pub struct LogStoreBuilder {
    // required
    basedir: PathBuf,

    // has default
    archive_threshold_days: u32,
    time_zone: TimeZone,
    trigger: ArchiveTrigger,
    clock: Clock,
    trap: Box<dyn Trap>,
}

impl LogStoreBuilder {
    /// Creates a new [`LogStoreBuilder`] rooted at `basedir`.
    #[must_use]
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
            archive_threshold_days: DEFAULT_ARCHIVE_THRESHOLD_DAYS,
            time_zone: TimeZone::system(),
            trigger: ArchiveTrigger::default(),
            clock: Clock::default(),
            trap: Box::new(DefaultTrap::default()),
        }
    }

    /// Set the number of days after which a day file is archived.
    ///
    /// Default to [`DEFAULT_ARCHIVE_THRESHOLD_DAYS`].
    #[must_use]
    pub fn archive_threshold_days(mut self, days: u32) -> Self {
        self.archive_threshold_days = days;
        self
    }

    /// Set the time zone used to derive calendar dates from timestamps.
    ///
    /// Default to the system time zone.
    #[must_use]
    pub fn time_zone(mut self, time_zone: TimeZone) -> Self {
        self.time_zone = time_zone;
        self
    }

    /// Set when appends trigger a sweep.
    ///
    /// Default to [`ArchiveTrigger::EveryWrite`].
    #[must_use]
    pub fn trigger(mut self, trigger: ArchiveTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Set the trap receiving warnings raised during sweeps.
    ///
    /// Default to [`DefaultTrap`].
    #[must_use]
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    #[cfg(test)]
    pub(crate) fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the [`LogStore`].
    ///
    /// # Errors
    ///
    /// Return an error if either:
    ///
    /// * The active or archive directory cannot be created.
    /// * The archive threshold is out of range for calendar arithmetic.
    /// * The trigger interval is negative.
    pub fn build(self) -> Result<LogStore, Error> {
        let Self {
            basedir,
            archive_threshold_days,
            time_zone,
            trigger,
            clock,
            trap,
        } = self;

        let threshold = Span::new()
            .try_days(i64::from(archive_threshold_days))
            .map_err(|err| {
                Error::new(ErrorKind::Unexpected, "archive threshold is out of range")
                    .with_context("days", archive_threshold_days)
                    .with_source(err)
            })?;

        if let ArchiveTrigger::Interval(interval) = trigger {
            if interval < SignedDuration::ZERO {
                return Err(
                    Error::new(ErrorKind::Unexpected, "archive interval must not be negative")
                        .with_context("interval", interval),
                );
            }
        }

        let active_dir = basedir.join(ACTIVE_DIR);
        let archive_dir = basedir.join(ARCHIVE_DIR);
        for dir in [&active_dir, &archive_dir] {
            fs::create_dir_all(dir).map_err(|err| {
                Error::new(ErrorKind::Io, "failed to create log directory")
                    .with_context("path", dir.display())
                    .with_source(err)
            })?;
        }

        Ok(LogStore {
            active_dir,
            archive_dir,
            archive_threshold_days,
            threshold,
            time_zone,
            trigger,
            next_sweep_timestamp: None,
            clock,
            trap,
        })
    }
}

/// A base directory of day-partitioned active log files and their gzip archives.
///
/// The store is synchronous and keeps no lock: [`append`](LogStore::append) and
/// [`sweep`](LogStore::sweep) take `&mut self`, and several processes sharing one base directory
/// are not coordinated. Concurrent writers interleave per append and concurrent sweeps may race
/// on the same stale file.
#[derive(Debug)]
pub struct LogStore {
    pub(crate) active_dir: PathBuf,
    pub(crate) archive_dir: PathBuf,
    archive_threshold_days: u32,
    pub(crate) threshold: Span,
    pub(crate) time_zone: TimeZone,
    trigger: ArchiveTrigger,
    pub(crate) next_sweep_timestamp: Option<Timestamp>,
    pub(crate) clock: Clock,
    pub(crate) trap: Box<dyn Trap>,
}

impl LogStore {
    /// Create a [`LogStoreBuilder`] rooted at `basedir`.
    pub fn builder(basedir: impl Into<PathBuf>) -> LogStoreBuilder {
        LogStoreBuilder::new(basedir)
    }

    /// The directory holding active log files.
    pub fn active_dir(&self) -> &Path {
        &self.active_dir
    }

    /// The directory holding compressed log files.
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// The configured archive threshold in days.
    pub fn archive_threshold_days(&self) -> u32 {
        self.archive_threshold_days
    }

    /// The time zone used to derive calendar dates.
    pub fn time_zone(&self) -> &TimeZone {
        &self.time_zone
    }

    /// The configured archive trigger.
    pub fn trigger(&self) -> ArchiveTrigger {
        self.trigger
    }

    /// The trap receiving warnings of this store.
    pub fn trap(&self) -> &dyn Trap {
        self.trap.as_ref()
    }

    /// The current time according to the store's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// The path of the active log file for `date`.
    pub fn active_path(&self, date: Date) -> PathBuf {
        let date = date.strftime(DATE_FORMAT);
        self.active_dir.join(format!("{date}.{ACTIVE_EXTENSION}"))
    }

    /// Append `text` and a trailing newline to the active file of `timestamp`'s date.
    ///
    /// The file is created when absent. Once the line is written, the store sweeps the active
    /// directory if its [`ArchiveTrigger`] says so.
    ///
    /// # Errors
    ///
    /// Return an [`ErrorKind::Io`] error if the file cannot be opened or written, or any error of
    /// the triggered [`sweep`](LogStore::sweep). A sweep error is returned after the line has been
    /// persisted.
    pub fn append(&mut self, timestamp: Timestamp, text: &str) -> Result<(), Error> {
        let date = Clock::wall_time(timestamp, &self.time_zone).date();
        let path = self.active_path(date);

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| {
                Error::new(ErrorKind::Io, "failed to open active log")
                    .with_context("path", path.display())
                    .with_source(err)
            })?;
        file.write_all(line.as_bytes()).map_err(|err| {
            Error::new(ErrorKind::Io, "failed to write active log")
                .with_context("path", path.display())
                .with_source(err)
        })?;
        drop(file);

        let now = self.clock.now();
        if self
            .trigger
            .should_sweep_on_write(now, self.next_sweep_timestamp)
        {
            self.sweep_at(now)?;
        }

        Ok(())
    }

    pub(crate) fn on_sweep_completed(&mut self, now: Timestamp) {
        self.next_sweep_timestamp = self.trigger.next_sweep_timestamp(now);
    }
}
