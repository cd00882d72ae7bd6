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

//! A bridge to forward logs from the `log` crate to a logvault [`LogStore`].
//!
//! # Example
//!
//! ```
//! use logvault_bridge_log::ArchiveLogger;
//! use logvault_store::LogStore;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = LogStore::builder(dir.path()).build().unwrap();
//!
//! logvault_bridge_log::setup(ArchiveLogger::new(store).filter(log::LevelFilter::Info));
//!
//! log::info!("This line ends up in today's active log file.");
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use std::fmt::Write;
use std::sync::Mutex;
use std::sync::MutexGuard;

use jiff::Zoned;
use log::LevelFilter;
use logvault_core::Error;
use logvault_core::Trap;
use logvault_store::LogStore;

/// A [`log::Log`] implementation appending every enabled record to a [`LogStore`].
///
/// Records are rendered as `<time> <LEVEL> <target>: <message>`, where the time is taken from
/// the store's clock and shown in the store's time zone. Each record runs one append and, if the
/// store's trigger says so, one sweep while holding the store lock. Errors are sent to the
/// store's trap.
#[derive(Debug)]
pub struct ArchiveLogger {
    store: Mutex<LogStore>,
    filter: LevelFilter,
}

impl ArchiveLogger {
    /// Create a logger accepting records of every level.
    pub fn new(store: LogStore) -> Self {
        Self {
            store: Mutex::new(store),
            filter: LevelFilter::Trace,
        }
    }

    /// Set the most verbose level accepted by this logger.
    ///
    /// Default to [`LevelFilter::Trace`].
    pub fn filter(mut self, filter: LevelFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Sweep the underlying store; useful with a manual archive trigger.
    pub fn sweep(&self) -> Result<(), Error> {
        self.store().sweep()
    }

    /// Consume the logger and return the underlying store.
    pub fn into_store(self) -> LogStore {
        self.store.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn store(&self) -> MutexGuard<'_, LogStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn format_record(record: &log::Record, time: &Zoned) -> String {
    let mut text = String::new();
    let time = time.strftime("%Y-%m-%dT%H:%M:%S.%6f%:z");
    let level = record.level();
    let target = record.target();
    let message = record.args();
    // SAFETY: write to a string always succeeds
    write!(&mut text, "{time} {level:>5} {target}: {message}").unwrap();
    text
}

impl log::Log for ArchiveLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &log::Record) {
        if !log::Log::enabled(self, record.metadata()) {
            return;
        }

        let mut store = self.store();
        let now = store.now();
        let text = format_record(record, &now.to_zoned(store.time_zone().clone()));
        if let Err(err) = store.append(now, &text) {
            store.trap().trap(&err);
        }
    }

    // every append closes its file
    fn flush(&self) {}
}

/// Set up the log crate global logger.
///
/// This function calls [`log::set_boxed_logger`] with the given [`ArchiveLogger`] and sets the
/// global maximum log level to the logger's filter.
///
/// # Errors
///
/// Return an error if the log crate global logger has already been set.
pub fn try_setup(logger: ArchiveLogger) -> Result<(), log::SetLoggerError> {
    let filter = logger.filter;
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(filter);
    Ok(())
}

/// Set up the log crate global logger.
///
/// This function will panic if it is called more than once, or if another library has already
/// initialized the log crate global logger.
///
/// # Panics
///
/// Panic if the log crate global logger has already been set.
pub fn setup(logger: ArchiveLogger) {
    try_setup(logger).expect(
        "logvault_bridge_log::setup must be called before the log crate global logger initialized",
    )
}
