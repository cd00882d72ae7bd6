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
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use jiff::Timestamp;
use jiff::civil::Date;
use jiff::civil::DateTime;
use jiff::civil::Time;
use logvault_core::Error;
use logvault_core::ErrorKind;

use crate::clock::Clock;
use crate::store::ACTIVE_EXTENSION;
use crate::store::COLLISION_MARKER;
use crate::store::DATE_FORMAT;
use crate::store::LogStore;

#[derive(Debug)]
struct ActiveLogFile {
    filepath: PathBuf,
    date: Date,
}

impl ActiveLogFile {
    // a day file is as old as its first instant
    fn datetime(&self) -> DateTime {
        self.date.to_datetime(Time::midnight())
    }
}

/// Parse the date out of an active log filename `<YYYY-MM-DD>.AU_LOG`.
fn parse_active_filename(filename: &str) -> Result<Date, Error> {
    let malformed = || {
        Error::new(ErrorKind::Parse, "malformed active log filename")
            .with_context("filename", filename)
    };

    let stem = filename
        .strip_suffix(ACTIVE_EXTENSION)
        .and_then(|name| name.strip_suffix('.'))
        .ok_or_else(malformed)?;
    let date = Date::strptime(DATE_FORMAT, stem).map_err(|err| malformed().with_source(err))?;

    // reject lenient forms such as `2024-1-1`
    if date.strftime(DATE_FORMAT).to_string() != stem {
        return Err(malformed());
    }

    Ok(date)
}

impl LogStore {
    /// Sweep the active directory once, archiving every day file old enough.
    ///
    /// A file dated `D` is eligible when `D` at 00:00 is at or before `now - threshold days`,
    /// where the cutoff keeps its time of day.
    ///
    /// Every eligible file is compressed into `<archive>/<date>.AU_LOG.gz`. If that path is taken,
    /// the archive goes to `<date>.AU_LOG.gz_X` instead, deleting a stray file already there and
    /// reporting a [`ErrorKind::CollisionOverwrite`] warning to the trap. The compressed copy is
    /// written, synced and verified before the source is deleted, so an interruption may leave a
    /// duplicate but never loses the source. A partial archive left behind by a crash is not
    /// detected by later sweeps.
    ///
    /// # Errors
    ///
    /// Return an [`ErrorKind::Parse`] error before touching any file if a name in the active
    /// directory is malformed. Otherwise the first I/O or verification error aborts the sweep;
    /// files archived before it stay archived and the rest stay active.
    pub fn sweep(&mut self) -> Result<(), Error> {
        let now = self.clock.now();
        self.sweep_at(now)
    }

    pub(crate) fn sweep_at(&mut self, now: Timestamp) -> Result<(), Error> {
        let cutoff = self.archive_cutoff(now)?;

        let files = {
            let mut files = self.list_active_files()?;
            files.retain(|file| file.datetime() <= cutoff);
            files.sort_by_key(|file| file.date);
            files
        };

        for file in files.iter() {
            self.archive_file(file)?;
        }

        self.on_sweep_completed(now);
        Ok(())
    }

    fn archive_cutoff(&self, now: Timestamp) -> Result<DateTime, Error> {
        let now = Clock::wall_time(now, &self.time_zone);
        now.checked_sub(self.threshold).map_err(|err| {
            Error::new(ErrorKind::Unexpected, "failed to compute archive cutoff")
                .with_context("now", now)
                .with_source(err)
        })
    }

    fn list_active_files(&self) -> Result<Vec<ActiveLogFile>, Error> {
        let read_dir = fs::read_dir(&self.active_dir).map_err(|err| {
            Error::new(ErrorKind::Io, "failed to read active log dir")
                .with_context("path", self.active_dir.display())
                .with_source(err)
        })?;

        let mut files = vec![];
        for entry in read_dir {
            let entry = entry.map_err(|err| {
                Error::new(ErrorKind::Io, "failed to read active log dir entry")
                    .with_context("path", self.active_dir.display())
                    .with_source(err)
            })?;

            let filename = entry.file_name();
            let Some(filename) = filename.to_str() else {
                return Err(
                    Error::new(ErrorKind::Parse, "active log filename is not valid UTF-8")
                        .with_context("filename", filename.to_string_lossy()),
                );
            };

            let date = parse_active_filename(filename)?;
            files.push(ActiveLogFile {
                filepath: entry.path(),
                date,
            });
        }

        Ok(files)
    }

    fn resolve_archive_path(&self, date: Date) -> Result<PathBuf, Error> {
        let filename = format!("{}.{ACTIVE_EXTENSION}.gz", date.strftime(DATE_FORMAT));
        let primary = self.archive_dir.join(&filename);
        if !path_exists(&primary)? {
            return Ok(primary);
        }

        let collision = self.archive_dir.join(format!("{filename}{COLLISION_MARKER}"));
        if path_exists(&collision)? {
            fs::remove_file(&collision).map_err(|err| {
                Error::new(ErrorKind::Io, "failed to remove stray collision archive")
                    .with_context("path", collision.display())
                    .with_source(err)
            })?;

            let warning = Error::new(
                ErrorKind::CollisionOverwrite,
                "overwrote a previous collision archive",
            )
            .with_context("path", collision.display());
            self.trap.trap(&warning);
        }

        Ok(collision)
    }

    fn archive_file(&self, file: &ActiveLogFile) -> Result<(), Error> {
        self.archive_file_with(file, write_archive)
    }

    fn archive_file_with<W>(&self, file: &ActiveLogFile, write: W) -> Result<(), Error>
    where
        W: FnOnce(File, &[u8]) -> io::Result<()>,
    {
        let source = &file.filepath;
        let data = fs::read(source).map_err(|err| {
            Error::new(ErrorKind::Io, "failed to read active log")
                .with_context("path", source.display())
                .with_source(err)
        })?;

        let target = self.resolve_archive_path(file.date)?;
        // an open failure leaves the target alone; it is not ours to remove
        let archive = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .map_err(|err| {
                Error::new(ErrorKind::Io, "failed to create archive")
                    .with_context("path", target.display())
                    .with_source(err)
            })?;

        if let Err(err) = write(archive, &data) {
            let _ = fs::remove_file(&target);
            return Err(Error::new(ErrorKind::Io, "failed to write archive")
                .with_context("path", target.display())
                .with_source(err));
        }
        if let Err(err) = verify_archive(&target, &data) {
            let _ = fs::remove_file(&target);
            return Err(err.with_context("path", target.display()));
        }

        fs::remove_file(source).map_err(|err| {
            Error::new(ErrorKind::Io, "failed to remove archived active log")
                .with_context("path", source.display())
                .with_source(err)
        })
    }
}

fn path_exists(path: &Path) -> Result<bool, Error> {
    fs::exists(path).map_err(|err| {
        Error::new(ErrorKind::Io, "failed to check archive path")
            .with_context("path", path.display())
            .with_source(err)
    })
}

fn write_archive(file: File, data: &[u8]) -> io::Result<()> {
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(data)?;
    let file = encoder.finish()?;
    file.sync_all()
}

fn verify_archive(path: &Path, data: &[u8]) -> Result<(), Error> {
    let mut decoded = Vec::with_capacity(data.len());
    File::open(path)
        .and_then(|file| GzDecoder::new(file).read_to_end(&mut decoded))
        .map_err(|err| Error::new(ErrorKind::Io, "failed to read back archive").with_source(err))?;

    if decoded != data {
        return Err(Error::new(
            ErrorKind::Unexpected,
            "archive content does not match the active log",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::fs::File;
    use std::io;
    use std::io::Read;
    use std::io::Write;
    use std::path::Path;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::sync::Mutex;

    use flate2::read::GzDecoder;
    use jiff::Timestamp;
    use jiff::civil::date;
    use jiff::tz::TimeZone;
    use logvault_core::Error;
    use logvault_core::ErrorKind;
    use logvault_core::Trap;
    use rand::Rng;
    use rand::distr::Alphanumeric;
    use tempfile::TempDir;

    use super::parse_active_filename;
    use super::write_archive;
    use crate::ArchiveTrigger;
    use crate::LogStore;
    use crate::clock::Clock;

    #[derive(Debug, Clone, Default)]
    struct RecordingTrap {
        kinds: Arc<Mutex<Vec<ErrorKind>>>,
    }

    impl Trap for RecordingTrap {
        fn trap(&self, err: &Error) {
            self.kinds.lock().unwrap().push(err.kind());
        }
    }

    fn manual_store(dir: &TempDir, now: &str, trap: RecordingTrap) -> LogStore {
        let now = Timestamp::from_str(now).unwrap();
        LogStore::builder(dir.path())
            .time_zone(TimeZone::UTC)
            .trigger(ArchiveTrigger::Manual)
            .trap(trap)
            .clock(Clock::pinned(now))
            .build()
            .unwrap()
    }

    fn list_dir(dir: &Path) -> Vec<String> {
        let mut names = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    fn decompress(path: &Path) -> Vec<u8> {
        let mut decoded = vec![];
        GzDecoder::new(fs::File::open(path).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        decoded
    }

    fn generate_random_lines() -> String {
        let mut rng = rand::rng();
        let mut text = String::new();
        for _ in 0..rng.random_range(10..=50) {
            let len = rng.random_range(50..=100);
            let line: String = std::iter::repeat(())
                .map(|()| rng.sample(Alphanumeric))
                .map(char::from)
                .take(len)
                .collect();
            text.push_str(&line);
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_parse_active_filename() {
        assert_eq!(
            parse_active_filename("2024-01-01.AU_LOG").unwrap(),
            date(2024, 1, 1)
        );

        for name in [
            "not-a-date.AU_LOG",
            "2024-01-01.txt",
            "2024-01-01",
            "2024-01-01AU_LOG",
            "2024-1-1.AU_LOG",
            "2024-02-30.AU_LOG",
            ".AU_LOG",
        ] {
            let err = parse_active_filename(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse, "{name}");
        }
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = manual_store(&temp_dir, "2024-03-31T12:00:00Z", RecordingTrap::default());

        // cutoff is 2024-03-01T12:00
        fs::write(store.active_path(date(2024, 3, 1)), "boundary\n").unwrap();
        fs::write(store.active_path(date(2024, 3, 2)), "young\n").unwrap();
        store.sweep().unwrap();

        assert_eq!(list_dir(store.active_dir()), vec!["2024-03-02.AU_LOG"]);
        assert_eq!(list_dir(store.archive_dir()), vec!["2024-03-01.AU_LOG.gz"]);
    }

    #[test]
    fn test_threshold_boundary_at_midnight() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = manual_store(&temp_dir, "2024-03-31T00:00:00Z", RecordingTrap::default());

        fs::write(store.active_path(date(2024, 3, 1)), "boundary\n").unwrap();
        fs::write(store.active_path(date(2024, 3, 2)), "young\n").unwrap();
        store.sweep().unwrap();

        assert_eq!(list_dir(store.active_dir()), vec!["2024-03-02.AU_LOG"]);
        assert_eq!(list_dir(store.archive_dir()), vec!["2024-03-01.AU_LOG.gz"]);
    }

    #[test]
    fn test_custom_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let now = Timestamp::from_str("2024-03-31T12:00:00Z").unwrap();
        let mut store = LogStore::builder(temp_dir.path())
            .archive_threshold_days(1)
            .time_zone(TimeZone::UTC)
            .trigger(ArchiveTrigger::Manual)
            .clock(Clock::pinned(now))
            .build()
            .unwrap();

        fs::write(store.active_path(date(2024, 3, 30)), "yesterday-1\n").unwrap();
        fs::write(store.active_path(date(2024, 3, 31)), "today\n").unwrap();
        store.sweep().unwrap();

        assert_eq!(list_dir(store.active_dir()), vec!["2024-03-31.AU_LOG"]);
        assert_eq!(list_dir(store.archive_dir()), vec!["2024-03-30.AU_LOG.gz"]);
    }

    #[test]
    fn test_archive_preserves_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = manual_store(&temp_dir, "2024-03-31T12:00:00Z", RecordingTrap::default());

        let mut content = generate_random_lines();
        content.push_str("héllo wörld ✓\n");
        fs::write(store.active_path(date(2024, 1, 1)), &content).unwrap();
        store.sweep().unwrap();

        let archived = decompress(&store.archive_dir().join("2024-01-01.AU_LOG.gz"));
        assert_eq!(archived, content.as_bytes());
        assert!(list_dir(store.active_dir()).is_empty());
    }

    #[test]
    fn test_collision_goes_to_marker_path() {
        let temp_dir = TempDir::new().unwrap();
        let trap = RecordingTrap::default();
        let mut store = manual_store(&temp_dir, "2024-03-31T12:00:00Z", trap.clone());

        let primary = store.archive_dir().join("2024-01-01.AU_LOG.gz");
        fs::write(&primary, "previous archive").unwrap();
        fs::write(store.active_path(date(2024, 1, 1)), "new content\n").unwrap();
        store.sweep().unwrap();

        assert!(list_dir(store.active_dir()).is_empty());
        assert_eq!(
            list_dir(store.archive_dir()),
            vec!["2024-01-01.AU_LOG.gz", "2024-01-01.AU_LOG.gz_X"]
        );
        assert_eq!(fs::read(&primary).unwrap(), b"previous archive");
        assert_eq!(
            decompress(&store.archive_dir().join("2024-01-01.AU_LOG.gz_X")),
            b"new content\n"
        );
        assert!(trap.kinds.lock().unwrap().is_empty());
    }

    #[test]
    fn test_collision_overwrites_stray_marker_file() {
        let temp_dir = TempDir::new().unwrap();
        let trap = RecordingTrap::default();
        let mut store = manual_store(&temp_dir, "2024-03-31T12:00:00Z", trap.clone());

        let primary = store.archive_dir().join("2024-01-01.AU_LOG.gz");
        let stray = store.archive_dir().join("2024-01-01.AU_LOG.gz_X");
        fs::write(&primary, "previous archive").unwrap();
        fs::write(&stray, "stray").unwrap();
        fs::write(store.active_path(date(2024, 1, 1)), "newest\n").unwrap();
        store.sweep().unwrap();

        assert!(list_dir(store.active_dir()).is_empty());
        assert_eq!(fs::read(&primary).unwrap(), b"previous archive");
        assert_eq!(decompress(&stray), b"newest\n");
        assert_eq!(
            *trap.kinds.lock().unwrap(),
            vec![ErrorKind::CollisionOverwrite]
        );
    }

    #[test]
    fn test_malformed_filename_fails_before_touching_files() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = manual_store(&temp_dir, "2024-03-31T12:00:00Z", RecordingTrap::default());

        fs::write(store.active_path(date(2024, 1, 1)), "eligible\n").unwrap();
        fs::write(store.active_path(date(2024, 3, 31)), "young\n").unwrap();
        fs::write(store.active_dir().join("not-a-date.AU_LOG"), "foreign\n").unwrap();

        let err = store.sweep().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(
            list_dir(store.active_dir()),
            vec!["2024-01-01.AU_LOG", "2024-03-31.AU_LOG", "not-a-date.AU_LOG"]
        );
        assert!(list_dir(store.archive_dir()).is_empty());
    }

    #[test]
    fn test_failure_aborts_rest_of_sweep() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = manual_store(&temp_dir, "2024-03-31T12:00:00Z", RecordingTrap::default());

        fs::write(store.active_path(date(2024, 1, 1)), "first\n").unwrap();
        fs::write(store.active_path(date(2024, 1, 2)), "second\n").unwrap();
        fs::write(store.active_path(date(2024, 1, 3)), "third\n").unwrap();
        // a directory squatting on both archive names of 2024-01-02 cannot be removed as a file
        fs::create_dir(store.archive_dir().join("2024-01-02.AU_LOG.gz")).unwrap();
        fs::create_dir(store.archive_dir().join("2024-01-02.AU_LOG.gz_X")).unwrap();

        let err = store.sweep().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(
            list_dir(store.active_dir()),
            vec!["2024-01-02.AU_LOG", "2024-01-03.AU_LOG"]
        );
        assert_eq!(
            decompress(&store.archive_dir().join("2024-01-01.AU_LOG.gz")),
            b"first\n"
        );
    }

    #[test]
    fn test_second_sweep_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = manual_store(&temp_dir, "2024-03-31T12:00:00Z", RecordingTrap::default());

        fs::write(store.active_path(date(2024, 1, 1)), "old\n").unwrap();
        fs::write(store.active_path(date(2024, 3, 31)), "young\n").unwrap();

        store.sweep().unwrap();
        let active = list_dir(store.active_dir());
        let archived = list_dir(store.archive_dir());
        let archive_bytes = fs::read(store.archive_dir().join("2024-01-01.AU_LOG.gz")).unwrap();

        store.sweep().unwrap();
        assert_eq!(list_dir(store.active_dir()), active);
        assert_eq!(list_dir(store.archive_dir()), archived);
        assert_eq!(
            fs::read(store.archive_dir().join("2024-01-01.AU_LOG.gz")).unwrap(),
            archive_bytes
        );
    }

    #[test]
    fn test_failed_write_removes_partial_archive() {
        let temp_dir = TempDir::new().unwrap();
        let store = manual_store(&temp_dir, "2024-03-31T12:00:00Z", RecordingTrap::default());

        let source = store.active_path(date(2024, 1, 1));
        fs::write(&source, "eligible\n").unwrap();
        let files = store.list_active_files().unwrap();

        let err = store
            .archive_file_with(&files[0], |mut file: File, _: &[u8]| {
                file.write_all(b"partial")?;
                Err(io::Error::other("disk full"))
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(list_dir(store.archive_dir()).is_empty());
        assert_eq!(fs::read_to_string(&source).unwrap(), "eligible\n");
    }

    #[test]
    fn test_failed_verification_removes_archive() {
        let temp_dir = TempDir::new().unwrap();
        let store = manual_store(&temp_dir, "2024-03-31T12:00:00Z", RecordingTrap::default());

        let source = store.active_path(date(2024, 1, 1));
        fs::write(&source, "eligible\n").unwrap();
        let files = store.list_active_files().unwrap();

        let err = store
            .archive_file_with(&files[0], |file: File, _: &[u8]| {
                write_archive(file, b"something else\n")
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert!(list_dir(store.archive_dir()).is_empty());
        assert_eq!(fs::read_to_string(&source).unwrap(), "eligible\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_archive_entry_is_never_removed() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = manual_store(&temp_dir, "2024-03-31T12:00:00Z", RecordingTrap::default());

        // a dangling symlink does not "exist", so it is picked as the target and create-new fails
        let primary = store.archive_dir().join("2024-01-01.AU_LOG.gz");
        std::os::unix::fs::symlink(temp_dir.path().join("nowhere"), &primary).unwrap();
        let source = store.active_path(date(2024, 1, 1));
        fs::write(&source, "eligible\n").unwrap();

        let err = store.sweep().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(fs::symlink_metadata(&primary).unwrap().is_symlink());
        assert_eq!(fs::read_to_string(&source).unwrap(), "eligible\n");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_filename_fails_before_touching_files() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let mut store = manual_store(&temp_dir, "2024-03-31T12:00:00Z", RecordingTrap::default());

        let eligible = store.active_path(date(2024, 1, 1));
        fs::write(&eligible, "eligible\n").unwrap();
        let foreign = store
            .active_dir()
            .join(OsStr::from_bytes(b"\xff.AU_LOG"));
        fs::write(&foreign, "foreign\n").unwrap();

        let err = store.sweep().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(fs::read_to_string(&eligible).unwrap(), "eligible\n");
        assert!(foreign.exists());
        assert!(list_dir(store.archive_dir()).is_empty());
    }
}
