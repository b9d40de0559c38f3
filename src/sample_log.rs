use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;

use crate::ping::Sample;

const COLUMNS: [&str; 3] = ["timestamp", "host", "ping_ms"];

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to read log {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("log {} is not a readable sample log: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to move unreadable log {} aside: {source}", path.display())]
    Quarantine {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write log {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Every sample ever taken, held in memory and rewritten to a CSV file on flush.
#[derive(Debug)]
pub struct SampleLog {
    path: PathBuf,
    samples: Vec<Sample>,
    flushed: usize,
}

impl SampleLog {
    /// Reads all samples persisted at `path`. A missing file is an empty log.
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<Sample>, LogError> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LogError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let corrupt = |reason: String| LogError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(bytes.as_slice());

        let headers = reader.headers().map_err(|e| corrupt(e.to_string()))?;
        if let Some(missing) = COLUMNS.into_iter().find(|c| !headers.iter().any(|h| h == *c)) {
            return Err(corrupt(format!("missing column `{missing}`")));
        }

        reader
            .deserialize::<Sample>()
            .map(|record| record.map_err(|e| corrupt(e.to_string())))
            .collect()
    }

    /// Loads the log at `path`. An unreadable file is renamed aside and the
    /// log starts empty, so the next flush cannot overwrite it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let path = path.into();
        let samples = match Self::load(&path) {
            Ok(samples) => samples,
            Err(LogError::Corrupt { reason, .. }) => {
                let backup = quarantine(&path)?;
                log::warn!(
                    "Log {} could not be parsed ({reason}); moved it to {} and starting a new log",
                    path.display(),
                    backup.display()
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        log::info!("Loaded {} samples from {}", samples.len(), path.display());
        let flushed = samples.len();
        Ok(Self {
            path,
            samples,
            flushed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples appended since the last successful flush.
    pub fn pending(&self) -> usize {
        self.samples.len() - self.flushed
    }

    pub fn append(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Rewrites the whole log, prior and new samples, to disk.
    pub fn flush(&mut self) -> Result<(), LogError> {
        self.write_all().map_err(|source| LogError::Write {
            path: self.path.clone(),
            source,
        })?;
        log::debug!(
            "Flushed {} samples ({} new) to {}",
            self.samples.len(),
            self.pending(),
            self.path.display()
        );
        self.flushed = self.samples.len();
        Ok(())
    }

    fn write_all(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = sibling(&self.path, "tmp");
        let written = self
            .write_to(&tmp)
            .and_then(|()| fs::rename(&tmp, &self.path));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }

    fn write_to(&self, tmp: &Path) -> io::Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(File::create(tmp)?);
        writer.write_record(COLUMNS).map_err(io::Error::from)?;
        for sample in &self.samples {
            writer.serialize(sample).map_err(io::Error::from)?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn quarantine(path: &Path) -> Result<PathBuf, LogError> {
    let suffix = format!("corrupt-{}", Local::now().format("%Y%m%d-%H%M%S"));
    let backup = sibling(path, &suffix);
    fs::rename(path, &backup).map_err(|source| LogError::Quarantine {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ping::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use tempfile::tempdir;

    fn sample(ts: &str, host: &str, latency: Option<f64>) -> Sample {
        Sample::new(NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).unwrap(), host, latency)
    }

    #[test]
    fn missing_file_is_empty_log() {
        let tmp = tempdir().unwrap();
        let log = SampleLog::open(tmp.path().join("ping_log.csv")).unwrap();
        assert!(log.is_empty());
        assert_eq!(log.pending(), 0);
    }

    #[test]
    fn flushed_samples_reload_in_order_with_gaps() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("ping_log.csv");
        let written = vec![
            sample("2024-05-01 10:00:00", "google.com", Some(12.5)),
            sample("2024-05-01 10:00:00", "8.8.8.8", None),
            sample("2024-05-01 10:00:05", "google.com", Some(0.0)),
            sample("2024-05-01 10:00:05", "8.8.8.8", Some(9.25)),
        ];

        let mut log = SampleLog::open(&path).unwrap();
        for s in written.clone() {
            log.append(s);
        }
        assert_eq!(log.pending(), 4);
        log.flush().unwrap();
        assert_eq!(log.pending(), 0);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("timestamp,host,ping_ms\n"));
        assert!(text.contains("2024-05-01 10:00:00,8.8.8.8,\n"));

        assert_eq!(SampleLog::load(&path).unwrap(), written);
    }

    #[test]
    fn prior_samples_are_kept_across_runs() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("ping_log.csv");

        let mut first = SampleLog::open(&path).unwrap();
        first.append(sample("2024-05-01 10:00:00", "a", Some(1.0)));
        first.flush().unwrap();

        let mut second = SampleLog::open(&path).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second.pending(), 0);
        second.append(sample("2024-05-01 11:00:00", "a", None));
        second.flush().unwrap();

        let rows: Vec<_> = SampleLog::load(&path)
            .unwrap()
            .into_iter()
            .map(|s| (s.timestamp.format(TIMESTAMP_FORMAT).to_string(), s.latency))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("2024-05-01 10:00:00".to_string(), Some(1.0)),
                ("2024-05-01 11:00:00".to_string(), None),
            ]
        );
    }

    #[test]
    fn integer_latencies_from_older_logs_load() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("ping_log.csv");
        let older = "timestamp,host,ping_ms\n\
                     2024-05-01 10:00:00,8.8.8.8,23\n\
                     2024-05-01 10:00:05,8.8.8.8,\n";
        fs::write(&path, older).unwrap();

        let samples = SampleLog::load(&path).unwrap();
        assert_eq!(samples[0].latency, Some(23.0));
        assert_eq!(samples[1].latency, None);
    }

    #[test]
    fn corrupt_log_is_moved_aside() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("ping_log.csv");
        fs::write(&path, "timestamp,host,ping_ms\nyesterday,8.8.8.8,fast\n").unwrap();

        assert!(matches!(SampleLog::load(&path), Err(LogError::Corrupt { .. })));

        let mut log = SampleLog::open(&path).unwrap();
        assert!(log.is_empty());
        assert!(!path.exists());

        let backups: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("ping_log.csv.corrupt-"))
            .collect();
        assert_eq!(backups.len(), 1);

        log.append(sample("2024-05-01 10:00:00", "a", Some(1.0)));
        log.flush().unwrap();
        assert_eq!(SampleLog::load(&path).unwrap().len(), 1);
    }

    #[test]
    fn wrong_header_is_corrupt() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("other.csv");
        fs::write(&path, "when,where\n1,2\n").unwrap();
        assert!(matches!(SampleLog::load(&path), Err(LogError::Corrupt { .. })));
    }

    #[test]
    fn flush_creates_missing_directories() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("logs").join("nested").join("ping_log.csv");
        let mut log = SampleLog::open(&path).unwrap();
        log.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "timestamp,host,ping_ms\n");
        assert!(!sibling(&path, "tmp").exists());
    }

    #[test]
    fn failed_flush_leaves_no_temp_file_behind() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("ping_log.csv");
        let mut log = SampleLog::open(&path).unwrap();
        log.append(sample("2024-05-01 10:00:00", "a", Some(1.0)));

        // A directory in the log's place makes the final rename fail.
        fs::create_dir(&path).unwrap();
        assert!(matches!(log.flush(), Err(LogError::Write { .. })));

        assert!(!sibling(&path, "tmp").exists());
        assert_eq!(log.pending(), 1);
    }
}
