//! Append-only CSV audit trail of served predictions.
//!
//! Every successful prediction appends one self-contained row. The file is
//! consumed offline for drift analysis; this module only guarantees that
//! each row is complete and parseable, never that anyone reads it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::warn;

use crate::observation::{Observation, timestamp};

/// Column layout of the prediction log.
pub const LOG_HEADER: [&str; 9] = [
    "logged_at",
    "observation_timestamp",
    "temperature",
    "humidity",
    "ghi",
    "power_t_1",
    "power_t_2",
    "predicted_power",
    "model_version",
];

/// One served prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    /// When the prediction was served (UTC).
    pub logged_at: DateTime<Utc>,
    /// The validated input.
    pub observation: Observation,
    /// Clamped model output (W).
    pub predicted_power: f64,
    /// Version of the artifact pair that produced the prediction.
    pub model_version: String,
}

impl PredictionRecord {
    fn to_fields(&self) -> [String; 9] {
        let obs = &self.observation;
        [
            self.logged_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            timestamp::format(&obs.timestamp),
            obs.temperature.to_string(),
            obs.humidity.to_string(),
            obs.ghi.to_string(),
            obs.power_t_1.to_string(),
            obs.power_t_2.to_string(),
            self.predicted_power.to_string(),
            self.model_version.clone(),
        ]
    }

    fn from_fields(row: &csv::StringRecord, line: u64) -> Result<Self, LogReadError> {
        let field = |i: usize| row.get(i).unwrap_or("");
        let bad = |i: usize| LogReadError::Field {
            line,
            column: LOG_HEADER[i],
            value: field(i).to_string(),
        };
        let number = |i: usize| field(i).parse::<f64>().map_err(|_| bad(i));

        if row.len() != LOG_HEADER.len() {
            return Err(LogReadError::Width {
                line,
                found: row.len(),
            });
        }

        let logged_at = DateTime::parse_from_rfc3339(field(0))
            .map_err(|_| bad(0))?
            .with_timezone(&Utc);
        let observation = Observation {
            timestamp: timestamp::parse(field(1)).ok_or_else(|| bad(1))?,
            temperature: number(2)?,
            humidity: number(3)?,
            ghi: number(4)?,
            power_t_1: number(5)?,
            power_t_2: number(6)?,
        };
        Ok(Self {
            logged_at,
            observation,
            predicted_power: number(7)?,
            model_version: field(8).to_string(),
        })
    }
}

/// Failure to persist a prediction record. Never fatal to the request.
#[derive(Debug, Error)]
pub enum LogWriteError {
    #[error("cannot open prediction log {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("prediction log {} has an unexpected header", path.display())]
    HeaderMismatch { path: PathBuf },
    #[error("cannot encode prediction record: {0}")]
    Encode(#[from] csv::Error),
    #[error("cannot append to prediction log {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("prediction log lock poisoned")]
    Poisoned,
}

/// Failure to decode an existing prediction log.
#[derive(Debug, Error)]
pub enum LogReadError {
    #[error("cannot read prediction log: {0}")]
    Csv(#[from] csv::Error),
    #[error("prediction log header does not match the expected columns")]
    Header,
    #[error("line {line}: expected {} columns, found {found}", LOG_HEADER.len())]
    Width { line: u64, found: usize },
    #[error("line {line}: invalid {column} value \"{value}\"")]
    Field {
        line: u64,
        column: &'static str,
        value: String,
    },
}

/// Serialized appender for the prediction log.
///
/// The file is opened lazily and reopened after a write failure, so a log
/// directory that becomes writable later starts receiving records without a
/// restart. Each record is encoded outside the lock and written with one
/// `write_all` while holding it. A failed write is rolled back to the last
/// complete row, and opening an existing log cuts any unterminated tail left
/// by a crash, so a later record never lands on a partial line.
#[derive(Debug)]
pub struct PredictionLogger {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl PredictionLogger {
    /// Creates a logger that opens `path` on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    /// Creates a logger and opens `path` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`LogWriteError`] if the file cannot be created or already
    /// holds a different column layout.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LogWriteError> {
        let path = path.into();
        let file = open_log_file(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records one served prediction stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`LogWriteError`] if the record could not be persisted.
    pub fn log(
        &self,
        observation: &Observation,
        predicted_power: f64,
        model_version: &str,
    ) -> Result<(), LogWriteError> {
        self.append(&PredictionRecord {
            logged_at: Utc::now(),
            observation: *observation,
            predicted_power,
            model_version: model_version.to_string(),
        })
    }

    /// Appends a fully formed record.
    ///
    /// # Errors
    ///
    /// Returns [`LogWriteError`] if the record could not be persisted.
    pub fn append(&self, record: &PredictionRecord) -> Result<(), LogWriteError> {
        let row = encode_row(&record.to_fields())?;

        let mut slot = self.file.lock().map_err(|_| LogWriteError::Poisoned)?;
        let mut file = match slot.take() {
            Some(file) => file,
            None => open_log_file(&self.path)?,
        };
        let committed = file.metadata().map(|m| m.len());
        if let Err(source) = file.write_all(&row).and_then(|()| file.flush()) {
            // Best effort: the reopen on the next append trims what is left.
            if let Ok(len) = committed {
                let _ = file.set_len(len);
            }
            // The failed handle is dropped here.
            return Err(LogWriteError::Write {
                path: self.path.clone(),
                source,
            });
        }
        *slot = Some(file);
        Ok(())
    }
}

fn encode_row(fields: &[String]) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(fields)?;
    wtr.into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))
}

/// Opens the log for appending, writing the header into a new or empty file.
///
/// # Arguments
///
/// * `path` - Log file location; missing parent directories are created
///
/// # Returns
///
/// An append handle positioned after the last complete row.
fn open_log_file(path: &Path) -> Result<File, LogWriteError> {
    let open_err = |source| LogWriteError::Open {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(open_err)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(open_err)?;

    let len = file.metadata().map_err(open_err)?.len();
    if len > 0 && !has_expected_header(path).map_err(open_err)? {
        return Err(LogWriteError::HeaderMismatch {
            path: path.to_path_buf(),
        });
    }
    let kept = trim_torn_tail(&mut file, len).map_err(open_err)?;
    if kept < len {
        warn!(
            path = %path.display(),
            dropped_bytes = len - kept,
            "discarded unterminated row at end of prediction log"
        );
    }
    if kept == 0 {
        let header = encode_row(&LOG_HEADER.map(String::from))?;
        file.write_all(&header)
            .and_then(|()| file.flush())
            .map_err(|source| LogWriteError::Write {
                path: path.to_path_buf(),
                source,
            })?;
    }
    Ok(file)
}

/// Truncates `file` to just after its last newline and returns the kept length.
fn trim_torn_tail(file: &mut File, len: u64) -> io::Result<u64> {
    let mut buf = [0u8; 1024];
    let mut end = len;
    let mut keep = 0;
    while end > 0 {
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }
    if keep < len {
        file.set_len(keep)?;
    }
    Ok(keep)
}

/// True if the first line is our header, or an unterminated prefix of it.
fn has_expected_header(path: &Path) -> io::Result<bool> {
    let mut first = String::new();
    BufReader::new(File::open(path)?).read_line(&mut first)?;
    let expected = LOG_HEADER.join(",");
    Ok(match first.strip_suffix('\n') {
        Some(line) => line.trim_end_matches('\r') == expected,
        None => expected.starts_with(&first),
    })
}

/// Decodes every record in a prediction log.
///
/// # Errors
///
/// Returns [`LogReadError`] if the file is unreadable, has a foreign header,
/// or contains a malformed row.
pub fn read_records(path: &Path) -> Result<Vec<PredictionRecord>, LogReadError> {
    let mut rdr = csv::ReaderBuilder::new().from_path(path)?;
    if rdr.headers()?.iter().ne(LOG_HEADER) {
        return Err(LogReadError::Header);
    }

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let line = row.position().map_or(0, csv::Position::line);
        records.push(PredictionRecord::from_fields(&row, line)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn obs(power_t_1: f64) -> Observation {
        Observation {
            temperature: 25.0,
            humidity: 60.0,
            ghi: 500.0,
            timestamp: timestamp::parse("2024-06-01T12:00:00").unwrap(),
            power_t_1,
            power_t_2: 115.0,
        }
    }

    #[test]
    fn new_log_gets_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");

        let logger = PredictionLogger::open(&path).unwrap();
        logger.log(&obs(1.0), 10.0, "v2").unwrap();
        drop(logger);

        let logger = PredictionLogger::open(&path).unwrap();
        logger.log(&obs(2.0), 20.0, "v2").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], LOG_HEADER.join(","));
    }

    #[test]
    fn records_decode_with_version_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        let logger = PredictionLogger::new(&path);

        for i in 0..5 {
            logger.log(&obs(f64::from(i)), 100.0 + f64::from(i) / 3.0, "v2").unwrap();
        }

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 5);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.model_version, "v2");
            assert_eq!(record.observation, obs(i as f64));
            assert_eq!(record.predicted_power, 100.0 + i as f64 / 3.0);
        }
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs").join("predictions.csv");
        let logger = PredictionLogger::new(&path);
        logger.log(&obs(1.0), 1.0, "v2").unwrap();
        assert_eq!(read_records(&path).unwrap().len(), 1);
    }

    #[test]
    fn foreign_header_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        fs::write(&path, "a,b,c\n1,2,3\n").unwrap();

        let err = PredictionLogger::open(&path).unwrap_err();
        assert!(matches!(err, LogWriteError::HeaderMismatch { .. }));
        assert!(matches!(read_records(&path), Err(LogReadError::Header)));
    }

    #[test]
    fn unwritable_path_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let logger = PredictionLogger::new(blocker.join("predictions.csv"));

        let err = logger.log(&obs(1.0), 1.0, "v2").unwrap_err();
        assert!(matches!(err, LogWriteError::Open { .. }), "{err}");
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        let logger = Arc::new(PredictionLogger::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let logger = Arc::clone(&logger);
                thread::spawn(move || {
                    for i in 0..50 {
                        let power = f64::from(t * 1000 + i);
                        logger.log(&obs(power), power * 1.5, "v2").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 400);
        for r in &records {
            assert_eq!(r.predicted_power, r.observation.power_t_1 * 1.5);
        }
    }

    #[test]
    fn malformed_row_is_reported_with_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        let logger = PredictionLogger::open(&path).unwrap();
        logger.log(&obs(1.0), 1.0, "v2").unwrap();
        drop(logger);

        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("2024-06-01T12:00:00.000Z,2024-06-01T12:00:00,hot,60,500,1,1,1,v2\n");
        fs::write(&path, content).unwrap();

        match read_records(&path) {
            Err(LogReadError::Field { column, value, .. }) => {
                assert_eq!(column, "temperature");
                assert_eq!(value, "hot");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn torn_tail_is_cut_before_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        let logger = PredictionLogger::open(&path).unwrap();
        logger.log(&obs(1.0), 10.0, "v2").unwrap();
        drop(logger);

        // Simulate a crash midway through a row.
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("2024-06-01T12:00:01.000Z,2024-06-01T12:00:00,25,60");
        fs::write(&path, content).unwrap();

        let logger = PredictionLogger::open(&path).unwrap();
        logger.log(&obs(2.0), 20.0, "v2").unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].observation, obs(1.0));
        assert_eq!(records[1].observation, obs(2.0));
        assert_eq!(records[1].predicted_power, 20.0);
    }

    #[test]
    fn torn_header_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        fs::write(&path, "logged_at,observation_ti").unwrap();

        let logger = PredictionLogger::new(&path);
        logger.log(&obs(1.0), 10.0, "v2").unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].predicted_power, 10.0);
    }

    #[test]
    fn unterminated_foreign_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        fs::write(&path, "not a prediction log").unwrap();

        let err = PredictionLogger::open(&path).unwrap_err();
        assert!(matches!(err, LogWriteError::HeaderMismatch { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "not a prediction log");
    }

    #[test]
    fn recovers_once_log_directory_becomes_writable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("logs");
        fs::write(&blocker, "").unwrap();
        let logger = PredictionLogger::new(blocker.join("predictions.csv"));

        assert!(logger.log(&obs(1.0), 1.0, "v2").is_err());

        fs::remove_file(&blocker).unwrap();
        logger.log(&obs(2.0), 2.0, "v2").unwrap();
        logger.log(&obs(3.0), 3.0, "v2").unwrap();

        let records = read_records(&blocker.join("predictions.csv")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].observation, obs(2.0));
    }
}
