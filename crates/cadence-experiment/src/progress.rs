//! Resumable progress log.
//!
//! The log is a JSON-lines file. The first line is a header naming the
//! format version and the experiment's metadata headers; every following
//! line records one completed scenario with its metadata values:
//!
//! ```text
//! {"record":"header","format_version":1,"metadata":["rate","region"]}
//! {"record":"scenario","scenario":0,"metadata":["0.1","north"]}
//! {"record":"scenario","scenario":2,"metadata":["0.1","south"]}
//! ```
//!
//! Lines are flushed as they are written, so an interrupted experiment
//! leaves at most one truncated line at the end, which
//! [`read_progress_log`] skips.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ExperimentError;

/// Current progress log format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum ProgressRecord {
    Header {
        format_version: u32,
        metadata: Vec<String>,
    },
    Scenario {
        scenario: usize,
        metadata: Vec<String>,
    },
}

// ── Writer ─────────────────────────────────────────────────────────

/// Appends completed scenarios to a progress log.
///
/// Generic over `W: Write` so tests can use `Vec<u8>`; experiments use
/// [`ProgressLogWriter::create`] on a file.
pub struct ProgressLogWriter<W: Write> {
    writer: W,
    records_written: u64,
}

impl ProgressLogWriter<BufWriter<File>> {
    /// Create or truncate the file at `path` and write the header.
    pub fn create(path: &Path, metadata: &[String]) -> Result<Self, ExperimentError> {
        debug!(path = %path.display(), "creating progress log");
        Self::new(BufWriter::new(File::create(path)?), metadata)
    }

    /// Replace the log at `path` with a header and `completed`, then keep
    /// appending to it.
    ///
    /// The new contents are written to a sibling `.tmp` file and renamed
    /// over `path`, so a failure part-way leaves the existing log intact.
    pub fn rewrite(
        path: &Path,
        metadata: &[String],
        completed: &BTreeMap<usize, Vec<String>>,
    ) -> Result<Self, ExperimentError> {
        let temp_path = temp_path(path);
        let mut temp = Self::new(BufWriter::new(File::create(&temp_path)?), metadata)?;
        for (&scenario, values) in completed {
            temp.record(scenario, values)?;
        }
        let file = temp.writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;
        drop(file);

        // Atomic rename
        fs::rename(&temp_path, path)?;
        debug!(path = %path.display(), records = completed.len(), "progress log rewritten");

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            records_written: temp.records_written,
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

impl<W: Write> ProgressLogWriter<W> {
    /// Wrap `writer`, immediately writing the header.
    pub fn new(writer: W, metadata: &[String]) -> Result<Self, ExperimentError> {
        let mut log = Self {
            writer,
            records_written: 0,
        };
        log.write(&ProgressRecord::Header {
            format_version: FORMAT_VERSION,
            metadata: metadata.to_vec(),
        })?;
        Ok(log)
    }

    /// Record `scenario` as completed.
    pub fn record(&mut self, scenario: usize, metadata: &[String]) -> Result<(), ExperimentError> {
        self.write(&ProgressRecord::Scenario {
            scenario,
            metadata: metadata.to_vec(),
        })?;
        self.records_written += 1;
        Ok(())
    }

    /// Scenario records written so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, record: &ProgressRecord) -> Result<(), ExperimentError> {
        serde_json::to_writer(&mut self.writer, record).map_err(io::Error::from)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

// ── Reader ─────────────────────────────────────────────────────────

/// Contents of a progress log.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExperimentProgress {
    /// Experiment metadata headers recorded in the log header.
    pub metadata: Vec<String>,
    /// Completed scenarios and their metadata values.
    pub completed: BTreeMap<usize, Vec<String>>,
}

/// Read the progress log at `path`.
///
/// # Errors
///
/// [`ExperimentError::ProgressLogFormat`] if the header is missing or
/// malformed, the format version is unknown, or a line other than the
/// last cannot be parsed.
pub fn read_progress_log(path: &Path) -> Result<ExperimentProgress, ExperimentError> {
    parse_progress(BufReader::new(File::open(path)?), path)
}

fn parse_progress(reader: impl BufRead, path: &Path) -> Result<ExperimentProgress, ExperimentError> {
    let malformed = |line: usize, detail: String| ExperimentError::ProgressLogFormat {
        path: path.to_path_buf(),
        line,
        detail,
    };

    let lines: Vec<String> = reader
        .lines()
        .collect::<io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|l| !l.trim().is_empty())
        .collect();
    let Some((first, rest)) = lines.split_first() else {
        return Err(malformed(1, "empty log".into()));
    };

    let metadata = match serde_json::from_str(first) {
        Ok(ProgressRecord::Header {
            format_version: FORMAT_VERSION,
            metadata,
        }) => metadata,
        Ok(ProgressRecord::Header { format_version, .. }) => {
            return Err(malformed(1, format!("unsupported format version {format_version}")))
        }
        Ok(ProgressRecord::Scenario { .. }) => {
            return Err(malformed(1, "missing header".into()))
        }
        Err(e) => return Err(malformed(1, e.to_string())),
    };

    let mut progress = ExperimentProgress {
        metadata,
        completed: BTreeMap::new(),
    };
    for (i, line) in rest.iter().enumerate() {
        let number = i + 2;
        match serde_json::from_str(line) {
            Ok(ProgressRecord::Scenario { scenario, metadata }) => {
                progress.completed.insert(scenario, metadata);
            }
            Ok(ProgressRecord::Header { .. }) => {
                return Err(malformed(number, "unexpected second header".into()))
            }
            Err(e) if i + 1 == rest.len() => {
                warn!(path = %path.display(), line = number, error = %e, "ignoring truncated last line");
            }
            Err(e) => return Err(malformed(number, e.to_string())),
        }
    }
    debug!(
        path = %path.display(),
        completed = progress.completed.len(),
        "progress log read"
    );
    Ok(progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        vec!["rate".into(), "region".into()]
    }

    fn parse(bytes: &[u8]) -> Result<ExperimentProgress, ExperimentError> {
        parse_progress(bytes, Path::new("test.log"))
    }

    #[test]
    fn written_log_reads_back() {
        let mut log = ProgressLogWriter::new(Vec::new(), &headers()).unwrap();
        log.record(2, &["0.1".into(), "south".into()]).unwrap();
        log.record(0, &["0.1".into(), "north".into()]).unwrap();
        assert_eq!(log.records_written(), 2);

        let progress = parse(&log.into_inner()).unwrap();
        assert_eq!(progress.metadata, headers());
        assert_eq!(progress.completed.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(progress.completed[&2], vec!["0.1", "south"]);
    }

    #[test]
    fn format_is_one_json_object_per_line() {
        let mut log = ProgressLogWriter::new(Vec::new(), &["x".into()]).unwrap();
        log.record(5, &["7".into()]).unwrap();
        let text = String::from_utf8(log.into_inner()).unwrap();
        assert_eq!(
            text,
            "{\"record\":\"header\",\"format_version\":1,\"metadata\":[\"x\"]}\n\
             {\"record\":\"scenario\",\"scenario\":5,\"metadata\":[\"7\"]}\n"
        );
    }

    #[test]
    fn truncated_last_line_is_skipped() {
        let mut log = ProgressLogWriter::new(Vec::new(), &headers()).unwrap();
        log.record(1, &["a".into(), "b".into()]).unwrap();
        let mut bytes = log.into_inner();
        bytes.extend_from_slice(b"{\"record\":\"scenario\",\"scen");
        let progress = parse(&bytes).unwrap();
        assert_eq!(progress.completed.len(), 1);
    }

    #[test]
    fn corrupt_middle_line_rejected() {
        let bytes = b"{\"record\":\"header\",\"format_version\":1,\"metadata\":[]}\n\
                      garbage\n\
                      {\"record\":\"scenario\",\"scenario\":0,\"metadata\":[]}\n";
        match parse(bytes) {
            Err(ExperimentError::ProgressLogFormat { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn missing_header_rejected() {
        let bytes = b"{\"record\":\"scenario\",\"scenario\":0,\"metadata\":[]}\n";
        assert!(matches!(
            parse(bytes),
            Err(ExperimentError::ProgressLogFormat { line: 1, .. })
        ));
        assert!(matches!(
            parse(b""),
            Err(ExperimentError::ProgressLogFormat { line: 1, .. })
        ));
    }

    // ── Rewrite ────────────────────────────────────────────────

    fn completed() -> BTreeMap<usize, Vec<String>> {
        BTreeMap::from([(0, vec!["a".into()]), (3, vec!["d".into()])])
    }

    #[test]
    fn rewrite_keeps_records_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.jsonl");
        let headers = vec!["x".to_string()];
        {
            let mut log = ProgressLogWriter::create(&path, &headers).unwrap();
            log.record(0, &["a".into()]).unwrap();
        }

        let mut log = ProgressLogWriter::rewrite(&path, &headers, &completed()).unwrap();
        assert_eq!(log.records_written(), 2);
        log.record(1, &["b".into()]).unwrap();
        drop(log);

        let progress = read_progress_log(&path).unwrap();
        assert_eq!(progress.metadata, headers);
        assert_eq!(progress.completed.keys().copied().collect::<Vec<_>>(), vec![0, 1, 3]);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn failed_rewrite_leaves_log_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.jsonl");
        let headers = vec!["x".to_string()];
        {
            let mut log = ProgressLogWriter::create(&path, &headers).unwrap();
            log.record(0, &["a".into()]).unwrap();
            log.record(3, &["d".into()]).unwrap();
        }
        // A directory where the temp file should go makes the rewrite fail.
        fs::create_dir(temp_path(&path)).unwrap();

        assert!(matches!(
            ProgressLogWriter::rewrite(&path, &headers, &completed()),
            Err(ExperimentError::Io(_))
        ));
        assert_eq!(read_progress_log(&path).unwrap().completed, completed());
    }

    #[test]
    fn unknown_version_rejected() {
        let bytes = b"{\"record\":\"header\",\"format_version\":9,\"metadata\":[]}\n";
        assert!(matches!(
            parse(bytes),
            Err(ExperimentError::ProgressLogFormat { line: 1, .. })
        ));
    }
}
