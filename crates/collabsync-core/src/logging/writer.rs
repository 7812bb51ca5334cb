//! Append-only JSONL files, one per peer per day.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::entry::{JsonLogEntry, SessionMetadata};

/// Appends entries to `<logs>/raw/<date>_<peer>.jsonl`
pub struct PeerLogWriter {
    peer: String,
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl PeerLogWriter {
    /// Open (or create) today's file for `peer`.
    ///
    /// ```text
    /// logs/
    /// ├── raw/        # one JSONL file per peer per day
    /// └── runs/       # SessionMetadata, one file per run
    /// ```
    pub fn new(logs_dir: impl AsRef<Path>, peer: impl Into<String>) -> std::io::Result<Self> {
        let peer = peer.into();
        let raw_dir = logs_dir.as_ref().join("raw");
        fs::create_dir_all(&raw_dir)?;

        let date = chrono::Local::now().format("%Y-%m-%d");
        let path = raw_dir.join(format!("{}_{}.jsonl", date, peer));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            peer,
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one entry as one line, flushed immediately.
    pub fn write(&self, entry: &JsonLogEntry) -> std::io::Result<()> {
        let json = entry
            .to_json_line()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{}", json)?;
        writer.flush()
    }

    pub fn write_raw(
        &self,
        level: &str,
        target: &str,
        message: &str,
        fields: Option<serde_json::Value>,
    ) -> std::io::Result<()> {
        let mut entry = JsonLogEntry::new(level, &self.peer, target, message);
        if let Some(f) = fields {
            entry = entry.with_fields(f);
        }
        self.write(&entry)
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.writer.lock().flush()
    }
}

impl Drop for PeerLogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Write run metadata to `<logs>/runs/<run_id>.json`
pub fn write_session_metadata(
    logs_dir: impl AsRef<Path>,
    metadata: &SessionMetadata,
) -> std::io::Result<PathBuf> {
    let runs_dir = logs_dir.as_ref().join("runs");
    fs::create_dir_all(&runs_dir)?;

    let path = runs_dir.join(format!("{}.json", metadata.run_id));
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(&path, json)?;
    Ok(path)
}

/// Every entry from every peer's file, sorted by timestamp.
///
/// Lines that fail to parse are skipped with a warning.
pub fn read_all_entries(logs_dir: impl AsRef<Path>) -> std::io::Result<Vec<JsonLogEntry>> {
    let raw_dir = logs_dir.as_ref().join("raw");
    if !raw_dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for dir_entry in fs::read_dir(&raw_dir)? {
        let path = dir_entry?.path();
        if path.extension().map(|e| e != "jsonl").unwrap_or(true) {
            continue;
        }
        let content = fs::read_to_string(&path)?;
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match JsonLogEntry::from_json_line(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unparsable log line");
                }
            }
        }
    }

    entries.sort_by(|a, b| a.ts.cmp(&b.ts));
    Ok(entries)
}

/// Entries written by one peer, sorted by timestamp
pub fn read_peer_entries(
    logs_dir: impl AsRef<Path>,
    peer: &str,
) -> std::io::Result<Vec<JsonLogEntry>> {
    Ok(read_all_entries(logs_dir)?
        .into_iter()
        .filter(|e| e.peer == peer)
        .collect())
}
