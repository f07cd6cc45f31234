//! Impulse source abstraction.
//!
//! Provides a unified trait for reading flywheel impulse durations from
//! different sources: recorded files (replay) and stdin (a live sensor
//! bridge or the `simulation` binary). Both use the same text format: one
//! duration in seconds per line, `#` starts a comment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("{path}:{line}: '{content}' is not an impulse duration")]
    Parse {
        path: PathBuf,
        line: usize,
        content: String,
    },
}

/// Events produced by an impulse source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImpulseEvent {
    /// Seconds since the previous impulse.
    Impulse(f64),
    /// No more data (EOF for files and stdin).
    Eof,
}

/// Trait abstracting where impulses come from.
///
/// Implementations handle parsing and pacing internally. The pipeline calls
/// [`next_impulse`](ImpulseSource::next_impulse) in a `select!` with
/// cancellation.
#[async_trait]
pub trait ImpulseSource: Send {
    async fn next_impulse(&mut self) -> Result<ImpulseEvent, SourceError>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

/// Parse one line of the recording format. `None` for blank and comment lines.
pub fn parse_impulse_line(line: &str) -> Option<Result<f64, std::num::ParseFloatError>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line.parse::<f64>())
}

// ============================================================================
// Replay Source (recorded file)
// ============================================================================

/// Replays recorded impulses, optionally paced at `speed` times real time.
pub struct ReplaySource {
    name: String,
    impulses: std::vec::IntoIter<f64>,
    speed: f64,
}

impl ReplaySource {
    /// `speed` of 0 (or below) replays as fast as the pipeline accepts.
    pub fn new(impulses: Vec<f64>, speed: f64) -> Self {
        Self {
            name: "replay".to_string(),
            impulses: impulses.into_iter(),
            speed,
        }
    }

    /// Load a whole recording. A malformed line rejects the file.
    pub async fn open(path: &Path, speed: f64) -> Result<Self, SourceError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SourceError::Io(path.to_path_buf(), e))?;

        let mut impulses = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            match parse_impulse_line(line) {
                None => {}
                Some(Ok(dt)) => impulses.push(dt),
                Some(Err(_)) => {
                    return Err(SourceError::Parse {
                        path: path.to_path_buf(),
                        line: index + 1,
                        content: line.trim().to_string(),
                    })
                }
            }
        }

        tracing::info!(path = %path.display(), impulses = impulses.len(), "Recording loaded");
        let mut source = Self::new(impulses, speed);
        source.name = path.display().to_string();
        Ok(source)
    }

    pub fn remaining(&self) -> usize {
        self.impulses.len()
    }
}

#[async_trait]
impl ImpulseSource for ReplaySource {
    async fn next_impulse(&mut self) -> Result<ImpulseEvent, SourceError> {
        let Some(dt) = self.impulses.next() else {
            return Ok(ImpulseEvent::Eof);
        };
        if self.speed > 0.0 {
            if let Ok(delay) = Duration::try_from_secs_f64(dt / self.speed) {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(ImpulseEvent::Impulse(dt))
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Stdin Source
// ============================================================================

/// Reads impulses from stdin as they arrive.
///
/// Used with the simulation harness:
/// `simulation --strokes 20 | rowmetrics --stdin`
pub struct StdinSource {
    reader: tokio::io::BufReader<tokio::io::Stdin>,
    line_buffer: String,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            reader: tokio::io::BufReader::new(tokio::io::stdin()),
            line_buffer: String::with_capacity(64),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImpulseSource for StdinSource {
    async fn next_impulse(&mut self) -> Result<ImpulseEvent, SourceError> {
        use tokio::io::AsyncBufReadExt;
        loop {
            self.line_buffer.clear();
            let bytes = self
                .reader
                .read_line(&mut self.line_buffer)
                .await
                .map_err(|e| SourceError::Io(PathBuf::from("<stdin>"), e))?;
            if bytes == 0 {
                return Ok(ImpulseEvent::Eof);
            }
            match parse_impulse_line(&self.line_buffer) {
                None => continue,
                Some(Ok(dt)) => return Ok(ImpulseEvent::Impulse(dt)),
                Some(Err(e)) => {
                    // Skip malformed lines and keep reading
                    tracing::warn!("[StdinSource] Failed to parse impulse: {}", e);
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_impulse_line() {
        assert_eq!(parse_impulse_line("0.0125\n"), Some(Ok(0.0125)));
        assert_eq!(parse_impulse_line("   "), None);
        assert_eq!(parse_impulse_line("# recorded 2026-10-16"), None);
        assert!(matches!(parse_impulse_line("fast"), Some(Err(_))));
    }

    #[tokio::test]
    async fn test_replay_source_yields_then_eof() {
        let mut source = ReplaySource::new(vec![0.01, 0.02], 0.0);
        assert_eq!(source.next_impulse().await.unwrap(), ImpulseEvent::Impulse(0.01));
        assert_eq!(source.remaining(), 1);
        assert_eq!(source.next_impulse().await.unwrap(), ImpulseEvent::Impulse(0.02));
        assert_eq!(source.next_impulse().await.unwrap(), ImpulseEvent::Eof);
        assert_eq!(source.next_impulse().await.unwrap(), ImpulseEvent::Eof);
    }

    #[tokio::test]
    async fn test_replay_source_reads_recording() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# session").unwrap();
        writeln!(file, "0.015").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "0.016").unwrap();

        let mut source = ReplaySource::open(file.path(), 0.0).await.unwrap();
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.next_impulse().await.unwrap(), ImpulseEvent::Impulse(0.015));
        assert_eq!(source.source_name(), file.path().display().to_string());
    }

    #[tokio::test]
    async fn test_replay_source_rejects_malformed_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.015").unwrap();
        writeln!(file, "0.0x6").unwrap();

        match ReplaySource::open(file.path(), 0.0).await {
            Err(SourceError::Parse { line, content, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(content, "0.0x6");
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("malformed recording accepted"),
        }
    }

    #[tokio::test]
    async fn test_replay_source_missing_file() {
        let result = ReplaySource::open(Path::new("/nonexistent/session.txt"), 1.0).await;
        assert!(matches!(result, Err(SourceError::Io(..))));
    }
}
