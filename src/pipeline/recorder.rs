//! Raw impulse recorder, writing the format [`ReplaySource`](super::ReplaySource) reads.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufWriter};

use super::SourceError;

pub struct ImpulseRecorder {
    path: PathBuf,
    writer: BufWriter<tokio::fs::File>,
    recorded: u64,
}

impl ImpulseRecorder {
    /// Create (or truncate) the recording and write its header.
    pub async fn create(path: &Path) -> Result<Self, SourceError> {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| SourceError::Io(path.to_path_buf(), e))?;
        let mut recorder = Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            recorded: 0,
        };
        let header = format!("# rowmetrics impulses, {}\n", chrono::Utc::now().to_rfc3339());
        recorder.write(header.as_bytes()).await?;
        Ok(recorder)
    }

    pub async fn record(&mut self, dt: f64) -> Result<(), SourceError> {
        // Shortest representation that reads back to the same f64
        let line = format!("{dt}\n");
        self.write(line.as_bytes()).await?;
        self.recorded += 1;
        Ok(())
    }

    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    pub async fn flush(&mut self) -> Result<(), SourceError> {
        self.writer
            .flush()
            .await
            .map_err(|e| SourceError::Io(self.path.clone(), e))
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| SourceError::Io(self.path.clone(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ImpulseEvent, ImpulseSource, ReplaySource};

    #[tokio::test]
    async fn test_recording_replays_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("impulses.txt");
        let impulses = [0.1 / 3.0, 0.0123456789, 1e-3];

        let mut recorder = ImpulseRecorder::create(&path).await.unwrap();
        for dt in impulses {
            recorder.record(dt).await.unwrap();
        }
        recorder.flush().await.unwrap();
        assert_eq!(recorder.recorded(), 3);

        let mut source = ReplaySource::open(&path, 0.0).await.unwrap();
        for dt in impulses {
            assert_eq!(source.next_impulse().await.unwrap(), ImpulseEvent::Impulse(dt));
        }
        assert_eq!(source.next_impulse().await.unwrap(), ImpulseEvent::Eof);
    }
}
