//! Line log writer: appends one line per emission to `log.txt`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{output_path, BlockBuffer, DataWriter, WriterError};
use crate::config::EmissionMode;

const LOG_FILE: &str = "log";

#[derive(Debug)]
pub struct LogWriter {
    folder: Option<PathBuf>,
    lines: BlockBuffer<String>,
    opened: bool,
}

impl LogWriter {
    pub fn new(mode: EmissionMode) -> Self {
        Self {
            folder: None,
            lines: BlockBuffer::new(mode),
            opened: false,
        }
    }

    pub fn add_line(&mut self, line: String) {
        self.lines.push(line);
    }

    async fn flush(&mut self, lines: Vec<String>) -> Result<(), WriterError> {
        if lines.is_empty() {
            return Ok(());
        }
        let path = output_path(self.folder.as_ref(), LOG_FILE, "txt")?;
        let first = !self.opened;

        let mut text = lines.join("\n");
        text.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(first)
            .append(!first)
            .open(&path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        self.opened = true;
        tracing::debug!(lines = lines.len(), path = %path.display(), "Log lines written");
        Ok(())
    }
}

#[async_trait]
impl DataWriter for LogWriter {
    fn set_output_folder(&mut self, folder: &Path) {
        self.folder = Some(folder.to_path_buf());
    }

    fn start_block(&mut self, _block_number: u64) {}

    async fn end_block(&mut self) -> Result<(), WriterError> {
        let due = self.lines.end_block();
        self.flush(due).await
    }

    fn discard_block(&mut self) {
        self.lines.discard();
    }

    async fn end_program(&mut self) -> Result<(), WriterError> {
        let due = self.lines.end_program();
        self.flush(due).await
    }
}
