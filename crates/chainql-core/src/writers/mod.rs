//! Output writers.
//!
//! Every writer stages the rows emitted while a block is open and commits
//! them at block exit, so a block is either emitted entirely or not at all.
//! In [`EmissionMode::Block`] committed rows are flushed right away; in
//! [`EmissionMode::Program`] they wait for the end of the program.

pub mod csv;
pub mod http;
pub mod log;
pub mod xes;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{EmissionMode, RunConfig};

pub use self::csv::CsvWriter;
pub use self::http::{HttpRequest, HttpWriter, HttpWriterConfig};
pub use self::log::LogWriter;
pub use self::xes::{XesAttribute, XesType, XesWriter};

/// Errors raised by writers.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no output folder set")]
    NoOutputFolder,

    #[error("table '{table}' has columns {expected:?}, but row has {got:?}")]
    ColumnMismatch {
        table: String,
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("invalid name '{0}' for an output file")]
    InvalidFileName(String),
}

/// Block-scoped lifecycle shared by all writers.
#[async_trait]
pub trait DataWriter: Send {
    fn set_output_folder(&mut self, folder: &Path);

    fn start_block(&mut self, block_number: u64);

    /// Commit the rows staged for the current block.
    async fn end_block(&mut self) -> Result<(), WriterError>;

    /// Drop the rows staged for the current block.
    fn discard_block(&mut self);

    /// Commit anything left and flush/close.
    async fn end_program(&mut self) -> Result<(), WriterError>;
}

/// Fans block lifecycle events out to every writer.
pub struct DataWriters {
    csv: CsvWriter,
    log: LogWriter,
    xes: XesWriter,
    http: HttpWriter,
}

impl DataWriters {
    pub fn new(config: &RunConfig) -> Self {
        let mut writers = Self {
            csv: CsvWriter::new(config.emission_mode),
            log: LogWriter::new(config.emission_mode),
            xes: XesWriter::new(),
            http: HttpWriter::new(config.emission_mode, &config.http),
        };
        if let Some(folder) = &config.output_folder {
            writers.set_output_folder(folder);
        }
        writers
    }

    pub fn csv(&mut self) -> &mut CsvWriter {
        &mut self.csv
    }

    pub fn log(&mut self) -> &mut LogWriter {
        &mut self.log
    }

    pub fn xes(&mut self) -> &mut XesWriter {
        &mut self.xes
    }

    pub fn http(&mut self) -> &mut HttpWriter {
        &mut self.http
    }

    /// Dead-lettered HTTP deliveries.
    pub fn http_dead_letters(&self) -> &[HttpRequest] {
        self.http.dead_letters()
    }

    fn all(&mut self) -> [&mut dyn DataWriter; 4] {
        [&mut self.csv, &mut self.log, &mut self.xes, &mut self.http]
    }

    pub fn set_output_folder(&mut self, folder: &Path) {
        tracing::info!(folder = %folder.display(), "Set output folder");
        for writer in self.all() {
            writer.set_output_folder(folder);
        }
    }

    pub fn start_block(&mut self, block_number: u64) {
        for writer in self.all() {
            writer.start_block(block_number);
        }
    }

    /// Commit the current block on every writer. A writer that fails to
    /// flush drops its rows for the block; the others still commit. The
    /// first failure is returned.
    pub async fn end_block(&mut self) -> Result<(), WriterError> {
        let mut results = Vec::with_capacity(4);
        for writer in self.all() {
            results.push(writer.end_block().await);
        }
        first_error(results)
    }

    pub fn discard_block(&mut self) {
        for writer in self.all() {
            writer.discard_block();
        }
    }

    pub async fn end_program(&mut self) -> Result<(), WriterError> {
        let mut results = Vec::with_capacity(4);
        for writer in self.all() {
            results.push(writer.end_program().await);
        }
        first_error(results)
    }
}

/// Keep the first error and log the rest.
fn first_error(results: Vec<Result<(), WriterError>>) -> Result<(), WriterError> {
    let mut first = None;
    for err in results.into_iter().filter_map(Result::err) {
        if first.is_none() {
            first = Some(err);
        } else {
            tracing::error!(error = %err, "Writer flush failed");
        }
    }
    first.map_or(Ok(()), Err)
}

/// Staged/committed buffer pair used by the row-oriented writers.
#[derive(Debug)]
pub(crate) struct BlockBuffer<T> {
    mode: EmissionMode,
    staged: Vec<T>,
    committed: Vec<T>,
}

impl<T> BlockBuffer<T> {
    pub(crate) fn new(mode: EmissionMode) -> Self {
        Self {
            mode,
            staged: Vec::new(),
            committed: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, item: T) {
        self.staged.push(item);
    }

    pub(crate) fn discard(&mut self) {
        self.staged.clear();
    }

    /// Commit staged items; returns what is due for flushing now.
    pub(crate) fn end_block(&mut self) -> Vec<T> {
        self.committed.append(&mut self.staged);
        match self.mode {
            EmissionMode::Block => std::mem::take(&mut self.committed),
            EmissionMode::Program => Vec::new(),
        }
    }

    /// Commit staged items; returns everything left.
    pub(crate) fn end_program(&mut self) -> Vec<T> {
        self.committed.append(&mut self.staged);
        std::mem::take(&mut self.committed)
    }
}

/// Resolve `<folder>/<name>.<extension>`, rejecting names that would escape
/// the folder.
pub(crate) fn output_path(
    folder: Option<&PathBuf>,
    name: &str,
    extension: &str,
) -> Result<PathBuf, WriterError> {
    let folder = folder.ok_or(WriterError::NoOutputFolder)?;
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(WriterError::InvalidFileName(name.to_string()));
    }
    Ok(folder.join(format!("{name}.{extension}")))
}
