//! CSV writer: one `<table>.csv` file per table.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::io::AsyncWriteExt;

use super::{output_path, BlockBuffer, DataWriter, WriterError};
use crate::config::EmissionMode;

#[derive(Debug, Clone)]
struct CsvRow {
    table: String,
    values: Vec<String>,
}

/// Buffers rows per block and writes them as RFC 4180 delimited text.
///
/// The first flush of a table in a run truncates its file and writes the
/// header; later flushes append.
#[derive(Debug)]
pub struct CsvWriter {
    folder: Option<PathBuf>,
    rows: BlockBuffer<CsvRow>,
    headers: HashMap<String, Vec<String>>,
    opened: HashSet<String>,
}

impl CsvWriter {
    pub fn new(mode: EmissionMode) -> Self {
        Self {
            folder: None,
            rows: BlockBuffer::new(mode),
            headers: HashMap::new(),
            opened: HashSet::new(),
        }
    }

    /// Stage one row. The column names must match those of the table's
    /// first row.
    pub fn add_row(&mut self, table: &str, row: Vec<(String, String)>) -> Result<(), WriterError> {
        let (columns, values): (Vec<String>, Vec<String>) = row.into_iter().unzip();
        match self.headers.get(table) {
            Some(header) if *header != columns => {
                return Err(WriterError::ColumnMismatch {
                    table: table.to_string(),
                    expected: header.clone(),
                    got: columns,
                });
            }
            Some(_) => {}
            None => {
                self.headers.insert(table.to_string(), columns);
            }
        }
        self.rows.push(CsvRow {
            table: table.to_string(),
            values,
        });
        Ok(())
    }

    /// Write each table's rows. A table that fails does not stop the
    /// others; the first failure is returned.
    async fn flush(&mut self, rows: Vec<CsvRow>) -> Result<(), WriterError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tables: IndexMap<String, Vec<Vec<String>>> = IndexMap::new();
        for row in rows {
            tables.entry(row.table).or_default().push(row.values);
        }

        let mut failure = None;
        for (table, rows) in tables {
            if let Err(err) = self.write_table(&table, &rows).await {
                tracing::error!(table = %table, error = %err, "CSV write failed");
                failure.get_or_insert(err);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    async fn write_table(&mut self, table: &str, rows: &[Vec<String>]) -> Result<(), WriterError> {
        let path = output_path(self.folder.as_ref(), table, "csv")?;
        let first = !self.opened.contains(table);
        let mut text = String::new();
        if first {
            if let Some(header) = self.headers.get(table) {
                push_record(&mut text, header);
            }
        }
        for values in rows {
            push_record(&mut text, values);
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(first)
            .append(!first)
            .open(&path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        // Only a table whose header reached the file switches to appending.
        self.opened.insert(table.to_string());
        tracing::debug!(table = %table, rows = rows.len(), path = %path.display(), "CSV rows written");
        Ok(())
    }
}

fn push_record(out: &mut String, fields: &[String]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&quote(field));
    }
    out.push_str("\r\n");
}

/// Quote a field if it contains a delimiter, quote, or line break.
fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[async_trait]
impl DataWriter for CsvWriter {
    fn set_output_folder(&mut self, folder: &Path) {
        self.folder = Some(folder.to_path_buf());
    }

    fn start_block(&mut self, _block_number: u64) {}

    async fn end_block(&mut self) -> Result<(), WriterError> {
        let due = self.rows.end_block();
        self.flush(due).await
    }

    fn discard_block(&mut self) {
        self.rows.discard();
    }

    async fn end_program(&mut self) -> Result<(), WriterError> {
        let due = self.rows.end_program();
        self.flush(due).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_folder() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chainql-csv-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn row(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn quoting() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("a,b"), "\"a,b\"");
        assert_eq!(quote("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn header_written_once_and_rows_appended() {
        let folder = temp_folder();
        let mut writer = CsvWriter::new(EmissionMode::Block);
        writer.set_output_folder(&folder);

        writer.start_block(1);
        writer.add_row("txs", row(&[("hash", "0x01"), ("value", "10")])).unwrap();
        writer.end_block().await.unwrap();

        writer.start_block(2);
        writer.add_row("txs", row(&[("hash", "0x02"), ("value", "1,5")])).unwrap();
        writer.end_block().await.unwrap();
        writer.end_program().await.unwrap();

        let text = std::fs::read_to_string(folder.join("txs.csv")).unwrap();
        assert_eq!(text, "hash,value\r\n0x01,10\r\n0x02,\"1,5\"\r\n");
    }

    #[tokio::test]
    async fn discarded_block_is_not_written() {
        let folder = temp_folder();
        let mut writer = CsvWriter::new(EmissionMode::Block);
        writer.set_output_folder(&folder);

        writer.start_block(1);
        writer.add_row("t", row(&[("a", "1")])).unwrap();
        writer.discard_block();
        writer.end_program().await.unwrap();

        assert!(!folder.join("t.csv").exists());
    }

    #[tokio::test]
    async fn header_is_written_by_the_first_successful_flush() {
        let folder = temp_folder();
        let missing = folder.join("not-yet");
        let mut writer = CsvWriter::new(EmissionMode::Block);
        writer.set_output_folder(&missing);

        writer.start_block(1);
        writer.add_row("txs", row(&[("hash", "0x01")])).unwrap();
        assert!(matches!(writer.end_block().await, Err(WriterError::Io(_))));

        std::fs::create_dir_all(&missing).unwrap();
        writer.start_block(2);
        writer.add_row("txs", row(&[("hash", "0x02")])).unwrap();
        writer.end_block().await.unwrap();

        let text = std::fs::read_to_string(missing.join("txs.csv")).unwrap();
        assert_eq!(text, "hash\r\n0x02\r\n");
    }

    #[tokio::test]
    async fn failing_table_does_not_block_other_tables() {
        let folder = temp_folder();
        let mut writer = CsvWriter::new(EmissionMode::Block);
        writer.set_output_folder(&folder);

        writer.start_block(1);
        writer.add_row("bad/name", row(&[("a", "1")])).unwrap();
        writer.add_row("good", row(&[("a", "2")])).unwrap();
        assert!(writer.end_block().await.is_err());

        let text = std::fs::read_to_string(folder.join("good.csv")).unwrap();
        assert_eq!(text, "a\r\n2\r\n");
    }

    #[test]
    fn column_mismatch_is_rejected() {
        let mut writer = CsvWriter::new(EmissionMode::Block);
        writer.add_row("t", row(&[("a", "1")])).unwrap();
        assert!(matches!(
            writer.add_row("t", row(&[("b", "1")])),
            Err(WriterError::ColumnMismatch { .. })
        ));
    }
}
