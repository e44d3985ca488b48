//! Result persistence.
//!
//! A `RowSink` receives the column list once and then decoded rows in arrival
//! order. `JsonLinesSink` writes a header line `{"columns":[...]}` followed by
//! one JSON array per row into `<dir>/<query_id>.jsonl`. An existing file is
//! appended to, so a resumed query continues the rows of an earlier run.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::json;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info};

use crate::decode::Value;
use crate::error::{Error, Result};
use crate::result::ResultIterator;
use crate::status::Column;

const BATCH_ROWS: usize = 1024;

#[allow(async_fn_in_trait)]
pub trait RowSink {
    async fn write_columns(&mut self, columns: &[Column]) -> Result<()>;
    async fn write_rows(&mut self, rows: &[Vec<Value>]) -> Result<()>;
    async fn finish(&mut self) -> Result<()>;
}

#[derive(Deserialize)]
struct Header {
    columns: Vec<Column>,
}

pub struct JsonLinesSink {
    path: PathBuf,
    out: BufWriter<File>,
    /// Header found in the file from an earlier run.
    existing_columns: Option<Vec<Column>>,
    columns_written: bool,
    rows: u64,
}

impl JsonLinesSink {
    pub async fn create<P: AsRef<Path>>(dir: P, query_id: &str) -> Result<Self> {
        if query_id.is_empty() || query_id.contains(['/', '\\']) || query_id.starts_with('.') {
            return Err(Error::config(format!("query id '{query_id}' is not usable as a file name")));
        }
        fs::create_dir_all(dir.as_ref()).await?;
        let path = dir.as_ref().join(format!("{query_id}.jsonl"));
        let existing_columns = read_header(&path).await?;
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        match &existing_columns {
            Some(cols) => debug!(target: "presto::sink", "appending to {} ({} columns on file)", path.display(), cols.len()),
            None => debug!(target: "presto::sink", "writing results to {}", path.display()),
        }
        Ok(Self { path, out: BufWriter::new(file), existing_columns, columns_written: false, rows: 0 })
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Columns recorded by an earlier run into the same file.
    pub fn columns(&self) -> Option<&[Column]> { self.existing_columns.as_deref() }

    pub fn rows_written(&self) -> u64 { self.rows }

    async fn write_line(&mut self, line: &serde_json::Value) -> Result<()> {
        let mut buf = serde_json::to_vec(line).map_err(|e| Error::protocol(e.to_string()))?;
        buf.push(b'\n');
        self.out.write_all(&buf).await?;
        Ok(())
    }
}

impl RowSink for JsonLinesSink {
    async fn write_columns(&mut self, columns: &[Column]) -> Result<()> {
        if self.columns_written {
            return Err(Error::misuse("columns already written"));
        }
        if self.existing_columns.is_some() {
            self.columns_written = true;
            return Ok(());
        }
        let cols: Vec<_> = columns.iter().map(|c| json!({"name": c.name, "type": c.type_name})).collect();
        self.write_line(&json!({ "columns": cols })).await?;
        self.columns_written = true;
        Ok(())
    }

    async fn write_rows(&mut self, rows: &[Vec<Value>]) -> Result<()> {
        for row in rows {
            let line = serde_json::Value::Array(row.iter().map(Value::to_json).collect());
            self.write_line(&line).await?;
        }
        self.rows += rows.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.out.flush().await?;
        info!(target: "presto::sink", "wrote {} rows to {}", self.rows, self.path.display());
        Ok(())
    }
}

async fn read_header(path: &Path) -> Result<Option<Vec<Column>>> {
    let file = match File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let Some(first) = BufReader::new(file).lines().next_line().await? else { return Ok(None) };
    Ok(serde_json::from_str::<Header>(&first).ok().map(|h| h.columns))
}

/// Pump every decoded row of `rows` into `sink`, writing the columns as soon as they are known.
/// Returns the number of rows written.
pub async fn drain_into<S: RowSink>(rows: &mut ResultIterator<'_>, sink: &mut S) -> Result<u64> {
    let mut columns_sent = false;
    let mut batch = Vec::with_capacity(BATCH_ROWS);
    let mut total = 0u64;
    loop {
        let next = rows.next_decoded().await?;
        if !columns_sent {
            if let Some(cols) = rows.query().columns() {
                sink.write_columns(cols).await?;
                columns_sent = true;
            }
        }
        let Some(row) = next else { break };
        batch.push(row);
        if batch.len() >= BATCH_ROWS {
            total += batch.len() as u64;
            sink.write_rows(&batch).await?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        total += batch.len() as u64;
        sink.write_rows(&batch).await?;
    }
    sink.finish().await?;
    Ok(total)
}
