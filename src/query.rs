//! Single-query lifecycle over a `Transport`.
//!
//! `Created -> Running -> Finished`, with `Cancelled` reachable from `Running`.
//! `execute` submits the statement and buffers the first page, `fetch` follows
//! the continuation URI one page at a time, `cancel` asks the coordinator to
//! abort. Statistics accumulate across pages; warnings reflect the latest page.

use std::mem;

use reqwest::StatusCode;
use serde_json::{Map, Value as Json};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::result::ResultIterator;
use crate::status::{Column, Row, Status, Warning};
use crate::transport::Transport;
use crate::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Created,
    Running,
    Finished,
    Cancelled,
}

pub struct Query<'t> {
    transport: &'t Transport,
    sql: String,
    state: QueryState,
    query_id: Option<String>,
    columns: Option<Vec<Column>>,
    stats: Map<String, Json>,
    warnings: Vec<Warning>,
    info_uri: Option<String>,
    first_page: Vec<Row>,
    next_uri: Option<String>,
}

impl<'t> Query<'t> {
    pub fn new<S: Into<String>>(transport: &'t Transport, sql: S) -> Self {
        Self {
            transport,
            sql: sql.into(),
            state: QueryState::Created,
            query_id: None,
            columns: None,
            stats: Map::new(),
            warnings: Vec::new(),
            info_uri: None,
            first_page: Vec::new(),
            next_uri: None,
        }
    }

    /// Pick up a query already submitted elsewhere; `execute` GETs `next_uri` instead of POSTing.
    pub fn resume<S: Into<String>>(transport: &'t Transport, next_uri: S) -> Self {
        let mut q = Self::new(transport, String::new());
        q.next_uri = Some(next_uri.into());
        q
    }

    /// `resume` with the result shape already known from an earlier run, since
    /// the coordinator reports columns on one page only.
    pub fn resume_with_columns<S: Into<String>>(transport: &'t Transport, next_uri: S, columns: Vec<Column>) -> Self {
        let mut q = Self::resume(transport, next_uri);
        q.columns = Some(columns);
        q
    }

    /// Use `columns` unless the coordinator has already reported them.
    pub fn adopt_columns(&mut self, columns: Vec<Column>) {
        if self.columns.is_none() {
            self.columns = Some(columns);
        }
    }

    pub fn sql(&self) -> &str { &self.sql }
    pub fn state(&self) -> QueryState { self.state }
    pub fn query_id(&self) -> Option<&str> { self.query_id.as_deref() }
    pub fn columns(&self) -> Option<&[Column]> { self.columns.as_deref() }
    pub fn stats(&self) -> &Map<String, Json> { &self.stats }
    pub fn warnings(&self) -> &[Warning] { &self.warnings }
    pub fn info_uri(&self) -> Option<&str> { self.info_uri.as_deref() }
    pub fn next_uri(&self) -> Option<&str> { self.next_uri.as_deref() }
    pub fn is_finished(&self) -> bool { self.state == QueryState::Finished }
    pub fn is_cancelled(&self) -> bool { self.state == QueryState::Cancelled }

    /// Column types, once the coordinator has reported the result shape.
    pub fn column_types(&self) -> Result<Option<Vec<DataType>>> {
        match &self.columns {
            Some(cols) => cols.iter().map(Column::data_type).collect::<Result<Vec<_>>>().map(Some),
            None => Ok(None),
        }
    }

    /// Submit the statement and return the rows of the first page.
    pub async fn execute(&mut self) -> Result<&[Row]> {
        if self.state != QueryState::Created {
            return Err(Error::misuse(format!("execute called on a query in state {:?}", self.state)));
        }
        self.transport.ensure_credentials()?;
        let status = match self.next_uri.take() {
            Some(uri) => {
                debug!(target: "presto::query", "resuming query at {}", uri);
                self.transport.get(&uri).await?
            }
            None => {
                debug!(target: "presto::query", "submitting statement ({} bytes)", self.sql.len());
                self.transport.post(&self.sql).await?
            }
        };
        self.stats.insert("queryId".to_string(), Json::String(status.id.clone()));
        let rows = self.apply(status);
        info!(target: "presto::query", "query {} started", self.query_id.as_deref().unwrap_or("?"));
        self.first_page = rows;
        Ok(&self.first_page)
    }

    /// Next page of rows. Pages may be empty while the query is still running.
    pub async fn fetch(&mut self) -> Result<Vec<Row>> {
        match self.state {
            QueryState::Running => {}
            QueryState::Created => return Err(Error::misuse("fetch called before execute")),
            QueryState::Finished => return Err(Error::misuse("fetch called on a finished query")),
            QueryState::Cancelled => return Err(Error::misuse("fetch called on a cancelled query")),
        }
        let uri = self.next_uri.clone().ok_or_else(|| Error::protocol("running query has no continuation uri"))?;
        let status = self.transport.get(&uri).await?;
        Ok(self.apply(status))
    }

    /// Ask the coordinator to abort. No-op before submission or once terminal.
    /// The query is cancelled locally even when the coordinator rejects the DELETE.
    pub async fn cancel(&mut self) -> Result<()> {
        if self.state != QueryState::Running {
            return Ok(());
        }
        let Some(id) = self.query_id.clone() else { return Ok(()) };
        self.state = QueryState::Cancelled;
        self.next_uri = None;
        let url = self.transport.cancel_url(&id)?;
        let resp = self.transport.delete(url).await?;
        if resp.status() != StatusCode::NO_CONTENT {
            return Err(Transport::response_error(resp).await);
        }
        info!(target: "presto::query", "query {} cancelled", id);
        Ok(())
    }

    /// Iterate over every row, executing first if needed.
    pub fn rows(self) -> ResultIterator<'t> { ResultIterator::new(self) }

    pub(crate) fn take_first_page(&mut self) -> Vec<Row> { mem::take(&mut self.first_page) }

    fn apply(&mut self, status: Status) -> Vec<Row> {
        if self.query_id.is_none() {
            self.query_id = Some(status.id);
        }
        self.stats.extend(status.stats);
        self.warnings = status.warnings;
        if status.info_uri.is_some() {
            self.info_uri = status.info_uri;
        }
        if self.columns.is_none() {
            self.columns = status.columns;
        }
        self.next_uri = status.next_uri;
        self.state = match self.next_uri {
            Some(_) => QueryState::Running,
            None => QueryState::Finished,
        };
        debug!(target: "presto::query", "query {} page: {} rows, state {:?}",
            self.query_id.as_deref().unwrap_or("?"), status.rows.len(), self.state);
        status.rows
    }
}
