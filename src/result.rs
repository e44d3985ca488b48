//! Pull-based row sequence over a query.

use std::collections::VecDeque;

use futures_util::stream::{self, Stream};
use tracing::debug;

use crate::decode::{decode_row, Value};
use crate::error::Result;
use crate::query::{Query, QueryState};
use crate::status::Row;
use crate::types::DataType;

/// Single pass and not restartable. An error ends the sequence.
pub struct ResultIterator<'t> {
    query: Query<'t>,
    buffer: VecDeque<Row>,
    row_number: u64,
    types: Option<Vec<DataType>>,
    failed: bool,
}

impl<'t> ResultIterator<'t> {
    pub fn new(mut query: Query<'t>) -> Self {
        let buffer = query.take_first_page().into();
        Self { query, buffer, row_number: 0, types: None, failed: false }
    }

    /// Rows handed out so far.
    pub fn row_number(&self) -> u64 { self.row_number }

    pub fn query(&self) -> &Query<'t> { &self.query }

    pub fn into_query(self) -> Query<'t> { self.query }

    pub async fn next(&mut self) -> Result<Option<Row>> {
        if self.failed {
            return Ok(None);
        }
        match self.advance().await {
            Ok(row) => Ok(row),
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    /// Next row decoded against the column types. Until the coordinator has
    /// reported columns (a query resumed past the first page may never see
    /// them) cells are handed back raw as `Value::Json`.
    pub async fn next_decoded(&mut self) -> Result<Option<Vec<Value>>> {
        let Some(row) = self.next().await? else { return Ok(None) };
        if self.types.is_none() {
            self.types = self.query.column_types()?;
        }
        match &self.types {
            Some(types) => decode_row(&row, types).map(Some),
            None => {
                debug!(target: "presto::result", "row {} has no column metadata, passing through", self.row_number);
                Ok(Some(row.into_iter().map(|v| if v.is_null() { Value::Null } else { Value::Json(v) }).collect()))
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Row>> + 't {
        stream::try_unfold(self, |mut it| async move {
            Ok(it.next().await?.map(|row| (row, it)))
        })
    }

    pub fn into_decoded_stream(self) -> impl Stream<Item = Result<Vec<Value>>> + 't {
        stream::try_unfold(self, |mut it| async move {
            Ok(it.next_decoded().await?.map(|row| (row, it)))
        })
    }

    async fn advance(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                self.row_number += 1;
                return Ok(Some(row));
            }
            match self.query.state() {
                QueryState::Created => {
                    self.query.execute().await?;
                    self.buffer.extend(self.query.take_first_page());
                }
                QueryState::Running => {
                    let rows = self.query.fetch().await?;
                    self.buffer.extend(rows);
                }
                QueryState::Finished | QueryState::Cancelled => {
                    debug!(target: "presto::result", "result exhausted after {} rows", self.row_number);
                    return Ok(None);
                }
            }
        }
    }
}
