//! Client for the Presto/Trino HTTP query protocol.
//!
//! ```no_run
//! # async fn run() -> presto_client::Result<()> {
//! use presto_client::{ConnectionParameters, Query, Transport};
//!
//! let transport = Transport::new(ConnectionParameters::new("localhost", 8080, "etl").with_catalog("hive"))?;
//! let mut rows = Query::new(&transport, "select 1").rows();
//! while let Some(row) = rows.next_decoded().await? {
//!     println!("{row:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod decode;
pub mod error;
pub mod query;
pub mod result;
pub mod sink;
pub mod status;
pub mod transport;
pub mod types;

pub use auth::{Authentication, CachedToken, RefreshableCredential};
pub use config::{ConnectionParameters, HttpScheme};
pub use decode::{decode, decode_row, Value, ZonedDateTime};
pub use error::{Error, ErrorLocation, QueryFailure, Result};
pub use query::{Query, QueryState};
pub use result::ResultIterator;
pub use sink::{drain_into, JsonLinesSink, RowSink};
pub use status::{Column, Row, Status, Warning, WarningCode};
pub use transport::{Dialect, GatewayRedirectHandler, RedirectHandler, RetryPolicy, Transport};
pub use types::{DataType, RowField, TypeArgument, TypeSignature};
