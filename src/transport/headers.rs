//! Protocol headers and the mutable client session they carry.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{Error, Result};

pub const NO_TRANSACTION: &str = "NONE";

/// Header family spoken by the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    #[default]
    Presto,
    Trino,
}

impl Dialect {
    pub fn prefix(&self) -> &'static str {
        match self {
            Dialect::Presto => "Presto",
            Dialect::Trino => "Trino",
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "presto" => Ok(Dialect::Presto),
            "trino" => Ok(Dialect::Trino),
            other => Err(Error::config(format!("unknown protocol dialect '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeaderNames {
    pub catalog: String,
    pub schema: String,
    pub source: String,
    pub user: String,
    pub session: String,
    pub transaction: String,
    pub clear_session: String,
    pub set_session: String,
    pub started_transaction: String,
    pub clear_transaction: String,
    pub extra_credential: String,
}

impl HeaderNames {
    pub fn new(dialect: Dialect) -> Self {
        let h = |suffix: &str| format!("X-{}-{}", dialect.prefix(), suffix);
        Self {
            catalog: h("Catalog"),
            schema: h("Schema"),
            source: h("Source"),
            user: h("User"),
            session: h("Session"),
            transaction: h("Transaction-Id"),
            clear_session: h("Clear-Session"),
            set_session: h("Set-Session"),
            started_transaction: h("Started-Transaction-Id"),
            clear_transaction: h("Clear-Transaction-Id"),
            extra_credential: h("Extra-Credential"),
        }
    }

    /// Request headers callers may not override.
    pub fn reserved(&self) -> [&str; 6] {
        [
            self.catalog.as_str(),
            self.schema.as_str(),
            self.source.as_str(),
            self.user.as_str(),
            self.session.as_str(),
            self.transaction.as_str(),
        ]
    }
}

/// Session state sent with every request and amended by responses.
#[derive(Debug, Clone, Default)]
pub struct ClientSession {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub source: Option<String>,
    pub user: String,
    pub properties: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub transaction_id: String,
}

impl ClientSession {
    /// `name=percent-encoded(value)` pairs joined by commas.
    pub fn session_header(&self) -> String {
        self.properties
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn header_map(&self, names: &HeaderNames) -> Result<HeaderMap> {
        let mut out = HeaderMap::new();
        let session = self.session_header();
        let fixed: [(&str, Option<&str>); 6] = [
            (names.catalog.as_str(), self.catalog.as_deref()),
            (names.schema.as_str(), self.schema.as_deref()),
            (names.source.as_str(), self.source.as_deref()),
            (names.user.as_str(), Some(self.user.as_str())),
            (names.session.as_str(), if session.is_empty() { None } else { Some(session.as_str()) }),
            (names.transaction.as_str(), Some(self.transaction_id.as_str())),
        ];
        for (name, value) in fixed {
            if let Some(v) = value {
                insert(&mut out, name, v)?;
            }
        }
        for (name, value) in &self.headers {
            insert(&mut out, name, value)?;
        }
        Ok(out)
    }

    /// Server-directed mutations: clears first, then sets, then transaction changes.
    /// Nothing is applied when any entry is malformed.
    pub fn apply_response_headers(&mut self, names: &HeaderNames, headers: &HeaderMap) -> Result<()> {
        let mut properties = self.properties.clone();
        for prop in header_values(headers, &names.clear_session) {
            properties.remove(&prop);
        }
        for entry in header_values(headers, &names.set_session) {
            let (k, v) = entry
                .split_once('=')
                .ok_or_else(|| Error::protocol(format!("malformed {} entry '{}'", names.set_session, entry)))?;
            let v = urlencoding::decode(v.trim())
                .map_err(|e| Error::protocol(format!("bad encoding in {} entry '{}': {}", names.set_session, entry, e)))?;
            properties.insert(k.trim().to_string(), v.into_owned());
        }
        self.properties = properties;
        if let Some(id) = header_values(headers, &names.started_transaction).into_iter().next() {
            self.transaction_id = id;
        }
        if headers.contains_key(names.clear_transaction.as_str()) {
            self.transaction_id = NO_TRANSACTION.to_string();
        }
        Ok(())
    }
}

fn insert(map: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let n = HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::config(format!("invalid header name '{name}': {e}")))?;
    let v = HeaderValue::from_str(value).map_err(|e| Error::config(format!("invalid value for header '{name}': {e}")))?;
    map.insert(n, v);
    Ok(())
}

// Comma separated values, across repeated header lines.
fn header_values(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
