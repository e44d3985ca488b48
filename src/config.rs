//! Connection parameters for a coordinator.
//! Built programmatically with the `with_*` methods or from `PRESTO_*`
//! environment variables.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Authentication, RefreshableCredential};
use crate::error::{Error, Result};
use crate::transport::headers::{Dialect, NO_TRANSACTION};
use crate::transport::redirect::{GatewayRedirectHandler, RedirectHandler};
use crate::transport::retry::RetryPolicy;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SOURCE: &str = "presto-client";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Coordinators behind some gateways send very large Set-Session/Set-Cookie headers.
pub const DEFAULT_MAX_RESPONSE_HEADER_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpScheme {
    #[default]
    Http,
    Https,
}

impl HttpScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpScheme::Http => "http",
            HttpScheme::Https => "https",
        }
    }
}

impl FromStr for HttpScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(HttpScheme::Http),
            "https" => Ok(HttpScheme::Https),
            other => Err(Error::config(format!("unsupported scheme '{other}'"))),
        }
    }
}

#[derive(Clone)]
pub struct ConnectionParameters {
    pub host: String,
    pub port: u16,
    pub scheme: HttpScheme,
    pub user: String,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub source: Option<String>,
    pub transaction_id: String,
    pub session_properties: BTreeMap<String, String>,
    pub http_headers: BTreeMap<String, String>,
    pub auth: Option<Authentication>,
    pub credential: Option<Arc<dyn RefreshableCredential>>,
    pub retry: RetryPolicy,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// `None` leaves redirects to the HTTP stack.
    pub redirect_handler: Option<Arc<dyn RedirectHandler>>,
    pub dialect: Dialect,
    pub max_response_header_bytes: usize,
    pub verify_tls: bool,
}

impl ConnectionParameters {
    pub fn new<S: Into<String>>(host: S, port: u16, user: S) -> Self {
        Self {
            host: host.into(),
            port,
            scheme: HttpScheme::Http,
            user: user.into(),
            catalog: None,
            schema: None,
            source: Some(DEFAULT_SOURCE.to_string()),
            transaction_id: NO_TRANSACTION.to_string(),
            session_properties: BTreeMap::new(),
            http_headers: BTreeMap::new(),
            auth: None,
            credential: None,
            retry: RetryPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            redirect_handler: Some(Arc::new(GatewayRedirectHandler)),
            dialect: Dialect::Presto,
            max_response_header_bytes: DEFAULT_MAX_RESPONSE_HEADER_BYTES,
            verify_tls: true,
        }
    }

    /// Read `PRESTO_*` variables. Host is required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub(crate) fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Result<Self> {
        let host = get("PRESTO_HOST").ok_or_else(|| Error::config("PRESTO_HOST is not set"))?;
        let port = match get("PRESTO_PORT") {
            Some(p) => p.parse::<u16>().map_err(|e| Error::config(format!("PRESTO_PORT '{p}': {e}")))?,
            None => DEFAULT_PORT,
        };
        let user = get("PRESTO_USER").unwrap_or_else(whoami::username);
        let mut params = Self::new(host, port, user);
        if let Some(s) = get("PRESTO_SCHEME") { params.scheme = s.parse()?; }
        params.catalog = get("PRESTO_CATALOG");
        params.schema = get("PRESTO_SCHEMA");
        if let Some(s) = get("PRESTO_SOURCE") { params.source = Some(s); }
        if let Some(d) = get("PRESTO_DIALECT") { params.dialect = d.parse()?; }
        if let Some(n) = get("PRESTO_MAX_ATTEMPTS") {
            let n = n.parse::<u32>().map_err(|e| Error::config(format!("PRESTO_MAX_ATTEMPTS '{n}': {e}")))?;
            params.retry = params.retry.with_max_attempts(n);
        }
        if let Some(t) = get("PRESTO_REQUEST_TIMEOUT_SECS") {
            let secs = t.parse::<f64>().map_err(|e| Error::config(format!("PRESTO_REQUEST_TIMEOUT_SECS '{t}': {e}")))?;
            params.request_timeout = Duration::try_from_secs_f64(secs).map_err(|e| Error::config(format!("PRESTO_REQUEST_TIMEOUT_SECS '{t}': {e}")))?;
        }
        if let Some(s) = get("PRESTO_SESSION") {
            for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (k, v) = pair.split_once('=').ok_or_else(|| Error::config(format!("PRESTO_SESSION entry '{pair}' is not name=value")))?;
                params.session_properties.insert(k.trim().to_string(), v.trim().to_string());
            }
        }
        if let (Some(u), Some(p)) = (get("PRESTO_AUTH_USER"), get("PRESTO_AUTH_PASSWORD")) {
            params.auth = Some(Authentication::basic(u, p));
        } else if let Some(t) = get("PRESTO_AUTH_TOKEN") {
            params.auth = Some(Authentication::bearer(t));
        }
        Ok(params)
    }

    pub fn with_scheme(mut self, scheme: HttpScheme) -> Self { self.scheme = scheme; self }
    pub fn with_catalog<S: Into<String>>(mut self, catalog: S) -> Self { self.catalog = Some(catalog.into()); self }
    pub fn with_schema<S: Into<String>>(mut self, schema: S) -> Self { self.schema = Some(schema.into()); self }
    pub fn with_source<S: Into<String>>(mut self, source: S) -> Self { self.source = Some(source.into()); self }
    pub fn with_transaction_id<S: Into<String>>(mut self, id: S) -> Self { self.transaction_id = id.into(); self }
    pub fn with_auth(mut self, auth: Authentication) -> Self { self.auth = Some(auth); self }
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self { self.retry = retry; self }
    pub fn with_max_attempts(mut self, n: u32) -> Self { self.retry.max_attempts = n; self }
    pub fn with_dialect(mut self, dialect: Dialect) -> Self { self.dialect = dialect; self }
    pub fn with_verify_tls(mut self, verify: bool) -> Self { self.verify_tls = verify; self }
    pub fn with_max_response_header_bytes(mut self, n: usize) -> Self { self.max_response_header_bytes = n; self }

    pub fn with_session_property<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.session_properties.insert(name.into(), value.into());
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.http_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_credential(mut self, credential: Arc<dyn RefreshableCredential>) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn with_redirect_handler(mut self, handler: Option<Arc<dyn RedirectHandler>>) -> Self {
        self.redirect_handler = handler;
        self
    }

    pub fn base_url(&self) -> String { format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port) }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("base_url", &self.base_url())
            .field("user", &self.user)
            .field("catalog", &self.catalog)
            .field("schema", &self.schema)
            .field("source", &self.source)
            .field("transaction_id", &self.transaction_id)
            .field("session_properties", &self.session_properties)
            .field("auth", &self.auth)
            .field("credential", &self.credential.is_some())
            .field("retry", &self.retry)
            .field("redirects", &self.redirect_handler.is_some())
            .field("dialect", &self.dialect)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn env_requires_host() {
        assert!(matches!(ConnectionParameters::from_lookup(lookup(&[])), Err(Error::Config(_))));
    }

    #[test]
    fn env_defaults() {
        let p = ConnectionParameters::from_lookup(lookup(&[("PRESTO_HOST", "coord"), ("PRESTO_USER", "etl")])).unwrap();
        assert_eq!(p.base_url(), "http://coord:8080");
        assert_eq!(p.user, "etl");
        assert_eq!(p.source.as_deref(), Some(DEFAULT_SOURCE));
        assert_eq!(p.transaction_id, NO_TRANSACTION);
        assert_eq!(p.retry.max_attempts, 3);
        assert!(p.redirect_handler.is_some());
        assert!(p.auth.is_none());
    }

    #[test]
    fn env_overrides() {
        let p = ConnectionParameters::from_lookup(lookup(&[
            ("PRESTO_HOST", "coord"),
            ("PRESTO_PORT", "443"),
            ("PRESTO_SCHEME", "https"),
            ("PRESTO_CATALOG", "hive"),
            ("PRESTO_SCHEMA", "web"),
            ("PRESTO_DIALECT", "trino"),
            ("PRESTO_MAX_ATTEMPTS", "1"),
            ("PRESTO_REQUEST_TIMEOUT_SECS", "2.5"),
            ("PRESTO_SESSION", "query_max_run_time=1h, optimize_hash_generation=true"),
            ("PRESTO_AUTH_TOKEN", "jwt"),
        ])).unwrap();
        assert_eq!(p.base_url(), "https://coord:443");
        assert_eq!(p.catalog.as_deref(), Some("hive"));
        assert_eq!(p.dialect, Dialect::Trino);
        assert_eq!(p.retry.max_attempts, 1);
        assert_eq!(p.request_timeout, Duration::from_millis(2500));
        assert_eq!(p.session_properties.get("optimize_hash_generation").map(String::as_str), Some("true"));
        assert_eq!(p.auth, Some(Authentication::bearer("jwt")));
    }

    #[test]
    fn env_rejects_bad_values() {
        assert!(ConnectionParameters::from_lookup(lookup(&[("PRESTO_HOST", "c"), ("PRESTO_PORT", "99999")])).is_err());
        assert!(ConnectionParameters::from_lookup(lookup(&[("PRESTO_HOST", "c"), ("PRESTO_SCHEME", "ftp")])).is_err());
        assert!(ConnectionParameters::from_lookup(lookup(&[("PRESTO_HOST", "c"), ("PRESTO_SESSION", "novalue")])).is_err());
    }

    #[test]
    fn debug_hides_secrets() {
        let p = ConnectionParameters::new("h", 1, "u").with_auth(Authentication::basic("u", "hunter2"));
        assert!(!format!("{p:?}").contains("hunter2"));
    }
}
