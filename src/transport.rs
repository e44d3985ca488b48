//!
//! presto-client HTTP transport
//! ----------------------------
//! Owns the `reqwest::Client` and the session state shared by every query
//! issued through it. Each exchange goes through the retry layer; statement
//! submissions additionally follow gateway redirects. Responses are normalized
//! into a `Status` envelope or a typed `Error`.
//!
//! Submodules:
//! - `headers`: protocol header names and the mutable `ClientSession`
//! - `retry`: attempt budget, backoff and the retrying send loop
//! - `redirect`: POST redirect resolution

pub mod headers;
pub mod redirect;
pub mod retry;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, info};

use crate::auth::RefreshableCredential;
use crate::config::{ConnectionParameters, HttpScheme};
use crate::error::{Error, Result};
use crate::status::{StatementResponse, Status};

pub use headers::{ClientSession, Dialect, HeaderNames, NO_TRANSACTION};
pub use redirect::{GatewayRedirectHandler, RedirectHandler, MAX_REDIRECTS};
pub use retry::RetryPolicy;

use redirect::redirect_location;
use retry::send_with_retry;

const BODY_EXCERPT_CHARS: usize = 512;

pub struct Transport {
    client: Client,
    base: Url,
    statement_url: Url,
    names: HeaderNames,
    session: Mutex<ClientSession>,
    auth_header: Option<String>,
    credential: Option<Arc<dyn RefreshableCredential>>,
    credential_header: Mutex<Option<String>>,
    retry: RetryPolicy,
    redirect: Option<Arc<dyn RedirectHandler>>,
    max_response_header_bytes: usize,
}

impl Transport {
    pub fn new(params: ConnectionParameters) -> Result<Self> {
        if params.auth.is_some() && params.scheme == HttpScheme::Http {
            return Err(Error::config("authentication requires https"));
        }
        let names = HeaderNames::new(params.dialect);
        for name in params.http_headers.keys() {
            if names.reserved().iter().any(|r| r.eq_ignore_ascii_case(name)) {
                return Err(Error::config(format!("header '{name}' is reserved by the protocol")));
            }
        }
        for name in params.session_properties.keys() {
            if name.is_empty() || name.contains('=') || name.contains(',') {
                return Err(Error::config(format!("invalid session property name '{name}'")));
            }
        }

        let base = Url::parse(&params.base_url()).map_err(|e| Error::config(format!("invalid coordinator address: {e}")))?;
        let statement_url = base.join("/v1/statement").map_err(|e| Error::config(e.to_string()))?;

        let mut builder = Client::builder()
            .connect_timeout(params.connect_timeout)
            .timeout(params.request_timeout)
            .user_agent(concat!("presto-client/", env!("CARGO_PKG_VERSION")))
            .cookie_store(true)
            .danger_accept_invalid_certs(!params.verify_tls);
        if params.redirect_handler.is_some() {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }
        let client = builder.build()?;

        let session = ClientSession {
            catalog: params.catalog,
            schema: params.schema,
            source: params.source,
            user: params.user,
            properties: params.session_properties,
            headers: params.http_headers,
            transaction_id: params.transaction_id,
        };
        // Header values are validated once up front.
        session.header_map(&names)?;

        let transport = Self {
            client,
            base,
            statement_url,
            names,
            session: Mutex::new(session),
            auth_header: params.auth.as_ref().map(|a| a.header_value()),
            credential: params.credential,
            credential_header: Mutex::new(None),
            retry: params.retry,
            redirect: params.redirect_handler,
            max_response_header_bytes: params.max_response_header_bytes,
        };
        transport.ensure_credentials()?;
        debug!(target: "presto::transport", "transport ready for {} ({:?})", transport.base, params.dialect);
        Ok(transport)
    }

    pub fn url(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| Error::config(format!("invalid path '{path}': {e}")))
    }

    pub fn cancel_url(&self, query_id: &str) -> Result<Url> { self.url(&format!("/v1/query/{query_id}")) }

    pub fn header_names(&self) -> &HeaderNames { &self.names }

    pub fn session_properties(&self) -> BTreeMap<String, String> { self.session.lock().properties.clone() }

    pub fn transaction_id(&self) -> String { self.session.lock().transaction_id.clone() }

    /// Refresh the extra credential when it is missing or expired.
    pub fn ensure_credentials(&self) -> Result<()> {
        let Some(cred) = &self.credential else { return Ok(()) };
        let missing = self.credential_header.lock().is_none();
        if missing || !cred.is_valid() {
            let token = cred.refresh().map_err(|e| match e {
                Error::Credential(_) => e,
                other => Error::Credential(other.to_string()),
            })?;
            debug!(target: "presto::transport", "refreshed credential '{}'", cred.credential_key());
            *self.credential_header.lock() = Some(format!("{}={}", cred.credential_key(), token));
        }
        Ok(())
    }

    pub(crate) fn request_headers(&self) -> Result<HeaderMap> {
        let mut map = self.session.lock().header_map(&self.names)?;
        if let Some(auth) = &self.auth_header {
            let v = HeaderValue::from_str(auth).map_err(|e| Error::config(format!("invalid authorization value: {e}")))?;
            map.insert(AUTHORIZATION, v);
        }
        if let Some(cred) = self.credential_header.lock().as_deref() {
            let n = HeaderName::from_bytes(self.names.extra_credential.as_bytes()).map_err(|e| Error::config(e.to_string()))?;
            let v = HeaderValue::from_str(cred).map_err(|e| Error::config(format!("invalid credential value: {e}")))?;
            map.insert(n, v);
        }
        Ok(map)
    }

    /// Submit a statement. Redirects are resolved through the handler and the
    /// identical request is reissued until a non-redirect arrives.
    pub async fn post(&self, sql: &str) -> Result<Status> {
        let headers = self.request_headers()?;
        let mut url = self.statement_url.clone();
        let mut hops = 0;
        loop {
            let resp = send_with_retry(&self.retry, "POST", || {
                self.client.post(url.clone()).headers(headers.clone()).body(sql.to_owned()).send()
            })
            .await?;
            let location = match &self.redirect {
                Some(_) => redirect_location(&resp),
                None => None,
            };
            let (Some(handler), Some(location)) = (&self.redirect, location) else {
                return self.process(resp).await;
            };
            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(Error::protocol(format!("more than {MAX_REDIRECTS} redirects submitting statement")));
            }
            let next = handler.resolve(&url, &location)?;
            info!(target: "presto::transport", "POST {} redirected ({}) to {}", url, resp.status(), next);
            url = next;
        }
    }

    pub async fn get(&self, uri: &str) -> Result<Status> {
        let url = Url::parse(uri).map_err(|e| Error::protocol(format!("invalid continuation uri '{uri}': {e}")))?;
        let headers = self.request_headers()?;
        let resp = send_with_retry(&self.retry, "GET", || self.client.get(url.clone()).headers(headers.clone()).send()).await?;
        self.process(resp).await
    }

    /// Raw DELETE; the caller decides which statuses count as success.
    pub async fn delete(&self, url: Url) -> Result<reqwest::Response> {
        let headers = self.request_headers()?;
        let resp = send_with_retry(&self.retry, "DELETE", || self.client.delete(url.clone()).headers(headers.clone()).send()).await?;
        self.check_header_size(&resp)?;
        Ok(resp)
    }

    /// Normalize one response into a `Status`. Session mutations apply only to successful statements.
    pub async fn process(&self, resp: reqwest::Response) -> Result<Status> {
        self.check_header_size(&resp)?;
        if !resp.status().is_success() {
            return Err(Self::response_error(resp).await);
        }
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await?;
        let body: StatementResponse = serde_json::from_slice(&bytes)
            .map_err(|e| Error::protocol(format!("malformed statement response: {e}")))?;
        if let Some(mut failure) = body.error {
            failure.query_id = Some(body.id);
            return Err(Error::from_failure(failure));
        }
        self.session.lock().apply_response_headers(&self.names, &headers)?;
        Ok(Status::from(body))
    }

    pub async fn response_error(resp: reqwest::Response) -> Error {
        let status = resp.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Error::ServiceUnavailable;
        }
        let body = resp.text().await.unwrap_or_default();
        Error::Http { status: status.as_u16(), body: body.chars().take(BODY_EXCERPT_CHARS).collect() }
    }

    fn check_header_size(&self, resp: &reqwest::Response) -> Result<()> {
        let size: usize = resp.headers().iter().map(|(k, v)| k.as_str().len() + v.as_bytes().len() + 4).sum();
        if size > self.max_response_header_bytes {
            return Err(Error::protocol(format!(
                "response headers of {} bytes exceed the {} byte limit",
                size, self.max_response_header_bytes
            )));
        }
        Ok(())
    }

    /// Release the connection pool.
    pub fn close(self) {
        debug!(target: "presto::transport", "closing transport for {}", self.base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Authentication, CachedToken};
    use std::time::Duration;

    fn params() -> ConnectionParameters { ConnectionParameters::new("coord", 8080, "alice").with_catalog("hive") }

    #[test]
    fn auth_over_plain_http_is_rejected() {
        let p = params().with_auth(Authentication::bearer("t"));
        assert!(matches!(Transport::new(p), Err(Error::Config(_))));
        let p = params().with_scheme(HttpScheme::Https).with_auth(Authentication::bearer("t"));
        let t = Transport::new(p).unwrap();
        assert_eq!(t.request_headers().unwrap().get(AUTHORIZATION).unwrap(), "Bearer t");
    }

    #[test]
    fn reserved_header_collision_is_case_insensitive() {
        let p = params().with_header("x-presto-user", "mallory");
        assert!(matches!(Transport::new(p), Err(Error::Config(_))));
        let p = params().with_dialect(Dialect::Trino).with_header("X-Trino-Catalog", "other");
        assert!(matches!(Transport::new(p), Err(Error::Config(_))));
        // Only the active dialect's names are reserved.
        let p = params().with_dialect(Dialect::Trino).with_header("X-Presto-Catalog", "other");
        assert!(Transport::new(p).is_ok());
    }

    #[test]
    fn invalid_session_property_name_is_rejected() {
        assert!(Transport::new(params().with_session_property("a=b", "1")).is_err());
        assert!(Transport::new(params().with_session_property("a,b", "1")).is_err());
    }

    #[test]
    fn urls() {
        let t = Transport::new(params()).unwrap();
        assert_eq!(t.statement_url.as_str(), "http://coord:8080/v1/statement");
        assert_eq!(t.cancel_url("20240115_1").unwrap().as_str(), "http://coord:8080/v1/query/20240115_1");
        assert_eq!(t.transaction_id(), NO_TRANSACTION);
    }

    #[test]
    fn credential_refreshed_at_construction() {
        let cred = Arc::new(CachedToken::new("hive.gcs.oauth", || Ok(("tok-1".to_string(), Duration::from_secs(3600)))));
        let t = Transport::new(params().with_credential(cred.clone())).unwrap();
        let headers = t.request_headers().unwrap();
        assert_eq!(headers.get("X-Presto-Extra-Credential").unwrap(), "hive.gcs.oauth=tok-1");
        assert!(cred.is_valid());
    }

    #[test]
    fn failing_credential_surfaces_as_credential_error() {
        let cred = Arc::new(CachedToken::new("k", || Err(Error::protocol("metadata unreachable"))));
        assert!(matches!(Transport::new(params().with_credential(cred)), Err(Error::Credential(_))));
    }
}
