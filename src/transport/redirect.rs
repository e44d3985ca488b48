//! Statement-submission redirects resolved by the client instead of the HTTP stack.

use reqwest::{StatusCode, Url};

use crate::error::{Error, Result};

/// Upper bound on consecutive redirects for one submission.
pub const MAX_REDIRECTS: usize = 16;

pub trait RedirectHandler: Send + Sync {
    /// Rewrite the `Location` of a redirect answered by `current` into the next target.
    fn resolve(&self, current: &Url, location: &str) -> Result<Url>;
}

/// Follows the gateway's `Location` as-is, resolving relative targets against the current URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayRedirectHandler;

impl RedirectHandler for GatewayRedirectHandler {
    fn resolve(&self, current: &Url, location: &str) -> Result<Url> {
        current.join(location).map_err(|e| Error::protocol(format!("invalid redirect location '{location}': {e}")))
    }
}

impl<F> RedirectHandler for F
where
    F: Fn(&Url, &str) -> Result<Url> + Send + Sync,
{
    fn resolve(&self, current: &Url, location: &str) -> Result<Url> { self(current, location) }
}

pub(crate) fn redirect_location(resp: &reqwest::Response) -> Option<String> {
    let redirecting = matches!(
        resp.status(),
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    );
    if !redirecting {
        return None;
    }
    resp.headers().get(reqwest::header::LOCATION)?.to_str().ok().map(str::to_string)
}
