use crate::error::{Error, Result};
use reqwest::{Client as ReqwestClient, Url};
use std::time::Duration;

#[inline]
pub fn build_http_client(timeout: Duration) -> Result<ReqwestClient> {
    let builder = ReqwestClient::builder();
    let client = builder
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|_| Error::FailedToBuildClient)?;
    Ok(client)
}

/// Substitutes every `{key}` in `template` with the percent-encoded key.
pub fn expand_template(template: &str, key: &str) -> Result<Url> {
    let encoded = url::form_urlencoded::byte_serialize(key.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    let raw = template.replace("{key}", &encoded);
    Url::parse(&raw).map_err(|_| Error::InvalidUpstreamUrl(raw.into()))
}
