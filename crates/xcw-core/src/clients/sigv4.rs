//! AWS Signature Version 4 request signing
//!
//! Signs every header already present on the request plus `host` and
//! `x-amz-date`. Requests built by [`super::AwsHttpClient`] carry no query
//! string, so the canonical query is the raw (already encoded) query sorted
//! by pair.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Request;
use sha2::{Digest, Sha256};

use crate::config::AwsConfig;
use crate::error::{Error, Result};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const AMZ_DATE: &str = "x-amz-date";
const AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";

type HmacSha256 = Hmac<Sha256>;

/// Access key pair, optionally with a session token
#[derive(Clone)]
pub struct Credentials {
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Session token for temporary credentials
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Create credentials from a key pair
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Credentials from `aws.*` config, else the standard `AWS_*` variables
    pub fn resolve(config: &AwsConfig) -> Option<Self> {
        if let (Some(id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            let credentials = Self::new(id, secret);
            return Some(match &config.session_token {
                Some(token) => credentials.with_session_token(token),
                None => credentials,
            });
        }

        let id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        let credentials = Self::new(id, secret);
        Some(match std::env::var("AWS_SESSION_TOKEN") {
            Ok(token) if !token.is_empty() => credentials.with_session_token(token),
            _ => credentials,
        })
    }
}

/// Signs requests for one service in one region
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
    region: String,
    service: String,
}

impl Signer {
    /// Create a signer for `service` in `region`
    pub fn new(credentials: Credentials, region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
        }
    }

    /// Add `x-amz-date`, the session token if any, and `authorization`
    pub fn sign(&self, request: &mut Request, at: DateTime<Utc>) -> Result<()> {
        let amz_date = at.format("%Y%m%dT%H%M%SZ").to_string();
        let date = at.format("%Y%m%d").to_string();

        let headers = request.headers_mut();
        headers.insert(HeaderName::from_static(AMZ_DATE), header_value(&amz_date)?);
        if let Some(token) = &self.credentials.session_token {
            headers.insert(HeaderName::from_static(AMZ_SECURITY_TOKEN), header_value(token)?);
        }

        let (canonical, signed_headers) = canonical_request(request)?;
        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );

        let key = signing_key(&self.credentials.secret_access_key, &date, &self.region, &self.service);
        let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.credentials.access_key_id
        );
        request
            .headers_mut()
            .insert(AUTHORIZATION, header_value(&authorization)?);

        Ok(())
    }
}

/// Canonical request text and the `;`-joined signed header names
fn canonical_request(request: &Request) -> Result<(String, String)> {
    let url = request.url();
    let host = url
        .host_str()
        .ok_or_else(|| Error::config(format!("cannot sign request without host: {url}")))?;
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut headers = vec![("host".to_string(), host)];
    for (name, value) in request.headers() {
        let value = value
            .to_str()
            .map_err(|e| Error::config(format!("cannot sign header {name}: {e}")))?;
        headers.push((name.as_str().to_ascii_lowercase(), value.trim().to_string()));
    }
    headers.sort();

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let mut query: Vec<&str> = url.query().map(|q| q.split('&').collect()).unwrap_or_default();
    query.sort_unstable();

    let payload = request.body().and_then(|body| body.as_bytes()).unwrap_or_default();

    let canonical = format!(
        "{}\n{}\n{}\n{canonical_headers}\n{signed_headers}\n{}",
        request.method().as_str(),
        url.path(),
        query.join("&"),
        hex::encode(Sha256::digest(payload))
    );

    Ok((canonical, signed_headers))
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::config(format!("invalid header value: {e}")))
}
