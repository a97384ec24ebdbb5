//! Shared HTTP plumbing for the AWS-style JSON and Query protocols

use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};
use url::Url;

use crate::config::AwsConfig;
use crate::error::{Error, Result};

use super::sigv4::Signer;

const AMZ_TARGET: &str = "X-Amz-Target";

/// HTTP client bound to one service endpoint
#[derive(Clone)]
pub struct AwsHttpClient {
    client: Client,
    service: &'static str,
    endpoint: Url,
    signer: Option<Signer>,
}

impl AwsHttpClient {
    /// Create an unsigned client for `service` at `endpoint`
    pub fn new(service: &'static str, endpoint: &str, config: &AwsConfig) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::config(format!("invalid {service} endpoint '{endpoint}': {e}")))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("xcw/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            service,
            endpoint,
            signer: None,
        })
    }

    /// Sign every request with SigV4
    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Service name used in error messages and as the signing name
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// True when requests are signed
    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    /// POST a JSON body to a REST path (e.g. `/ServiceGraph`)
    pub async fn post_rest<B, R>(&self, path: &str, operation: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self
            .endpoint
            .join(path)
            .map_err(|e| Error::config(format!("invalid {} path '{path}': {e}", self.service)))?;

        self.send(operation, self.client.post(url).json(body)).await
    }

    /// POST to a JSON-protocol target (`X-Amz-Target: <target>`)
    pub async fn post_target<B, R>(&self, target: &str, content_type: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;

        let request = self
            .client
            .post(self.endpoint.clone())
            .header(AMZ_TARGET, target)
            .header(CONTENT_TYPE, content_type)
            .body(payload);

        self.send(target, request).await
    }

    /// POST a Query-protocol form, asking for a JSON response
    pub async fn post_query<R>(&self, action: &str, params: &[(&str, &str)]) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let mut form: Vec<(&str, &str)> = vec![("Action", action), ("Version", "2010-03-31")];
        form.extend_from_slice(params);

        let request = self
            .client
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json")
            .form(&form);

        self.send(action, request).await
    }

    async fn send<R: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> Result<R> {
        let mut request = request.build()?;
        if let Some(signer) = &self.signer {
            signer.sign(&mut request, Utc::now())?;
        }

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| self.failure(operation, e.to_string()))?;

        self.decode(operation, response).await
    }

    async fn decode<R: DeserializeOwned>(&self, operation: &str, response: Response) -> Result<R> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(service = self.service, operation, error = %e, "Error reading response body");
            e
        })?;

        if !status.is_success() {
            return Err(self.failure(operation, format!("returned {status}: {body}")));
        }

        debug!(service = self.service, operation, %status, "Upstream call succeeded");

        // Some operations answer with an empty body
        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(body)
            .map_err(|e| self.failure(operation, format!("unexpected response body: {e}")))
    }

    fn failure(&self, operation: &str, message: String) -> Error {
        error!(service = self.service, operation, error = %message, "Upstream call failed");
        Error::upstream(format!("{}:{operation}", self.service), message)
    }
}
