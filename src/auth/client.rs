//! Authenticated provider API client
//!
//! A [`ServiceClient`] is what a tool handler receives after credential
//! resolution: an HTTP client bound to one service, one API version, and
//! one access token. Handlers never see raw credentials beyond the bearer
//! token embedded here, and never construct their own transport.

use std::sync::Arc;

use serde_json::Value;

use crate::auth::record::ServiceKind;
use crate::error::ToolgateError;

/// An HTTP client bound to a provider service with a bearer token attached
/// to every request.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Arc<reqwest::Client>,
    service: ServiceKind,
    api_version: String,
    base_url: String,
    access_token: String,
    identity: String,
}

impl ServiceClient {
    /// Binds a client to a service endpoint and access token.
    ///
    /// `base_url` has any trailing slash removed so path joining in the
    /// request helpers is uniform.
    pub fn new(
        http: Arc<reqwest::Client>,
        service: ServiceKind,
        api_version: impl Into<String>,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            service,
            api_version: api_version.into(),
            base_url,
            access_token: access_token.into(),
            identity: identity.into(),
        }
    }

    /// The service this client is bound to.
    pub fn service(&self) -> ServiceKind {
        self.service
    }

    /// The API version this client is bound to.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// The identity whose credential backs this client.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The resolved base URL, without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issues a GET request against `path` (relative to the base URL) and
    /// parses the JSON response body.
    ///
    /// # Errors
    ///
    /// Returns [`ToolgateError::Provider`] on a non-success status, with
    /// the provider's response body attached.
    pub async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ToolgateError> {
        let resp = self
            .http
            .get(self.url(path))
            .query(query)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Self::parse_response(resp).await
    }

    /// Issues a POST request with a JSON body and parses the JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`ToolgateError::Provider`] on a non-success status.
    pub async fn post_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value, ToolgateError> {
        let resp = self
            .http
            .post(self.url(path))
            .query(query)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        Self::parse_response(resp).await
    }

    /// Issues a PUT request with a JSON body and parses the JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`ToolgateError::Provider`] on a non-success status.
    pub async fn put_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value, ToolgateError> {
        let resp = self
            .http
            .put(self.url(path))
            .query(query)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        Self::parse_response(resp).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn parse_response(resp: reqwest::Response) -> Result<Value, ToolgateError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolgateError::Provider(format!(
                "provider returned {status}: {body}"
            )));
        }
        Ok(resp.json().await?)
    }
}
