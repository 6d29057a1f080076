//! Bearer-token GET against a client's UserInfo endpoint.

use std::time::Duration;

use crate::jose::ValidatedClaims;

use super::response::EndpointResponse;
use super::validator::{TokenResponseError, TokenResponseValidator};

#[derive(Debug, thiserror::Error)]
pub enum UserInfoError {
    #[error("UserInfo endpoint {endpoint} for client {client_id} is not HTTPS")]
    NotHttps { endpoint: String, client_id: String },

    #[error("request to UserInfo endpoint {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("UserInfo endpoint {endpoint} returned {status}: {body}")]
    Not200 { endpoint: String, status: u16, body: String },

    #[error(transparent)]
    Response(#[from] TokenResponseError),
}

pub struct UserInfoRequestor<'a> {
    http_client: &'a reqwest::Client,
    endpoint: String,
    access_token: String,
    client_id: String,
    timeout: Duration,
    allow_insecure: bool,
}

impl<'a> UserInfoRequestor<'a> {
    pub fn new(
        http_client: &'a reqwest::Client,
        endpoint: impl Into<String>,
        access_token: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            access_token: access_token.into(),
            client_id: client_id.into(),
            timeout: Duration::from_secs(10),
            allow_insecure: false,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Permit `http://` endpoints.
    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Fetch and validate. A 200 response without claims is `Ok(None)`.
    pub async fn request_claims(
        &self,
        validator: &TokenResponseValidator<'_>,
    ) -> Result<Option<ValidatedClaims>, UserInfoError> {
        let response = self.fetch().await?;
        if response.status != 200 {
            return Err(UserInfoError::Not200 {
                endpoint: self.endpoint.clone(),
                status: response.status,
                body: response.body,
            });
        }
        Ok(validator.validate(&response).await?)
    }

    async fn fetch(&self) -> Result<EndpointResponse, UserInfoError> {
        if !self.allow_insecure && !self.endpoint.to_ascii_lowercase().starts_with("https://") {
            return Err(UserInfoError::NotHttps {
                endpoint: self.endpoint.clone(),
                client_id: self.client_id.clone(),
            });
        }

        let request_failed = |message: String| UserInfoError::Request {
            endpoint: self.endpoint.clone(),
            message,
        };
        let response = self
            .http_client
            .get(&self.endpoint)
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| request_failed(e.to_string()))?;
        EndpointResponse::from_reqwest(response)
            .await
            .map_err(|e| request_failed(e.to_string()))
    }
}
