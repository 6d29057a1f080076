/// Largest endpoint response body we read.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ReadBodyError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("response body exceeds {0} bytes")]
    TooLarge(usize),
}

/// Status, content type, and raw body of an endpoint response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl EndpointResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.map(String::from),
            body: body.into(),
        }
    }

    /// Read the response, up to [`MAX_BODY_BYTES`] of body.
    pub async fn from_reqwest(response: reqwest::Response) -> Result<Self, ReadBodyError> {
        Self::from_reqwest_limited(response, MAX_BODY_BYTES).await
    }

    /// Read the response, failing once the body passes `limit` bytes. A
    /// declared `Content-Length` over the limit fails before any read.
    pub async fn from_reqwest_limited(mut response: reqwest::Response, limit: usize) -> Result<Self, ReadBodyError> {
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(ReadBodyError::TooLarge(limit));
        }

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > limit {
                return Err(ReadBodyError::TooLarge(limit));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(Self {
            status,
            content_type,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// Case-insensitive substring match, so parameters such as
    /// `; charset=utf-8` do not matter.
    pub fn has_content_type(&self, media_type: &str) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(media_type))
    }
}
