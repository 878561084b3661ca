use std::time::Duration;

use async_trait::async_trait;

use rc_core::{LocatorCodec, ObjectLocator};

use crate::error::GatewayError;

/// Opaque upload collaborator: accepts bytes, returns the canonical URL of
/// the stored object.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        bytes: Vec<u8>,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String, GatewayError>;
}

/// Path-style PUT against the public endpoint.
pub struct HttpObjectStore {
    client: reqwest::Client,
    codec: LocatorCodec,
}

/// Uploads get a generous cap; they still must not hang forever.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

impl HttpObjectStore {
    pub fn new(codec: LocatorCodec) -> Self {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self { client, codec }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        bytes: Vec<u8>,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String, GatewayError> {
        let locator = ObjectLocator {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let url = self.codec.format(&locator);

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::from_response(response).await);
        }

        Ok(url)
    }
}
