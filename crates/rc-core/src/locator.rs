use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid asset URL: {url}")]
pub struct LocatorError {
    pub url: String,
}

/// A bucket + key pair identifying a stored asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectLocator {
    pub bucket: String,
    pub key: String,
}

/// Parses and formats the canonical asset URL form
/// `<public-endpoint>/<bucket>/<key...>`.
#[derive(Debug, Clone)]
pub struct LocatorCodec {
    public_endpoint: String,
}

impl LocatorCodec {
    pub fn new(public_endpoint: impl Into<String>) -> Self {
        let mut endpoint = public_endpoint.into();
        while endpoint.ends_with('/') {
            endpoint.pop();
        }
        Self {
            public_endpoint: endpoint,
        }
    }

    pub fn public_endpoint(&self) -> &str {
        &self.public_endpoint
    }

    /// Splits an asset URL into bucket and key.
    ///
    /// Accepts both the configured public-endpoint prefix form and a generic
    /// URL whose path segments are `[bucket, ...keyParts]`. Fails when fewer
    /// than two path segments remain.
    pub fn parse(&self, url: &str) -> Result<ObjectLocator, LocatorError> {
        let path = match url.strip_prefix(&self.public_endpoint) {
            Some(rest) if !self.public_endpoint.is_empty() => rest,
            _ => {
                // Generic form: drop the scheme and host, keep the path.
                let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
                after_scheme.split_once('/').map(|(_, rest)| rest).unwrap_or("")
            }
        };

        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let bucket = segments.next();
        let key = segments.collect::<Vec<_>>().join("/");

        match bucket {
            Some(bucket) if !key.is_empty() => Ok(ObjectLocator {
                bucket: bucket.to_string(),
                key,
            }),
            _ => Err(LocatorError {
                url: url.to_string(),
            }),
        }
    }

    /// Deterministic inverse of [`parse`](Self::parse).
    pub fn format(&self, locator: &ObjectLocator) -> String {
        format!("{}/{}/{}", self.public_endpoint, locator.bucket, locator.key)
    }
}

/// Returns the substring after the last `.` of a filename.
///
/// Files without an extension default to `"jpg"`; uploads always get some
/// extension.
pub fn extension_of(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => "jpg",
    }
}
