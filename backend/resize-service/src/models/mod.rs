/// Data models for resize-service
///
/// This module defines structures for:
/// - ImageKey: stable identifier of one (url, width, height) rendition
/// - ResizeRequest / ResizeResult: the public JSON contract
///
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

// ========================================
// Image Key
// ========================================

/// Hex-encoded SHA-256 of `"{url}_{width}_{height}"`.
///
/// Used as the cache key, the status table key and the id in retrieval URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey(String);

impl ImageKey {
    pub fn derive(url: &str, width: u32, height: u32) -> Self {
        Self::from_source(&format!("{}_{}_{}", url, width, height))
    }

    fn from_source(source: &str) -> Self {
        Self(hex::encode(Sha256::digest(source.as_bytes())))
    }

    /// Accept a client-supplied id only if it has the shape of a derived key
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == 64
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ImageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ========================================
// Resize Models
// ========================================

/// Body of `POST /v1/resize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    /// Target width; 0 or absent keeps the aspect ratio from `height`
    #[serde(default)]
    pub width: u32,
    /// Target height; 0 or absent keeps the aspect ratio from `width`
    #[serde(default)]
    pub height: u32,
}

/// Outcome of one input URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeStatus {
    Success,
    Failure,
    Processing,
}

impl ResizeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Processing => "processing",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeResult {
    pub result: ResizeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub cached: bool,
}

impl ResizeResult {
    pub fn success(url: String, cached: bool) -> Self {
        Self {
            result: ResizeStatus::Success,
            url: Some(url),
            cached,
        }
    }

    pub fn failure() -> Self {
        Self {
            result: ResizeStatus::Failure,
            url: None,
            cached: false,
        }
    }

    /// Placeholder returned by the async path before the image exists
    pub fn processing(url: String) -> Self {
        Self {
            result: ResizeStatus::Processing,
            url: Some(url),
            cached: true,
        }
    }
}
