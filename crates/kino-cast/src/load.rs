//! Media load requests sent to the receiver
//!
//! A [`MediaLoadRequest`] is built fresh for every cast attempt and never
//! changes afterwards. The media description is always wrapped in the generic
//! metadata envelope; nothing format-specific is derived from the source.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Receiver metadata kinds. Only the generic envelope is ever produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataType {
    Generic,
}

/// Generic metadata envelope attached to every load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericMediaMetadata {
    pub metadata_type: MetadataType,
}

impl Default for GenericMediaMetadata {
    fn default() -> Self {
        Self {
            metadata_type: MetadataType::Generic,
        }
    }
}

/// What to play on the receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub content_id: String,
    pub content_type: String,
    pub metadata: GenericMediaMetadata,
}

/// Immutable load request handed to a cast session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaLoadRequest {
    media: MediaInfo,
    autoplay: bool,
    current_time: f64,
}

impl MediaLoadRequest {
    pub fn source_uri(&self) -> &str {
        &self.media.content_id
    }

    pub fn mime_type(&self) -> &str {
        &self.media.content_type
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    /// Receiver start position in seconds
    pub fn start_offset_seconds(&self) -> f64 {
        self.current_time
    }

    pub fn media(&self) -> &MediaInfo {
        &self.media
    }

    /// Serialize to the receiver's JSON shape
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Builder for [`MediaLoadRequest`]
#[derive(Debug, Clone)]
pub struct MediaLoadRequestBuilder {
    source_uri: String,
    mime_type: String,
    autoplay: bool,
    start_offset_seconds: f64,
}

impl MediaLoadRequestBuilder {
    pub fn new(source_uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            source_uri: source_uri.into(),
            mime_type: mime_type.into(),
            autoplay: true,
            start_offset_seconds: 0.0,
        }
    }

    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn with_start_offset(mut self, seconds: f64) -> Self {
        self.start_offset_seconds = seconds;
        self
    }

    pub fn build(self) -> Result<MediaLoadRequest> {
        if self.source_uri.trim().is_empty() {
            return Err(Error::InvalidArgument("source URI is empty".into()));
        }
        if self.mime_type.trim().is_empty() {
            return Err(Error::InvalidArgument("MIME type is empty".into()));
        }
        if !self.start_offset_seconds.is_finite() || self.start_offset_seconds < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "start offset must be a non-negative number of seconds, got {}",
                self.start_offset_seconds
            )));
        }

        Ok(MediaLoadRequest {
            media: MediaInfo {
                content_id: self.source_uri,
                content_type: self.mime_type,
                metadata: GenericMediaMetadata::default(),
            },
            autoplay: self.autoplay,
            current_time: self.start_offset_seconds,
        })
    }
}
