//! Payload body codec.
//!
//! The dispatch and reception layers never touch body bytes directly. They
//! convert typed payloads to and from a `serde_json::Value` and let a
//! [`PayloadCodec`] turn that value into wire bytes plus a content type.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::{Error, Result};

/// Content type produced by [`JsonCodec`].
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Output of [`PayloadCodec::serialize_body`].
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedBody {
    pub content_type: Arc<str>,
    pub body: Bytes,
}

/// Serialize/deserialize contract with content-type negotiation.
pub trait PayloadCodec: Send + Sync {
    /// Encode a payload value into a body.
    fn serialize_body(&self, value: &Value) -> Result<SerializedBody>;

    /// Decode a body received with `content_type`.
    ///
    /// # Errors
    ///
    /// Implementations return [`Error::UnsupportedContentType`] for content
    /// types they cannot read.
    fn deserialize_body(&self, body: &[u8], content_type: Option<&str>) -> Result<Value>;
}

/// Shared codec pointer.
pub type CodecPtr = Arc<dyn PayloadCodec>;

/// UTF-8 JSON codec.
///
/// Bodies without a content type are assumed to be JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl JsonCodec {
    fn accepts(content_type: &str) -> bool {
        // ---
        let mime = content_type.split(';').next().unwrap_or("").trim();
        mime.eq_ignore_ascii_case(JSON_CONTENT_TYPE) || mime.to_ascii_lowercase().ends_with("+json")
    }
}

impl PayloadCodec for JsonCodec {
    fn serialize_body(&self, value: &Value) -> Result<SerializedBody> {
        // ---
        let bytes = serde_json::to_vec(value)?;
        Ok(SerializedBody {
            content_type: Arc::from(JSON_CONTENT_TYPE),
            body: Bytes::from(bytes),
        })
    }

    fn deserialize_body(&self, body: &[u8], content_type: Option<&str>) -> Result<Value> {
        // ---
        match content_type {
            Some(ct) if !Self::accepts(ct) => Err(Error::UnsupportedContentType(ct.to_string())),
            _ => Ok(serde_json::from_slice(body)?),
        }
    }
}
