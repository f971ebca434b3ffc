//! Response body decoding
//!
//! Bodies are decoded with the charset declared in the `Content-Type` header,
//! falling back to UTF-8 when none is declared or the label is unknown. The raw
//! bytes are kept alongside the text so callers can re-decode or hash them.

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use serde::de::DeserializeOwned;
use tracing::warn;

/// Decoded response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBody {
    raw: Bytes,
    text: String,
    charset: &'static str,
}

impl ResponseBody {
    /// Body as received, byte for byte
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Body decoded with the declared or default charset
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Name of the encoding that was actually used
    pub fn charset(&self) -> &'static str {
        self.charset
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Deserialize the body as JSON
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the body is not valid JSON for `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.text)
    }

    /// Extract one top-level field of a JSON object body
    ///
    /// Returns `None` if the body is not a JSON object or lacks the field.
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        match serde_json::from_str::<serde_json::Value>(&self.text).ok()? {
            serde_json::Value::Object(mut map) => map.remove(name),
            _ => None,
        }
    }
}

/// Extract the `charset` parameter from a `Content-Type` value
pub fn charset_of(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then_some(value)
        } else {
            None
        }
    })
}

/// Decode a body using the declared charset, defaulting to UTF-8
pub fn decode_body(raw: Bytes, content_type: Option<&str>) -> ResponseBody {
    let declared = content_type.and_then(charset_of);

    let encoding = match declared {
        Some(label) => Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
            warn!(charset = label, "Unknown response charset, decoding as UTF-8");
            UTF_8
        }),
        None => UTF_8,
    };

    let (text, used, had_errors) = encoding.decode(&raw);
    if had_errors {
        warn!(
            charset = used.name(),
            bytes = raw.len(),
            "Response body contained malformed sequences; replaced"
        );
    }
    let text = text.into_owned();

    ResponseBody {
        raw,
        text,
        charset: used.name(),
    }
}
