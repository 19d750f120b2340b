//! Legacy Basic-Auth credential decoding.
//!
//! Appliances in the field authenticate with HTTP Basic credentials where
//! both fields are 16-character factory tokens. The concatenation of the two
//! (the composite key) is the directory lookup key and is stored as-is:
//! hashing it would break compatibility with the deployed firmware, which is
//! why this module never touches a digest.

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;

/// Why a credential header failed to decode.
///
/// The set is closed: the access gate maps every variant to the same
/// "no usable credential" policy, the distinction only feeds logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Header absent, or not the `Basic` scheme.
    #[error("missing Basic authorization header")]
    Missing,
    /// Payload is not valid base64 (or not a valid credential string).
    #[error("malformed base64 payload")]
    MalformedBase64,
    /// Decoded payload has no `:` separator.
    #[error("malformed credential separator")]
    MalformedSeparator,
}

/// A decoded device credential pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCredential {
    pub username: String,
    pub password: String,
    /// Base64 payload exactly as it appeared on the wire, kept for the
    /// connection record.
    pub raw_encoded: String,
}

impl DeviceCredential {
    /// The directory key: username and password concatenated directly.
    /// Deliberately not hashed (wire compatibility with deployed firmware).
    pub fn composite_key(&self) -> String {
        format!("{}{}", self.username, self.password)
    }

    /// The decoded `username:password` string for the connection record.
    pub fn raw_decoded(&self) -> String {
        format!("{}:{}", self.username, self.password)
    }
}

/// Decode an `Authorization` header into a [`DeviceCredential`].
///
/// Pure and deterministic: the same header always yields the same result.
/// Field lengths are not validated; legacy firmware sends 16+16 characters,
/// but the directory accepts any shape the device presents. The split is on
/// the first `:` only, so passwords may themselves contain colons.
pub fn decode_basic_header(header: Option<&str>) -> Result<DeviceCredential, DecodeError> {
    let payload = header
        .and_then(|h| h.strip_prefix("Basic "))
        .ok_or(DecodeError::Missing)?;

    let decoded = STANDARD
        .decode(payload)
        .map_err(|_| DecodeError::MalformedBase64)?;
    // The legacy firmware only ever sends ASCII; anything that is not valid
    // UTF-8 cannot become a directory key.
    let decoded = String::from_utf8(decoded).map_err(|_| DecodeError::MalformedBase64)?;

    let (username, password) = decoded
        .split_once(':')
        .ok_or(DecodeError::MalformedSeparator)?;

    Ok(DeviceCredential {
        username: username.to_string(),
        password: password.to_string(),
        raw_encoded: payload.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    // 16 'a' characters, a colon, 16 'b' characters.
    const FACTORY_HEADER: &str = "Basic YWFhYWFhYWFhYWFhYWFhYTpiYmJiYmJiYmJiYmJiYmJi";

    #[test]
    fn decodes_factory_credential() {
        let cred = decode_basic_header(Some(FACTORY_HEADER)).unwrap();
        assert_eq!(cred.username, "aaaaaaaaaaaaaaaa");
        assert_eq!(cred.password, "bbbbbbbbbbbbbbbb");
        assert_eq!(
            cred.composite_key(),
            "aaaaaaaaaaaaaaaabbbbbbbbbbbbbbbb"
        );
        assert_eq!(cred.raw_decoded(), "aaaaaaaaaaaaaaaa:bbbbbbbbbbbbbbbb");
        assert_eq!(cred.raw_encoded, "YWFhYWFhYWFhYWFhYWFhYTpiYmJiYmJiYmJiYmJiYmJi");
    }

    #[test]
    fn decoding_is_deterministic() {
        let first = decode_basic_header(Some(FACTORY_HEADER)).unwrap();
        let second = decode_basic_header(Some(FACTORY_HEADER)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.composite_key(), second.composite_key());
    }

    #[test]
    fn missing_or_wrong_scheme_is_missing() {
        assert_eq!(decode_basic_header(None), Err(DecodeError::Missing));
        assert_eq!(
            decode_basic_header(Some("Bearer abcdef")),
            Err(DecodeError::Missing)
        );
        // Scheme match is exact, including case.
        assert_eq!(
            decode_basic_header(Some("basic YWE6YmI=")),
            Err(DecodeError::Missing)
        );
    }

    #[test]
    fn garbage_payload_is_malformed_base64() {
        assert_eq!(
            decode_basic_header(Some("Basic !!!not-base64!!!")),
            Err(DecodeError::MalformedBase64)
        );
    }

    #[test]
    fn non_utf8_payload_is_malformed_base64() {
        let payload = STANDARD.encode([0xff, 0xfe, b':', 0xfd]);
        assert_eq!(
            decode_basic_header(Some(&format!("Basic {payload}"))),
            Err(DecodeError::MalformedBase64)
        );
    }

    #[test]
    fn payload_without_separator_is_rejected() {
        let payload = STANDARD.encode("credentialwithoutcolon");
        assert_eq!(
            decode_basic_header(Some(&format!("Basic {payload}"))),
            Err(DecodeError::MalformedSeparator)
        );
    }

    #[test]
    fn splits_on_first_colon_only() {
        let payload = STANDARD.encode("user:pa:ss:word");
        let cred = decode_basic_header(Some(&format!("Basic {payload}"))).unwrap();
        assert_eq!(cred.username, "user");
        assert_eq!(cred.password, "pa:ss:word");
        assert_eq!(cred.composite_key(), "userpa:ss:word");
    }

    #[test]
    fn short_fields_are_accepted() {
        let payload = STANDARD.encode("a:b");
        let cred = decode_basic_header(Some(&format!("Basic {payload}"))).unwrap();
        assert_eq!(cred.composite_key(), "ab");

        let payload = STANDARD.encode(":");
        let cred = decode_basic_header(Some(&format!("Basic {payload}"))).unwrap();
        assert_eq!(cred.composite_key(), "");
    }
}
