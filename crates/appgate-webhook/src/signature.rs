//! Webhook signature handling
//!
//! Deliveries carry an HMAC of the raw body keyed with the shared webhook
//! secret, as `sha256=<hex>` in `X-Hub-Signature-256` or, for the legacy
//! scheme, `sha1=<hex>` in `X-Hub-Signature`.

use crate::{Result, WebhookError};
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Signature algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// HMAC-SHA256
    HmacSha256,
    /// HMAC-SHA1, only sent in the legacy header
    HmacSha1,
}

impl Default for SignatureAlgorithm {
    fn default() -> Self {
        Self::HmacSha256
    }
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HmacSha256 => "sha256",
            Self::HmacSha1 => "sha1",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "sha256" => Some(Self::HmacSha256),
            "sha1" => Some(Self::HmacSha1),
            _ => None,
        }
    }

    /// The header this algorithm's signature travels in
    pub fn header_name(&self) -> &'static str {
        match self {
            Self::HmacSha256 => SIGNATURE_256_HEADER,
            Self::HmacSha1 => SIGNATURE_HEADER,
        }
    }
}

/// Produce a signature header value (`<alg>=<hex>`) for a payload
pub fn sign(payload: &[u8], secret: &[u8], algorithm: SignatureAlgorithm) -> String {
    let digest = match algorithm {
        SignatureAlgorithm::HmacSha256 => {
            let mut mac =
                HmacSha256::new_from_slice(secret).expect("HMAC can accept any key length");
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        SignatureAlgorithm::HmacSha1 => {
            let mut mac =
                HmacSha1::new_from_slice(secret).expect("HMAC can accept any key length");
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
    };

    format!("{}={}", algorithm.as_str(), digest)
}

/// Check a signature header against the payload.
///
/// Returns `false` for an unknown prefix, bad hex, a digest of the wrong
/// length or a mismatch. The digest comparison is constant time.
pub fn verify(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some((prefix, hex_digest)) = signature_header.trim().split_once('=') else {
        return false;
    };
    let Some(algorithm) = SignatureAlgorithm::from_prefix(prefix) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    match algorithm {
        SignatureAlgorithm::HmacSha256 => match HmacSha256::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(payload);
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
        SignatureAlgorithm::HmacSha1 => match HmacSha1::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(payload);
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
    }
}

/// Webhook verifier bound to the configured shared secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
    allow_sha1: bool,
}

impl WebhookVerifier {
    /// Create a verifier. An empty secret is a configuration error.
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(WebhookError::Configuration(
                "webhook secret must not be empty".to_string(),
            ));
        }

        Ok(Self {
            secret: SecretString::new(secret),
            allow_sha1: false,
        })
    }

    /// Accept the legacy `X-Hub-Signature` header when no SHA-256 header is sent
    pub fn allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    pub fn sha1_allowed(&self) -> bool {
        self.allow_sha1
    }

    /// Verify a single signature header value
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<()> {
        if !self.allow_sha1 && signature_header.trim_start().starts_with("sha1=") {
            return Err(WebhookError::Verification(
                "sha1 signatures are not accepted".to_string(),
            ));
        }

        if verify(payload, signature_header, self.secret.expose_secret().as_bytes()) {
            Ok(())
        } else {
            Err(WebhookError::Verification(
                "signature does not match payload".to_string(),
            ))
        }
    }

    /// Verify a delivery from its headers
    pub fn verify_headers(&self, payload: &[u8], headers: &HeaderMap) -> Result<()> {
        if let Some(value) = headers.get(SIGNATURE_256_HEADER) {
            let value = value.to_str().map_err(|_| {
                WebhookError::Verification("signature header is not valid text".to_string())
            })?;
            return self.verify(payload, value);
        }

        if self.allow_sha1 {
            if let Some(value) = headers.get(SIGNATURE_HEADER) {
                let value = value.to_str().map_err(|_| {
                    WebhookError::Verification("signature header is not valid text".to_string())
                })?;
                return self.verify(payload, value);
            }
        }

        Err(WebhookError::Verification(
            "missing signature header".to_string(),
        ))
    }

    /// Sign a payload with this verifier's secret
    pub fn sign(&self, payload: &[u8], algorithm: SignatureAlgorithm) -> String {
        sign(payload, self.secret.expose_secret().as_bytes(), algorithm)
    }
}

impl fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .field("allow_sha1", &self.allow_sha1)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &[u8] = b"development";

    #[test]
    fn test_sign_and_verify() {
        let payload = br#"{"action":"opened"}"#;

        let signature = sign(payload, SECRET, SignatureAlgorithm::HmacSha256);
        assert!(signature.starts_with("sha256="));
        assert!(verify(payload, &signature, SECRET));

        let legacy = sign(payload, SECRET, SignatureAlgorithm::HmacSha1);
        assert!(legacy.starts_with("sha1="));
        assert!(verify(payload, &legacy, SECRET));
    }

    #[test]
    fn test_known_digest() {
        // HMAC-SHA256("It's a Secret to Everybody", "Hello, World!")
        let signature = sign(
            b"Hello, World!",
            b"It's a Secret to Everybody",
            SignatureAlgorithm::HmacSha256,
        );
        assert_eq!(
            signature,
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn test_wrong_secret() {
        let payload = b"test payload";
        let signature = sign(payload, b"secret-1", SignatureAlgorithm::HmacSha256);

        assert!(!verify(payload, &signature, b"secret-2"));
    }

    #[test]
    fn test_any_single_byte_mutation_fails() {
        let payload = br#"{"action":"opened","issue":{"number":7}}"#.to_vec();
        let signature = sign(&payload, SECRET, SignatureAlgorithm::HmacSha256);

        for i in 0..payload.len() {
            let mut tampered = payload.clone();
            tampered[i] ^= 0x01;
            assert!(!verify(&tampered, &signature, SECRET), "byte {i} mutation verified");
        }
    }

    #[test]
    fn test_empty_body_verifies_against_own_hash() {
        let signature = sign(b"", SECRET, SignatureAlgorithm::HmacSha256);
        assert!(verify(b"", &signature, SECRET));
        assert!(!verify(b" ", &signature, SECRET));
    }

    #[test]
    fn test_malformed_headers_return_false() {
        let payload = b"payload";
        let good = sign(payload, SECRET, SignatureAlgorithm::HmacSha256);
        let digest = good.trim_start_matches("sha256=");

        assert!(!verify(payload, "", SECRET));
        assert!(!verify(payload, digest, SECRET));
        assert!(!verify(payload, &format!("md5={digest}"), SECRET));
        assert!(!verify(payload, "sha256=not-hex", SECRET));
        assert!(!verify(payload, &format!("sha256={}", &digest[..10]), SECRET));
        assert!(!verify(payload, &format!("sha1={digest}"), SECRET));
    }

    #[test]
    fn test_empty_secret_is_configuration_error() {
        let err = WebhookVerifier::new("").unwrap_err();
        assert!(matches!(err, WebhookError::Configuration(_)));
    }

    #[test]
    fn test_verify_headers_prefers_sha256() {
        let verifier = WebhookVerifier::new("development").unwrap().allow_sha1(true);
        let payload = b"payload";

        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_256_HEADER,
            HeaderValue::from_str(&verifier.sign(payload, SignatureAlgorithm::HmacSha256))
                .unwrap(),
        );
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("sha1=00"));

        assert!(verifier.verify_headers(payload, &headers).is_ok());
    }

    #[test]
    fn test_sha1_fallback_requires_opt_in() {
        let payload = b"payload";
        let strict = WebhookVerifier::new("development").unwrap();
        let legacy = strict.clone().allow_sha1(true);

        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&strict.sign(payload, SignatureAlgorithm::HmacSha1)).unwrap(),
        );

        assert!(matches!(
            strict.verify_headers(payload, &headers),
            Err(WebhookError::Verification(_))
        ));
        assert!(legacy.verify_headers(payload, &headers).is_ok());
    }

    #[test]
    fn test_missing_header_is_verification_error() {
        let verifier = WebhookVerifier::new("development").unwrap();
        let err = verifier.verify_headers(b"payload", &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, WebhookError::Verification(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let verifier = WebhookVerifier::new("super-secret").unwrap();
        let debug = format!("{verifier:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
