//! Signed read links for stored files.
//!
//! The token is an HMAC-SHA256 over bucket, key, response headers and expiry,
//! so none of them can be changed without invalidating the link.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::ContentHeaders;
use crate::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signs time-limited file links.
#[derive(Clone)]
pub struct SignedUrlGenerator {
    /// MAC keyed with the signing secret
    mac: HmacSha256,
    ttl: Duration,
}

impl fmt::Debug for SignedUrlGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedUrlGenerator")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SignedUrlGenerator {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| AppError::Config(format!("invalid signing secret: {}", e)))?;
        Ok(Self { mac, ttl })
    }

    /// Sign a link to `key` in `bucket`, valid for the configured TTL.
    pub fn generate(&self, bucket: &str, key: &str, headers: &ContentHeaders) -> SignedUrl {
        self.generate_at(bucket, key, headers, Utc::now() + self.ttl)
    }

    fn generate_at(
        &self,
        bucket: &str,
        key: &str,
        headers: &ContentHeaders,
        expires_at: DateTime<Utc>,
    ) -> SignedUrl {
        let mut url = SignedUrl {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: headers.content_type.to_string(),
            disposition: headers.disposition.to_string(),
            expires_at,
            signature: String::new(),
        };
        url.signature = self.sign(&url.message());
        url
    }

    fn sign(&self, message: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(message.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

/// A signed file link.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedUrl {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub disposition: String,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
}

impl SignedUrl {
    fn message(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.bucket,
            self.key,
            self.content_type,
            self.disposition,
            self.expires_at.timestamp()
        )
    }

    /// Render the link against the public base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!(
            "{}/files/{}/{}?content-type={}&disposition={}&expires={}&token={}",
            base_url.trim_end_matches('/'),
            self.bucket,
            percent_encode(&self.key),
            percent_encode(&self.content_type),
            self.disposition,
            self.expires_at.timestamp(),
            self.signature
        )
    }
}

/// Percent-encode everything outside the URL unreserved set.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}
