//! S3 Presigner
//!
//! AWS Signature Version 4 query-string signing. Only `host` is signed and
//! the payload is `UNSIGNED-PAYLOAD`, so the URL can be handed to a browser
//! as is.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::time::Duration;

use crate::blob::{BlobStore, SignedUrl};
use crate::error::{MediaError, Result};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const MAX_EXPIRY_SECS: u64 = 604_800;

/// S3 bucket credentials and URL lifetimes
#[derive(Clone)]
pub struct S3Config {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,

    /// Path-style endpoint for S3-compatible stores (MinIO, R2, localstack)
    pub endpoint: Option<String>,

    pub upload_ttl: Duration,
    pub download_ttl: Duration,
}

impl S3Config {
    pub fn new(
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            bucket: bucket.into(),
            endpoint: None,
            upload_ttl: Duration::from_secs(3600),
            download_ttl: Duration::from_secs(3600),
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint
            .map(|e| e.trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty());
        self
    }
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("upload_ttl", &self.upload_ttl)
            .field("download_ttl", &self.download_ttl)
            .finish()
    }
}

/// Where an object lives: URL prefix, `Host` header and canonical path prefix
struct Location {
    base: String,
    host: String,
    path_prefix: String,
}

/// Presigns S3 object URLs
pub struct S3Presigner {
    config: S3Config,
    location: Location,
}

impl S3Presigner {
    pub fn new(config: S3Config) -> Result<Self> {
        if config.bucket.is_empty() || config.region.is_empty() {
            return Err(MediaError::Config("bucket and region are required".into()));
        }

        let location = match &config.endpoint {
            Some(endpoint) => {
                let (scheme, rest) = endpoint
                    .split_once("://")
                    .ok_or_else(|| MediaError::Config(format!("endpoint {endpoint} has no scheme")))?;
                let host = rest.split('/').next().unwrap_or_default();
                if host.is_empty() {
                    return Err(MediaError::Config(format!("endpoint {endpoint} has no host")));
                }
                Location {
                    base: format!("{scheme}://{host}"),
                    host: host.to_string(),
                    path_prefix: format!("/{}", uri_encode(&config.bucket, false)),
                }
            }
            None => {
                // us-east-1 buckets answer on the legacy global hostname
                let host = if config.region == "us-east-1" {
                    format!("{}.s3.amazonaws.com", config.bucket)
                } else {
                    format!("{}.s3.{}.amazonaws.com", config.bucket, config.region)
                };
                Location {
                    base: format!("https://{host}"),
                    host,
                    path_prefix: String::new(),
                }
            }
        };

        Ok(Self { config, location })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Presign `method` on `key` at a given instant
    pub fn presign_at(
        &self,
        method: &str,
        key: &str,
        ttl: Duration,
        extra_query: &[(&str, &str)],
        now: DateTime<Utc>,
    ) -> Result<SignedUrl> {
        let expires = ttl.as_secs().clamp(1, MAX_EXPIRY_SECS);
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.config.region);
        let credential = format!("{}/{scope}", self.config.access_key_id);

        let mut query: Vec<(String, String)> = vec![
            ("X-Amz-Algorithm".into(), uri_encode(ALGORITHM, true)),
            ("X-Amz-Credential".into(), uri_encode(&credential, true)),
            ("X-Amz-Date".into(), amz_date.clone()),
            ("X-Amz-Expires".into(), expires.to_string()),
            ("X-Amz-SignedHeaders".into(), "host".into()),
        ];
        query.extend(
            extra_query
                .iter()
                .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true))),
        );
        query.sort();

        let canonical_query = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let path = format!(
            "{}/{}",
            self.location.path_prefix,
            uri_encode(key.trim_start_matches('/'), false)
        );

        let canonical_request = format!(
            "{method}\n{path}\n{canonical_query}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            self.location.host
        );

        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = self.signing_key(&date)?;
        let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes())?);

        let expires_secs = i64::try_from(expires).unwrap_or(0);
        Ok(SignedUrl {
            url: format!(
                "{}{path}?{canonical_query}&X-Amz-Signature={signature}",
                self.location.base
            ),
            expires_at: now + ChronoDuration::seconds(expires_secs),
        })
    }

    fn signing_key(&self, date: &str) -> Result<Vec<u8>> {
        let secret = format!("AWS4{}", self.config.secret_access_key);
        let k_date = hmac(secret.as_bytes(), date.as_bytes())?;
        let k_region = hmac(&k_date, self.config.region.as_bytes())?;
        let k_service = hmac(&k_region, SERVICE.as_bytes())?;
        hmac(&k_service, b"aws4_request")
    }
}

impl BlobStore for S3Presigner {
    fn presign_upload(&self, key: &str, content_type: &str) -> Result<SignedUrl> {
        let signed = self.presign_at("PUT", key, self.config.upload_ttl, &[], Utc::now())?;
        tracing::debug!(key = %key, content_type = %content_type, expires_at = %signed.expires_at, "Presigned upload");
        Ok(signed)
    }

    fn presign_download(&self, key: &str) -> Result<SignedUrl> {
        self.presign_at(
            "GET",
            key,
            self.config.download_ttl,
            &[("response-content-disposition", "inline")],
            Utc::now(),
        )
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}{}/{}",
            self.location.base,
            self.location.path_prefix,
            uri_encode(key.trim_start_matches('/'), false)
        )
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| MediaError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// SigV4 URI encoding: everything but unreserved characters is escaped
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b'/' if !encode_slash => out.push('/'),
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}
