//! AWS SigV4 query presigning.
//!
//! Hand-rolled: canonical request, HMAC-SHA256 key chain, sorted encoded
//! query. Produces URLs usable both for client-direct transfer grants and
//! for the adapter's own object operations.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use urlencoding::encode;
use vs_core::S3Config;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Presigner for one bucket/endpoint configuration.
pub struct Presigner<'a> {
    config: &'a S3Config,
}

impl<'a> Presigner<'a> {
    pub fn new(config: &'a S3Config) -> Self {
        Self { config }
    }

    fn scheme(&self) -> &str {
        match &self.config.endpoint {
            Some(endpoint) if endpoint.starts_with("http://") => "http",
            _ => "https",
        }
    }

    fn endpoint_host(&self) -> Option<String> {
        self.config.endpoint.as_ref().map(|e| {
            e.trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        })
    }

    pub fn host(&self) -> String {
        let base = self
            .endpoint_host()
            .unwrap_or_else(|| format!("s3.{}.amazonaws.com", self.config.region));
        if self.config.path_style {
            base
        } else {
            format!("{}.{}", self.config.bucket, base)
        }
    }

    /// Canonical URI for a key; empty key addresses the bucket itself.
    pub fn uri_path(&self, key: &str) -> String {
        let mut path = String::new();
        if self.config.path_style {
            path.push('/');
            path.push_str(&encode(&self.config.bucket));
        }
        if key.is_empty() {
            path.push('/');
        } else {
            for segment in key.split('/') {
                path.push('/');
                path.push_str(&encode(segment));
            }
        }
        path
    }

    /// Build a presigned URL.
    ///
    /// `signed_headers` are headers the caller will send verbatim with the
    /// request (beyond `host`, which is always signed). `now` is injected
    /// so tests are deterministic.
    pub fn presign(
        &self,
        method: &str,
        key: &str,
        extra_query: &[(String, String)],
        signed_headers: &[(String, String)],
        ttl_secs: u64,
        now: DateTime<Utc>,
    ) -> String {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let datestamp = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", datestamp, self.config.region);
        let credential = format!("{}/{}", self.config.access_key_id, scope);

        // canonical headers: host plus whatever the caller sends
        let mut headers: Vec<(String, String)> = vec![("host".to_string(), self.host())];
        for (name, value) in signed_headers {
            headers.push((name.to_lowercase(), value.trim().to_string()));
        }
        headers.sort();
        let signed_header_list = headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value))
            .collect();

        // canonical query: auth parameters plus caller query, sorted encoded
        let mut query: Vec<(String, String)> = vec![
            ("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()),
            ("X-Amz-Credential".to_string(), credential),
            ("X-Amz-Date".to_string(), amz_date.clone()),
            ("X-Amz-Expires".to_string(), ttl_secs.to_string()),
            ("X-Amz-SignedHeaders".to_string(), signed_header_list.clone()),
        ];
        query.extend(extra_query.iter().cloned());
        let mut encoded: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (encode(k).into_owned(), encode(v).into_owned()))
            .collect();
        encoded.sort();
        let canonical_query = encoded
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let uri = self.uri_path(key);
        let canonical_request = [
            method,
            &uri,
            &canonical_query,
            &canonical_headers,
            &signed_header_list,
            UNSIGNED_PAYLOAD,
        ]
        .join("\n");

        let string_to_sign = [
            ALGORITHM,
            &amz_date,
            &scope,
            &sha256_hex(canonical_request.as_bytes()),
        ]
        .join("\n");

        let key_secret = format!("AWS4{}", self.config.secret_access_key);
        let key_date = hmac(key_secret.as_bytes(), datestamp.as_bytes());
        let key_region = hmac(&key_date, self.config.region.as_bytes());
        let key_service = hmac(&key_region, b"s3");
        let key_signing = hmac(&key_service, b"aws4_request");
        let signature = hex::encode(hmac(&key_signing, string_to_sign.as_bytes()));

        format!(
            "{}://{}{}?{}&X-Amz-Signature={}",
            self.scheme(),
            self.host(),
            uri,
            canonical_query,
            signature
        )
    }
}
