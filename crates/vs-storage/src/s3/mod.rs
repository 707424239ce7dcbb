//! S3-compatible object store backend.
//!
//! Object operations run as plain HTTP requests against self-presigned
//! URLs, so the adapter works against AWS and S3-compatible endpoints
//! (MinIO, etc.) without a vendor SDK.

mod sign;

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use regex::Regex;
use reqwest::Method;
use tracing::debug;
use urlencoding::encode;
use vs_core::{BlobBackend, S3Config};

use crate::backend::{BlobError, BlobResult, BlobStore, BlobTags};
use sign::Presigner;

/// TTL for URLs the adapter signs for its own requests, generous enough to
/// ride out retries. Client-facing grants use the caller's TTL.
const INTERNAL_TTL_SECS: u64 = 300;

pub struct S3BlobStore {
    config: S3Config,
    http: reqwest::Client,
}

impl S3BlobStore {
    pub fn new(config: S3Config) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn presign(
        &self,
        method: &str,
        key: &str,
        extra_query: &[(String, String)],
        signed_headers: &[(String, String)],
        ttl_secs: u64,
    ) -> String {
        Presigner::new(&self.config).presign(
            method,
            key,
            extra_query,
            signed_headers,
            ttl_secs,
            Utc::now(),
        )
    }

    fn copy_source(&self, key: &str) -> String {
        format!("/{}/{}", self.config.bucket, key)
    }

    fn meta_headers(tags: &BlobTags) -> Vec<(String, String)> {
        tags.entries()
            .into_iter()
            .map(|(name, value)| {
                (format!("x-amz-meta-{}", name), encode(value).into_owned())
            })
            .collect()
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        headers: &[(String, String)],
        body: Option<Bytes>,
    ) -> BlobResult<reqwest::Response> {
        let mut request = self.http.request(method, url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        request
            .send()
            .await
            .map_err(|e| BlobError::Http(e.to_string()))
    }

    async fn backend_error(response: reqwest::Response) -> BlobError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        BlobError::Backend { status, message }
    }

    /// Fetch one ListObjectsV2 page.
    async fn list_page(
        &self,
        prefix: &str,
        token: Option<&str>,
    ) -> BlobResult<(Vec<String>, Option<String>)> {
        let mut query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("prefix".to_string(), format!("{}/", prefix.trim_end_matches('/'))),
        ];
        if let Some(token) = token {
            query.push(("continuation-token".to_string(), token.to_string()));
        }

        let url = self.presign("GET", "", &query, &[], INTERNAL_TTL_SECS);
        let response = self.send(Method::GET, url, &[], None).await?;
        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }
        let body = response
            .text()
            .await
            .map_err(|e| BlobError::Http(e.to_string()))?;
        Ok(parse_list_page(&body))
    }
}

/// Pull object keys and the continuation token out of a ListObjectsV2 page.
/// Keys in this bucket are uuid path segments; no XML entities to unescape.
fn parse_list_page(body: &str) -> (Vec<String>, Option<String>) {
    static KEY_RE: OnceLock<Regex> = OnceLock::new();
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    let key_re = KEY_RE.get_or_init(|| Regex::new(r"<Key>([^<]+)</Key>").expect("static regex"));
    let token_re = TOKEN_RE.get_or_init(|| {
        Regex::new(r"<NextContinuationToken>([^<]+)</NextContinuationToken>")
            .expect("static regex")
    });
    let truncated = body.contains("<IsTruncated>true</IsTruncated>");

    let keys = key_re
        .captures_iter(body)
        .map(|c| c[1].to_string())
        .collect();
    let token = if truncated {
        token_re.captures(body).map(|c| c[1].to_string())
    } else {
        None
    };
    (keys, token)
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn write_new(&self, key: &str, data: Bytes, tags: &BlobTags) -> BlobResult<()> {
        let headers = Self::meta_headers(tags);
        let url = self.presign("PUT", key, &[], &headers, INTERNAL_TTL_SECS);
        let response = self.send(Method::PUT, url, &headers, Some(data)).await?;
        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }
        debug!(key = key, "blob written");
        Ok(())
    }

    async fn upload_url(&self, key: &str, ttl: Duration) -> BlobResult<String> {
        Ok(self.presign("PUT", key, &[], &[], ttl.as_secs()))
    }

    async fn download_url(&self, key: &str, ttl: Duration) -> BlobResult<String> {
        Ok(self.presign("GET", key, &[], &[], ttl.as_secs()))
    }

    async fn copy(&self, src: &str, dst: &str) -> BlobResult<()> {
        let headers = vec![("x-amz-copy-source".to_string(), self.copy_source(src))];
        let url = self.presign("PUT", dst, &[], &headers, INTERNAL_TTL_SECS);
        let response = self.send(Method::PUT, url, &headers, None).await?;
        // missing source: silent no-op per the BlobStore contract
        if response.status().as_u16() == 404 {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let url = self.presign("DELETE", key, &[], &[], INTERNAL_TTL_SECS);
        let response = self.send(Method::DELETE, url, &[], None).await?;
        if response.status().is_success() || response.status().as_u16() == 404 {
            return Ok(());
        }
        Err(Self::backend_error(response).await)
    }

    async fn delete_by_prefix(&self, prefix: &str) -> BlobResult<u64> {
        let mut removed = 0u64;
        let mut token: Option<String> = None;
        loop {
            let (keys, next) = self.list_page(prefix, token.as_deref()).await?;
            for key in keys {
                self.delete(&key).await?;
                removed += 1;
            }
            match next {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        debug!(prefix = prefix, removed = removed, "prefix deleted");
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        Ok(self.size(key).await?.is_some())
    }

    async fn size(&self, key: &str) -> BlobResult<Option<i64>> {
        let url = self.presign("HEAD", key, &[], &[], INTERNAL_TTL_SECS);
        let response = self.send(Method::HEAD, url, &[], None).await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }
        // `Response::content_length` reports the body size hint, which is 0
        // for a HEAD response; the object size lives in the header
        let len = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<i64>().ok())
            .ok_or_else(|| {
                BlobError::Http(format!("HEAD {} returned no content length", key))
            })?;
        Ok(Some(len))
    }

    async fn stamp(&self, key: &str, tags: &BlobTags) -> BlobResult<()> {
        // copy-to-self replacing object metadata
        let mut headers = vec![
            ("x-amz-copy-source".to_string(), self.copy_source(key)),
            ("x-amz-metadata-directive".to_string(), "REPLACE".to_string()),
        ];
        headers.extend(Self::meta_headers(tags));
        let url = self.presign("PUT", key, &[], &headers, INTERNAL_TTL_SECS);
        let response = self.send(Method::PUT, url, &headers, None).await?;
        if response.status().as_u16() == 404 {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }
        Ok(())
    }

    fn kind(&self) -> BlobBackend {
        BlobBackend::S3
    }
}
