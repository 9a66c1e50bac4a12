//! 🪣📡 S3Store — the backend that talks to actual Amazon.
//!
//! COLD OPEN — EXT. DATA VAULT — 3:47 AM
//!
//! The on-call engineer stared at the terminal. "Ten thousand yearly shards,"
//! they whispered. "List them. Fetch them. Put the merged ones back." The
//! cursor blinked. The S3Store blinked back. "I got you, fam," it said, and
//! started paginating.
//!
//! 🧠 Knowledge graph:
//! - `list_page`: ListObjectsV2 + continuation tokens. One page per call,
//!   exactly the lazy shape [`ObjectStore`] promises upstairs.
//! - `download`: GetObject → `ByteStream::into_async_read()` → `tokio::io::copy`
//!   into the scratch file. The document never visits our heap in one piece.
//! - `put_object`: `ByteStream::from_path` — reopened fresh per call, which is
//!   what makes the committer's retries honest.
//! - `endpoint` override + path-style addressing exist so tests can point
//!   this thing at a mock server instead of Virginia.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::trace;

use crate::stores::{ListPage, ObjectStore};

/// 🔧 Configuration for the real-deal S3 backend.
///
/// Credentials are NOT in here — those come from the standard chain
/// (env vars → profile → IAM role → hope), same as every other AWS tool
/// your operators already distrust in familiar ways.
#[derive(Debug, Deserialize, Clone)]
pub struct S3StoreConfig {
    /// 🌎 AWS region — defaults to "us-east-1", the Florida of AWS regions.
    /// Everyone's data ends up there eventually.
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// 📡 Optional endpoint override — for localstack, minio, and mock
    /// servers. Leave it out and you get the genuine article.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// 🛣️ Path-style addressing (`host/bucket/key` instead of
    /// `bucket.host/key`). Required by most endpoint overrides, ignored by
    /// real S3 without complaint.
    #[serde(default)]
    pub force_path_style: bool,
}

impl Default for S3StoreConfig {
    fn default() -> Self {
        Self {
            region: default_s3_region(),
            endpoint: None,
            force_path_style: false,
        }
    }
}

fn default_s3_region() -> String {
    // -- 🏖️ if you don't choose a region, the region chooses you
    "us-east-1".to_string()
}

/// 🪣 The S3 client, dressed for work.
///
/// Holds one `aws_sdk_s3::Client` and reuses it for every call — connection
/// pooling is the SDK's hobby, not ours.
pub(crate) struct S3Store {
    client: aws_sdk_s3::Client,
    config: S3StoreConfig,
}

// 🐛 Debug impl excludes the client — nobody debugging a merge run wants to
// read an SDK handle's internal org chart.
impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store").field("config", &self.config).finish()
    }
}

impl S3Store {
    /// 🚀 Builds the client: credential chain, region, optional endpoint.
    ///
    /// 💀 Fails late rather than here — the SDK doesn't dial anyone until the
    /// first request, so a typo'd region surfaces on the first `list_page`
    /// with a context string that tells you where to look.
    pub(crate) async fn new(config: S3StoreConfig) -> Result<Self> {
        let base = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&base)
            .force_path_style(config.force_path_style);
        if let Some(ref endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());
        Ok(Self { client, config })
    }

    /// 🧪 Test-door constructor: bring your own fully rigged client.
    #[cfg(test)]
    pub(crate) fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self {
            client,
            config: S3StoreConfig::default(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    /// 📰 One ListObjectsV2 page. Feed the returned token back in to get the
    /// next one. The census does this twice a run and never gets tired of it.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix);
        if let Some(token) = continuation {
            request = request.continuation_token(token);
        }

        let response = request.send().await.context(format!(
            "💀 ListObjectsV2 failed for s3://{bucket}/{prefix}. The bucket ghosted us. \
             Check: bucket name, prefix, region, and credentials — in roughly that \
             order of likelihood, speaking from experience."
        ))?;

        let keys: Vec<String> = response
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();

        // ⚠️ NextContinuationToken is only trustworthy when IsTruncated says
        // so. S3's pagination contract, not ours.
        let next = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        trace!("📰 listing page carried {} keys (more: {})", keys.len(), next.is_some());
        Ok(ListPage { keys, next })
    }

    /// 📥 GetObject, streamed straight into the scratch file. One document's
    /// worth of bytes in flight, never the whole corpus.
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .context(format!(
                "💀 GetObject failed for s3://{bucket}/{key}. The census saw this key \
                 minutes ago, and now it's gone or unreadable. Schrodinger's object. \
                 Check: IAM permissions, bucket policy, and whether someone is \
                 deleting files mid-run (please stop doing that)."
            ))?;

        let mut reader = response.body.into_async_read();
        let mut file = tokio::fs::File::create(dest).await.context(format!(
            "💀 Could not create scratch file '{}' for the download. The scratch \
             directory existed at startup. Did it stop existing? Bold move, filesystem.",
            dest.display()
        ))?;
        tokio::io::copy(&mut reader, &mut file).await.context(format!(
            "💀 The byte stream from s3://{bucket}/{key} died mid-download. \
             The network giveth, the network taketh away."
        ))?;
        file.flush().await?;

        trace!("📥 hauled s3://{}/{} into {}", bucket, key, dest.display());
        Ok(())
    }

    /// 📤 PutObject from a path. The path is reopened on every call, so the
    /// committer can retry without the body having quietly gone stale.
    async fn put_object(&self, bucket: &str, key: &str, source: &Path) -> Result<()> {
        let body = aws_sdk_s3::primitives::ByteStream::from_path(source)
            .await
            .context(format!(
                "💀 Could not open staged file '{}' for upload. It was here a moment \
                 ago. We merged into it ourselves. This is deeply personal.",
                source.display()
            ))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .context(format!(
                "💀 PutObject failed for s3://{bucket}/{key}. We launched the merged \
                 payload into the cloud and the cloud said 'nah'. The committer \
                 upstairs will decide how many more times we grovel."
            ))?;

        trace!("📤 landed s3://{}/{}", bucket, key);
        Ok(())
    }
}

// ============================================================
//  🧪 Tests — real SDK, fake Amazon. wiremock plays the bucket.
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rigged_client(uri: &str) -> aws_sdk_s3::Client {
        let credentials =
            aws_sdk_s3::config::Credentials::new("test", "test", None, None, "static");
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .credentials_provider(credentials)
            .endpoint_url(uri)
            .force_path_style(true)
            .build();
        aws_sdk_s3::Client::from_conf(config)
    }

    fn listing_page_xml(key: &str, truncated: bool, next_token: Option<&str>) -> String {
        let token_fragment = next_token
            .map(|t| format!("<NextContinuationToken>{t}</NextContinuationToken>"))
            .unwrap_or_default();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>vault</Name>
  <Prefix>feed/</Prefix>
  <KeyCount>1</KeyCount>
  <MaxKeys>1</MaxKeys>
  <IsTruncated>{truncated}</IsTruncated>
  {token_fragment}
  <Contents><Key>{key}</Key><Size>42</Size></Contents>
</ListBucketResult>"#
        )
    }

    #[tokio::test]
    async fn the_one_where_list_pages_walk_the_continuation_token() {
        let server = MockServer::start().await;

        // 📰 page one: truncated, hands out a token
        Mock::given(method("GET"))
            .and(path("/vault/"))
            .and(query_param("list-type", "2"))
            .and(query_param_is_missing("continuation-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_page_xml(
                "feed/a_2020.json",
                true,
                Some("tok-1"),
            )))
            .mount(&server)
            .await;

        // 📰 page two: final, no token
        Mock::given(method("GET"))
            .and(path("/vault/"))
            .and(query_param("list-type", "2"))
            .and(query_param("continuation-token", "tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_page_xml(
                "feed/a_2021.json",
                false,
                None,
            )))
            .mount(&server)
            .await;

        let store = S3Store::from_client(rigged_client(&server.uri()));

        let first = store
            .list_page("vault", "feed/", None)
            .await
            .expect("💀 page one should list. The mock was RIGHT THERE.");
        assert_eq!(first.keys, vec!["feed/a_2020.json".to_string()]);
        assert_eq!(first.next.as_deref(), Some("tok-1"));

        let second = store
            .list_page("vault", "feed/", first.next)
            .await
            .expect("💀 page two should list. The token was genuine.");
        assert_eq!(second.keys, vec!["feed/a_2021.json".to_string()]);
        assert!(second.next.is_none(), "final page must not dangle a token");
    }

    #[tokio::test]
    async fn the_one_where_put_object_reads_the_file_fresh() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/vault/merged/a.json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().expect("💀 no tempdir, no test");
        let staged = scratch.path().join("a_merged.json");
        tokio::fs::write(&staged, b"{\"x\":1}\n")
            .await
            .expect("💀 writing the staged fixture failed");

        let store = S3Store::from_client(rigged_client(&server.uri()));
        store
            .put_object("vault", "merged/a.json", &staged)
            .await
            .expect("💀 the mock accepts everything and still we failed?");
    }
}
