//! Storj edge signing backend.
//!
//! Object access on Storj flows through capability grants.  At startup
//! one access source is resolved (a pre-issued grant, or an API key +
//! passphrase exchanged through the edge auth service), registered for
//! public linksharing, and an S3-protocol project handle is opened
//! against the edge gateway for existence checks.  With neither source
//! configured the backend falls back to a pre-registered access key id
//! and issues links without checking that objects exist.
//!
//! Share URLs are composed from the linksharing base URL; the sharing
//! service owns their scheme and host, so only the status/cache half of
//! the redirect policy applies here.

use std::future::Future;
use std::pin::Pin;
use std::time::SystemTime;

use aws_sdk_s3::Client;
use http::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::{Backend, ObjectRequest, SignedRedirect};
use crate::config::Config;
use crate::errors::ObsError;
use crate::policy::{self, RedirectPolicy};

// -- Edge auth service API types ---------------------------------------------

#[derive(Debug, Serialize)]
struct RegisterAccessRequest<'a> {
    access_grant: &'a str,
    public: bool,
}

/// Edge credentials issued for a registered access grant.
#[derive(Debug, Deserialize)]
struct RegisterAccessResponse {
    access_key_id: String,
    secret_key: String,
    /// S3-protocol edge gateway endpoint the credentials are valid for.
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct RequestAccessRequest<'a> {
    satellite_address: &'a str,
    api_key: &'a str,
    passphrase: &'a str,
}

#[derive(Debug, Deserialize)]
struct RequestAccessResponse {
    access_grant: String,
}

// -- Edge auth service client -------------------------------------------------

/// Client for the public edge auth service.
struct AuthServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl AuthServiceClient {
    fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Exchange an API key + passphrase for a serialized access grant.
    async fn request_access_with_passphrase(
        &self,
        satellite_address: &str,
        api_key: &str,
        passphrase: &str,
    ) -> anyhow::Result<String> {
        let url = format!("{}/v1/access/grant", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&RequestAccessRequest {
                satellite_address,
                api_key,
                passphrase,
            })
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("access grant request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("access with passphrase ({status}): {body}"));
        }

        let grant: RequestAccessResponse = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("access grant response: {e}"))?;
        Ok(grant.access_grant)
    }

    /// Register an access grant for public linksharing, yielding edge
    /// credentials usable in share links and against the edge gateway.
    async fn register_access(&self, access_grant: &str) -> anyhow::Result<RegisterAccessResponse> {
        let url = format!("{}/v1/access", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&RegisterAccessRequest {
                access_grant,
                // Public credentials allow anonymous reads of everything
                // the grant can reach, like a public-read ACL.
                public: true,
            })
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("register access request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("register access ({status}): {body}"));
        }

        resp.json()
            .await
            .map_err(|e| anyhow::anyhow!("register access response: {e}"))
    }
}

// -- Backend ------------------------------------------------------------------

/// Backend that redirects to the Storj public linksharing service.
pub struct StorjBackend {
    /// S3-protocol project handle against the edge gateway, when an
    /// access source was resolved.  `None` skips existence checks.
    project: Option<Client>,
    /// Bucket the share links point into.
    bucket: String,
    /// Public access key id embedded in share links.
    access_key_id: String,
    /// Linksharing base URL.
    share_base_url: String,
    /// Expiry and status policy shared by every request.
    policy: RedirectPolicy,
    remove_bucket_prefix: bool,
}

impl StorjBackend {
    /// Create the backend: resolve the access source, register it for
    /// linksharing, and open the edge project handle.
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let storj = &config.storj;
        let auth = AuthServiceClient::new(&storj.auth_service_url)?;

        // Access source, highest priority first: grant, then API key +
        // passphrase, then nothing (pre-registered key only).
        let access_grant = if !storj.access_grant.is_empty() {
            Some(storj.access_grant.clone())
        } else if !storj.api_key.is_empty() && !storj.passphrase.is_empty() {
            let grant = auth
                .request_access_with_passphrase(
                    &storj.satellite_address,
                    &storj.api_key,
                    &storj.passphrase,
                )
                .await?;
            Some(grant)
        } else {
            None
        };

        let (project, registered_key_id) = match access_grant {
            Some(grant) => {
                // TODO: persist the registered access key id across
                // restarts instead of re-registering on every boot.
                let creds = auth.register_access(&grant).await?;
                let project = open_project(&creds).await;
                (Some(project), Some(creds.access_key_id))
            }
            None => {
                warn!("storj backend has no access source; existence checks are skipped");
                (None, None)
            }
        };

        let access_key_id = effective_access_key_id(&storj.access_key_id, registered_key_id);

        info!(
            "storj backend initialized: bucket={} share_base={} existence_checks={}",
            config.gateway.bucket,
            storj.share_base_url,
            project.is_some()
        );

        Ok(Self {
            project,
            bucket: config.gateway.bucket.clone(),
            access_key_id,
            share_base_url: storj.share_base_url.clone(),
            policy: RedirectPolicy {
                url_expiry_secs: config.gateway.url_expiry_secs,
                redirect_code: config.gateway.redirect_code,
            },
            remove_bucket_prefix: config.gateway.remove_bucket_prefix,
        })
    }
}

impl Backend for StorjBackend {
    fn name(&self) -> &'static str {
        "storj"
    }

    fn handle(
        &self,
        method: Method,
        path: String,
    ) -> Pin<Box<dyn Future<Output = Result<SignedRedirect, ObsError>> + Send + '_>> {
        Box::pin(async move {
            let request = ObjectRequest::resolve(method, &path, self.remove_bucket_prefix)?;

            debug!("storj handle: bucket={} key={}", self.bucket, request.key);

            // Existence is only verified through the project handle; with
            // key-only configuration the link is issued optimistically and
            // the sharing service 404s downstream.
            if let Some(project) = &self.project {
                project
                    .head_object()
                    .bucket(&self.bucket)
                    .key(&request.key)
                    .send()
                    .await
                    .map_err(|e| {
                        let service_err = e.into_service_error();
                        ObsError::ResourceNotFound(anyhow::anyhow!("stat_object: {service_err}"))
                    })?;
            }

            let url = join_share_url(
                &self.share_base_url,
                &self.access_key_id,
                &self.bucket,
                &request.key,
            )
            .map_err(ObsError::ComposeShareUrl)?;

            let resolved = policy::resolve(&self.policy, SystemTime::now());

            debug!("storj redirect: status={} target={}", resolved.status, url);

            Ok(SignedRedirect {
                target_url: url.into(),
                status: resolved.status,
                cache: resolved.cache,
            })
        })
    }
}

/// Open an S3-protocol project handle against the edge gateway.
async fn open_project(creds: &RegisterAccessResponse) -> Client {
    let credentials = aws_sdk_s3::config::Credentials::new(
        &creds.access_key_id,
        &creds.secret_key,
        None, // session_token
        None, // expiry
        "storj-edge-register",
    );
    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new("us-east-1"))
        .endpoint_url(&creds.endpoint)
        .credentials_provider(credentials)
        .load()
        .await;
    // The edge gateway serves every bucket path-style.
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(true)
        .build();
    Client::from_conf(s3_config)
}

/// A key configured explicitly wins over the one issued at registration.
fn effective_access_key_id(configured: &str, registered: Option<String>) -> String {
    if !configured.is_empty() {
        configured.to_string()
    } else {
        registered.unwrap_or_default()
    }
}

/// Compose a raw linksharing URL: `{base}/raw/{access_key_id}/{bucket}/{key}`
/// with every key segment escaped.
fn join_share_url(
    base_url: &str,
    access_key_id: &str,
    bucket: &str,
    key: &str,
) -> anyhow::Result<Url> {
    if access_key_id.is_empty() {
        anyhow::bail!("access key id is required");
    }
    if bucket.is_empty() && !key.is_empty() {
        anyhow::bail!("bucket is required if key is provided");
    }
    let mut url = Url::parse(base_url)
        .map_err(|e| anyhow::anyhow!("invalid share base url {base_url:?}: {e}"))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("share base url cannot be a base: {base_url}"))?;
        segments.pop_if_empty().push("raw").push(access_key_id);
        if !bucket.is_empty() {
            segments.push(bucket);
        }
        for part in key.split('/').filter(|part| !part.is_empty()) {
            segments.push(part);
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://link.storjshare.io";

    #[test]
    fn test_join_share_url_layout() {
        let url = join_share_url(BASE, "ak", "media", "path/to/obj.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://link.storjshare.io/raw/ak/media/path/to/obj.png"
        );
    }

    #[test]
    fn test_join_share_url_escapes_key_segments() {
        let url = join_share_url(BASE, "ak", "media", "my file.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://link.storjshare.io/raw/ak/media/my%20file.png"
        );
    }

    #[test]
    fn test_join_share_url_empty_key_hits_bucket_root() {
        let url = join_share_url(BASE, "ak", "media", "").unwrap();
        assert_eq!(url.as_str(), "https://link.storjshare.io/raw/ak/media");
    }

    #[test]
    fn test_join_share_url_requires_access_key() {
        let err = join_share_url(BASE, "", "media", "obj").unwrap_err();
        assert!(err.to_string().contains("access key id is required"));
    }

    #[test]
    fn test_join_share_url_requires_bucket_for_key() {
        let err = join_share_url(BASE, "ak", "", "obj").unwrap_err();
        assert!(err.to_string().contains("bucket is required"));
    }

    #[test]
    fn test_join_share_url_rejects_invalid_base() {
        assert!(join_share_url("not a url", "ak", "media", "obj").is_err());
    }

    #[test]
    fn test_access_key_precedence() {
        // Explicit configuration wins over the registered key.
        assert_eq!(
            effective_access_key_id("configured", Some("registered".into())),
            "configured"
        );
        assert_eq!(
            effective_access_key_id("", Some("registered".into())),
            "registered"
        );
        assert_eq!(effective_access_key_id("", None), "");
    }

    #[test]
    fn test_auth_service_url_is_trimmed() {
        let client = AuthServiceClient::new("https://auth.storjshare.io/").unwrap();
        assert_eq!(client.base_url, "https://auth.storjshare.io");
    }
}
