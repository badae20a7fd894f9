//! Signing backends.
//!
//! The [`Backend`] trait abstracts over which storage service produces the
//! redirect target.  Implementations cover S3-compatible endpoints and the
//! Storj edge services.  Exactly one backend is selected by name from the
//! [`BackendRegistry`] at startup and serves every request thereafter.

pub mod s3;
pub mod storj;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::{Method, StatusCode};

use crate::config::Config;
use crate::errors::ObsError;
use crate::policy::CacheHeaders;

/// A fully resolved redirect: where to send the client and how.
#[derive(Debug, Clone)]
pub struct SignedRedirect {
    /// Absolute URL the client is redirected to.
    pub target_url: String,
    /// Redirect status, always within 3xx.
    pub status: StatusCode,
    /// Cache headers attached when the link expires.
    pub cache: Option<CacheHeaders>,
}

/// Async signing backend contract.
///
/// Handlers are invoked concurrently for all inbound requests; every
/// implementation keeps per-request state local and treats the storage
/// client it opened at init as read-only.
pub trait Backend: Send + Sync + 'static {
    /// Stable identifier the backend is selected by.
    fn name(&self) -> &'static str;

    /// Resolve one request to a redirect or a request error.
    fn handle(
        &self,
        method: Method,
        path: String,
    ) -> Pin<Box<dyn Future<Output = Result<SignedRedirect, ObsError>> + Send + '_>>;
}

/// A validated inbound request: method gate passed, object key resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRequest {
    /// GET or HEAD.
    pub method: Method,
    /// Object key within the configured bucket.  May be empty, which is a
    /// valid lookup against the bucket root.
    pub key: String,
}

impl ObjectRequest {
    /// Derive the object key from a decoded request path.
    ///
    /// Any method other than GET/HEAD is rejected.  The leading slash is
    /// stripped; with `remove_bucket_prefix` the first remaining segment
    /// (a bucket name echoed by path-style clients) is dropped as well.
    /// A path without a second segment is kept whole.
    pub fn resolve(
        method: Method,
        path: &str,
        remove_bucket_prefix: bool,
    ) -> Result<Self, ObsError> {
        if method != Method::GET && method != Method::HEAD {
            return Err(ObsError::MethodNotAllowed);
        }
        let trimmed = path.trim_start_matches('/');
        let key = if remove_bucket_prefix {
            match trimmed.split_once('/') {
                Some((_bucket, rest)) => rest.to_string(),
                None => trimmed.to_string(),
            }
        } else {
            trimmed.to_string()
        };
        Ok(Self { method, key })
    }
}

/// Constructor registered per backend name.
type BackendCtor = for<'a> fn(
    &'a Config,
) -> Pin<Box<dyn Future<Output = anyhow::Result<Arc<dyn Backend>>> + Send + 'a>>;

/// Name-keyed registry the gateway selects its backend from.
pub struct BackendRegistry {
    entries: Vec<(&'static str, BackendCtor)>,
}

impl BackendRegistry {
    /// Registry with every built-in backend.
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_entries(vec![("s3", init_s3), ("storj", init_storj)])
    }

    fn from_entries(entries: Vec<(&'static str, BackendCtor)>) -> anyhow::Result<Self> {
        for (i, (name, _)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(seen, _)| seen == name) {
                anyhow::bail!("backend name registered twice: {name}");
            }
        }
        Ok(Self { entries })
    }

    /// Registered backend names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }

    /// Initialize the backend registered under `name`.
    ///
    /// An unknown name is a fatal configuration error; the caller aborts
    /// startup rather than serve traffic without a signer.
    pub async fn init(&self, name: &str, config: &Config) -> anyhow::Result<Arc<dyn Backend>> {
        let Some((_, ctor)) = self.entries.iter().find(|(entry, _)| *entry == name) else {
            anyhow::bail!(
                "unknown backend {name:?} (available: {})",
                self.names().join(", ")
            );
        };
        let backend = ctor(config).await?;
        if backend.name() != name {
            anyhow::bail!(
                "backend registered as {name:?} reports name {:?}",
                backend.name()
            );
        }
        Ok(backend)
    }
}

fn init_s3(
    config: &Config,
) -> Pin<Box<dyn Future<Output = anyhow::Result<Arc<dyn Backend>>> + Send + '_>> {
    Box::pin(async move {
        let backend = s3::S3Backend::new(config).await?;
        Ok(Arc::new(backend) as Arc<dyn Backend>)
    })
}

fn init_storj(
    config: &Config,
) -> Pin<Box<dyn Future<Output = anyhow::Result<Arc<dyn Backend>>> + Send + '_>> {
    Box::pin(async move {
        let backend = storj::StorjBackend::new(config).await?;
        Ok(Arc::new(backend) as Arc<dyn Backend>)
    })
}
