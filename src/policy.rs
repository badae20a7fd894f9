//! Redirect-policy engine.
//!
//! Pure decision logic shared by every backend: given the configured URL
//! expiry and preferred redirect status, compute the signature expiry, the
//! status code actually emitted, and any cache headers.  Scheme and host
//! overrides on the final URL also live here; the capability-network
//! backend applies only the status/cache half.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::StatusCode;
use url::Url;

/// Sentinel configuration value meaning "the link never expires".
/// Any non-positive configured expiry is treated the same way.
pub const UNBOUNDED_URL_EXPIRY_SECS: i64 = i64::MAX;

/// Expiry embedded in signatures for unbounded links: the largest
/// representable positive epoch-seconds value.  Not a true "never", but
/// outside any practical clock horizon.
pub const MAX_EXPIRES_EPOCH: i64 = i64::MAX;

/// First epoch second past what an HTTP-date can express; `httpdate`
/// refuses dates from year 10000 on.
const HTTP_DATE_EPOCH_LIMIT: u64 = 253_402_300_800;

/// The policy half of the gateway configuration, extracted once at startup.
#[derive(Debug, Clone, Copy)]
pub struct RedirectPolicy {
    /// Configured link lifetime in seconds; `<= 0` or
    /// [`UNBOUNDED_URL_EXPIRY_SECS`] means unbounded.
    pub url_expiry_secs: i64,
    /// Preferred redirect status code; corrected per [`resolve`].
    pub redirect_code: u16,
}

/// Cache headers attached to cacheable temporary redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeaders {
    /// `Cache-Control` header value, e.g. `max-age=600`.
    pub cache_control: String,
    /// `Expires` header value in HTTP-date format.
    pub expires: String,
}

/// The outcome of a policy decision for one request.
#[derive(Debug, Clone)]
pub struct ResolvedRedirect {
    /// Status code to emit, always within 300..=399.
    pub status: StatusCode,
    /// Epoch seconds to bind into the signature's expiry parameter.
    pub expires_epoch: i64,
    /// Cache headers, present only for finite-expiry temporary redirects.
    pub cache: Option<CacheHeaders>,
}

/// Resolve expiry, status, and cache headers for one request at time `now`.
///
/// Unbounded expiry keeps the configured status (typically a permanent 301)
/// and signs with [`MAX_EXPIRES_EPOCH`].  A finite expiry must never be
/// paired with a permanent redirect: a client that permanently caches a
/// redirect to a URL that later expires is broken, so 301/308 are downgraded
/// to 307.  Configured codes outside 300..=399 become 307 in either case.
pub fn resolve(policy: &RedirectPolicy, now: SystemTime) -> ResolvedRedirect {
    let unbounded = policy.url_expiry_secs <= 0
        || policy.url_expiry_secs == UNBOUNDED_URL_EXPIRY_SECS;

    if unbounded {
        return ResolvedRedirect {
            status: corrected_status(policy.redirect_code, false),
            expires_epoch: MAX_EXPIRES_EPOCH,
            cache: None,
        };
    }

    // An expiry large enough to overflow the clock, or to land past the
    // last expressible HTTP-date, is unbounded in every way that matters.
    let expire_at = match now.checked_add(Duration::from_secs(policy.url_expiry_secs as u64)) {
        Some(t) if epoch_seconds(t) < HTTP_DATE_EPOCH_LIMIT => t,
        _ => {
            return ResolvedRedirect {
                status: corrected_status(policy.redirect_code, false),
                expires_epoch: MAX_EXPIRES_EPOCH,
                cache: None,
            };
        }
    };

    let expires_epoch = epoch_seconds(expire_at) as i64;

    let status = corrected_status(policy.redirect_code, true);

    // Only the temporary-redirect code itself is cacheable-with-bounds;
    // other non-permanent codes (302, 303) are left without cache headers.
    let cache = (status == StatusCode::TEMPORARY_REDIRECT).then(|| CacheHeaders {
        cache_control: format!("max-age={}", policy.url_expiry_secs),
        expires: httpdate::fmt_http_date(expire_at),
    });

    ResolvedRedirect {
        status,
        expires_epoch,
        cache,
    }
}

fn epoch_seconds(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Correct a configured redirect code into an emittable status.
///
/// Out-of-range values become 307 always; permanent codes (301, 308) become
/// 307 when the expiry is finite.
fn corrected_status(code: u16, finite_expiry: bool) -> StatusCode {
    if !(300..=399).contains(&code) {
        return StatusCode::TEMPORARY_REDIRECT;
    }
    if finite_expiry && (code == 301 || code == 308) {
        return StatusCode::TEMPORARY_REDIRECT;
    }
    StatusCode::from_u16(code).unwrap_or(StatusCode::TEMPORARY_REDIRECT)
}

// -- URL overrides -----------------------------------------------------------

/// Force the URL scheme per the `redirect_secure` flag.
///
/// Applied regardless of what signing produced: the signer only knows the
/// storage endpoint, not the externally visible scheme (e.g. behind a
/// TLS-terminating proxy).
pub fn apply_scheme_override(url: &mut Url, secure: bool) {
    let scheme = if secure { "https" } else { "http" };
    // set_scheme only rejects special/non-special scheme crossings, which
    // cannot happen between http and https.
    let _ = url.set_scheme(scheme);
}

/// Replace the URL's host (and port) with `host_redirect` verbatim.
///
/// An empty override leaves the URL untouched.  The override wholly replaces
/// the authority: a bare hostname drops any original port, and a
/// `host:port` form installs the given port.
pub fn apply_host_override(url: &mut Url, host_redirect: &str) -> anyhow::Result<()> {
    if host_redirect.is_empty() {
        return Ok(());
    }

    let (host, port) = match host_redirect.rsplit_once(':') {
        Some((h, p)) if !h.is_empty() && !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()) => {
            (h, Some(p.parse::<u16>()?))
        }
        _ => (host_redirect, None),
    };

    url.set_port(None)
        .map_err(|_| anyhow::anyhow!("cannot clear port on URL {url}"))?;
    url.set_host(Some(host))?;
    if let Some(p) = port {
        url.set_port(Some(p))
            .map_err(|_| anyhow::anyhow!("cannot set port {p} on URL {url}"))?;
    }
    Ok(())
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// 2025-01-01T00:00:00Z.
    const NOW_EPOCH: u64 = 1_735_689_600;

    fn now() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(NOW_EPOCH)
    }

    fn policy(expiry: i64, code: u16) -> RedirectPolicy {
        RedirectPolicy {
            url_expiry_secs: expiry,
            redirect_code: code,
        }
    }

    #[test]
    fn test_unbounded_sentinel_keeps_status_and_max_expiry() {
        let r = resolve(&policy(UNBOUNDED_URL_EXPIRY_SECS, 301), now());
        assert_eq!(r.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(r.expires_epoch, MAX_EXPIRES_EPOCH);
        assert!(r.cache.is_none());
    }

    #[test]
    fn test_zero_and_negative_expiry_are_unbounded() {
        for expiry in [0, -1, -3600] {
            let r = resolve(&policy(expiry, 308), now());
            assert_eq!(r.status, StatusCode::PERMANENT_REDIRECT);
            assert_eq!(r.expires_epoch, MAX_EXPIRES_EPOCH);
            assert!(r.cache.is_none());
        }
    }

    #[test]
    fn test_out_of_range_code_corrected_even_when_unbounded() {
        for code in [200, 204, 400, 404, 500] {
            let r = resolve(&policy(0, code), now());
            assert_eq!(r.status, StatusCode::TEMPORARY_REDIRECT, "code {code}");
        }
    }

    #[test]
    fn test_finite_expiry_downgrades_permanent_codes() {
        for code in [301, 308] {
            let r = resolve(&policy(600, code), now());
            assert_eq!(r.status, StatusCode::TEMPORARY_REDIRECT, "code {code}");
        }
    }

    #[test]
    fn test_finite_expiry_keeps_found_status_without_cache() {
        let r = resolve(&policy(600, 302), now());
        assert_eq!(r.status, StatusCode::FOUND);
        assert_eq!(r.expires_epoch, NOW_EPOCH as i64 + 600);
        assert!(r.cache.is_none());
    }

    #[test]
    fn test_finite_temporary_redirect_attaches_cache_headers() {
        let r = resolve(&policy(600, 307), now());
        assert_eq!(r.status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(r.expires_epoch, NOW_EPOCH as i64 + 600);
        let cache = r.cache.expect("cache headers");
        assert_eq!(cache.cache_control, "max-age=600");
        assert_eq!(cache.expires, "Wed, 01 Jan 2025 00:10:00 GMT");
    }

    #[test]
    fn test_finite_out_of_range_code_gets_cache_headers() {
        // 404 corrects to 307, which is the cacheable temporary code.
        let r = resolve(&policy(120, 404), now());
        assert_eq!(r.status, StatusCode::TEMPORARY_REDIRECT);
        let cache = r.cache.expect("cache headers");
        assert_eq!(cache.cache_control, "max-age=120");
    }

    #[test]
    fn test_downgraded_permanent_matches_direct_temporary() {
        let a = resolve(&policy(3600, 301), now());
        let b = resolve(&policy(3600, 307), now());
        assert_eq!(a.status, b.status);
        assert_eq!(a.expires_epoch, b.expires_epoch);
        assert_eq!(a.cache, b.cache);
    }

    #[test]
    fn test_overflowing_finite_expiry_treated_as_unbounded() {
        let r = resolve(&policy(i64::MAX - 1, 301), now());
        assert_eq!(r.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(r.expires_epoch, MAX_EXPIRES_EPOCH);
        assert!(r.cache.is_none());
    }

    #[test]
    fn test_expiry_past_http_date_horizon_is_unbounded() {
        // ~9500 years out: the clock takes it, HTTP-date formatting cannot.
        let r = resolve(&policy(300_000_000_000, 301), now());
        assert_eq!(r.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(r.expires_epoch, MAX_EXPIRES_EPOCH);
        assert!(r.cache.is_none());
    }

    #[test]
    fn test_expiry_at_http_date_horizon_still_caches() {
        // Lands on the last second of year 9999.
        let expiry = HTTP_DATE_EPOCH_LIMIT as i64 - 1 - NOW_EPOCH as i64;
        let r = resolve(&policy(expiry, 307), now());
        assert_eq!(r.status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(r.expires_epoch, HTTP_DATE_EPOCH_LIMIT as i64 - 1);
        let cache = r.cache.expect("cache headers");
        assert_eq!(cache.expires, "Fri, 31 Dec 9999 23:59:59 GMT");
    }

    #[test]
    fn test_scheme_override_forces_https() {
        let mut url = Url::parse("http://minio.internal:9000/bucket/key").unwrap();
        apply_scheme_override(&mut url, true);
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_scheme_override_forces_http() {
        let mut url = Url::parse("https://s3.amazonaws.com/bucket/key").unwrap();
        apply_scheme_override(&mut url, false);
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn test_host_override_replaces_host_and_drops_port() {
        let mut url = Url::parse("http://minio.internal:9000/bucket/key?a=b").unwrap();
        apply_host_override(&mut url, "cdn.example.com").unwrap();
        assert_eq!(url.as_str(), "http://cdn.example.com/bucket/key?a=b");
    }

    #[test]
    fn test_host_override_with_port() {
        let mut url = Url::parse("http://minio.internal:9000/bucket/key").unwrap();
        apply_host_override(&mut url, "cdn.example.com:8443").unwrap();
        assert_eq!(url.host_str(), Some("cdn.example.com"));
        assert_eq!(url.port(), Some(8443));
    }

    #[test]
    fn test_empty_host_override_is_noop() {
        let mut url = Url::parse("http://minio.internal:9000/bucket/key").unwrap();
        apply_host_override(&mut url, "").unwrap();
        assert_eq!(url.as_str(), "http://minio.internal:9000/bucket/key");
    }
}
