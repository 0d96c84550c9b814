//! Referrer policies, as defined by <https://www.w3.org/TR/referrer-policy/>.
//!
//! A policy decides which referrer, if any, a request sent from a page at
//! `response_url` to `request_url` should carry.

use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::SpiderError;

/// Schemes that never produce a referrer.
const LOCAL_SCHEMES: &[&str] = &["about", "blob", "data", "filesystem"];
/// Extra schemes the default policy never sends a referrer from.
const DEFAULT_NOREFERRER_SCHEMES: &[&str] = &["file", "s3"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferrerPolicy {
    /// Never send a referrer.
    NoReferrer,
    /// Send the stripped URL, except from a TLS-protected page to a
    /// non-TLS one.
    NoReferrerWhenDowngrade,
    /// Send the stripped URL for same-origin requests only.
    SameOrigin,
    /// Send the origin only.
    Origin,
    /// Send the origin only, except from a TLS-protected page to a
    /// non-TLS one.
    StrictOrigin,
    /// Send the stripped URL for same-origin requests, the origin otherwise.
    OriginWhenCrossOrigin,
    /// Like `OriginWhenCrossOrigin`, but nothing on a TLS downgrade.
    StrictOriginWhenCrossOrigin,
    /// Always send the stripped URL.
    UnsafeUrl,
    /// `NoReferrerWhenDowngrade` that also never sends from `file` or `s3`.
    Default,
}

impl ReferrerPolicy {
    pub const ALL: [ReferrerPolicy; 9] = [
        ReferrerPolicy::NoReferrer,
        ReferrerPolicy::NoReferrerWhenDowngrade,
        ReferrerPolicy::SameOrigin,
        ReferrerPolicy::Origin,
        ReferrerPolicy::StrictOrigin,
        ReferrerPolicy::OriginWhenCrossOrigin,
        ReferrerPolicy::StrictOriginWhenCrossOrigin,
        ReferrerPolicy::UnsafeUrl,
        ReferrerPolicy::Default,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReferrerPolicy::NoReferrer => "no-referrer",
            ReferrerPolicy::NoReferrerWhenDowngrade => "no-referrer-when-downgrade",
            ReferrerPolicy::SameOrigin => "same-origin",
            ReferrerPolicy::Origin => "origin",
            ReferrerPolicy::StrictOrigin => "strict-origin",
            ReferrerPolicy::OriginWhenCrossOrigin => "origin-when-cross-origin",
            ReferrerPolicy::StrictOriginWhenCrossOrigin => "strict-origin-when-cross-origin",
            ReferrerPolicy::UnsafeUrl => "unsafe-url",
            ReferrerPolicy::Default => "scrapy-default",
        }
    }

    /// Looks up a single policy token. The empty token means
    /// `no-referrer-when-downgrade`.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        if token.is_empty() {
            return Some(ReferrerPolicy::NoReferrerWhenDowngrade);
        }
        Self::ALL.into_iter().find(|policy| policy.name() == token)
    }

    /// Parses a comma-separated policy list, as found in a `Referrer-Policy`
    /// header. The last recognised token wins.
    pub fn parse_list(value: &str) -> Option<Self> {
        value.split(',').rev().find_map(Self::from_token)
    }

    /// The referrer to send from `response_url` to `request_url`.
    pub fn referrer(&self, response_url: &Url, request_url: &Url) -> Option<String> {
        match self {
            ReferrerPolicy::NoReferrer => None,
            ReferrerPolicy::NoReferrerWhenDowngrade | ReferrerPolicy::Default => {
                if !tls_protected(response_url) || tls_protected(request_url) {
                    self.stripped_referrer(response_url)
                } else {
                    None
                }
            }
            ReferrerPolicy::SameOrigin => {
                if origin(response_url) == origin(request_url) {
                    self.stripped_referrer(response_url)
                } else {
                    None
                }
            }
            ReferrerPolicy::Origin => self.origin_referrer(response_url),
            ReferrerPolicy::StrictOrigin => {
                if !tls_protected(response_url) || potentially_trustworthy(request_url) {
                    self.origin_referrer(response_url)
                } else {
                    None
                }
            }
            ReferrerPolicy::OriginWhenCrossOrigin => {
                let response_origin = origin(response_url);
                if response_origin == origin(request_url) {
                    self.stripped_referrer(response_url)
                } else {
                    response_origin
                }
            }
            ReferrerPolicy::StrictOriginWhenCrossOrigin => {
                if origin(response_url) == origin(request_url) {
                    self.stripped_referrer(response_url)
                } else if !tls_protected(response_url) || potentially_trustworthy(request_url) {
                    self.origin_referrer(response_url)
                } else {
                    None
                }
            }
            ReferrerPolicy::UnsafeUrl => self.stripped_referrer(response_url),
        }
    }

    fn sends_from(&self, url: &Url) -> bool {
        let scheme = url.scheme();
        if LOCAL_SCHEMES.contains(&scheme) {
            return false;
        }
        !(*self == ReferrerPolicy::Default && DEFAULT_NOREFERRER_SCHEMES.contains(&scheme))
    }

    fn stripped_referrer(&self, url: &Url) -> Option<String> {
        if self.sends_from(url) {
            strip_url(url, false)
        } else {
            None
        }
    }

    fn origin_referrer(&self, url: &Url) -> Option<String> {
        if self.sends_from(url) { origin(url) } else { None }
    }
}

impl fmt::Display for ReferrerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReferrerPolicy {
    type Err = SpiderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_list(s).ok_or_else(|| {
            SpiderError::ConfigurationError(format!("Could not load referrer policy '{}'", s))
        })
    }
}

/// Removes credentials and fragment. With `origin_only`, also drops the
/// path and query, leaving `scheme://host[:port]/`.
///
/// Default ports are already omitted by `Url` serialization.
fn strip_url(url: &Url, origin_only: bool) -> Option<String> {
    let mut stripped = url.clone();
    stripped.set_fragment(None);
    if stripped.cannot_be_a_base() {
        return Some(stripped.into());
    }
    // Only fails for URLs without a host, which carry no credentials.
    let _ = stripped.set_username("");
    let _ = stripped.set_password(None);
    if origin_only {
        stripped.set_path("/");
        stripped.set_query(None);
    }
    Some(stripped.into())
}

fn origin(url: &Url) -> Option<String> {
    strip_url(url, true)
}

fn tls_protected(url: &Url) -> bool {
    matches!(url.scheme(), "https" | "ftps")
}

fn potentially_trustworthy(url: &Url) -> bool {
    url.scheme() != "data" && tls_protected(url)
}
