//! URL feature extraction
//!
//! Features use the dataset's codes: -1 legitimate, 0 suspicious, 1 phishing.

use crate::error::{PhishnetError, Result};
use regex::Regex;

/// Feature columns in model order
pub const FEATURE_NAMES: [&str; 30] = [
    "having_IP_Address",
    "URL_Length",
    "Shortining_Service",
    "having_At_Symbol",
    "double_slash_redirecting",
    "Prefix_Suffix",
    "having_Sub_Domain",
    "SSLfinal_State",
    "Domain_registeration_length",
    "Favicon",
    "port",
    "HTTPS_token",
    "Request_URL",
    "URL_of_Anchor",
    "Links_in_tags",
    "SFH",
    "Submitting_to_email",
    "Abnormal_URL",
    "Redirect",
    "on_mouseover",
    "RightClick",
    "popUpWidnow",
    "Iframe",
    "age_of_domain",
    "DNSRecord",
    "web_traffic",
    "Page_Rank",
    "Google_Index",
    "Links_pointing_to_page",
    "Statistical_report",
];

/// Turns a URL into the fixed-order feature vector the model expects
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, url: &str) -> Result<Vec<f64>>;

    fn feature_names(&self) -> &[&'static str] {
        &FEATURE_NAMES
    }
}

/// scheme, netloc and path of a URL, split the way `scheme://netloc/path` reads
#[derive(Debug, Clone, PartialEq, Eq)]
struct UrlParts<'a> {
    scheme: &'a str,
    netloc: &'a str,
    path: &'a str,
}

/// Computes the features readable from the URL string alone. Features that
/// need the page, WHOIS or DNS get the value used when that lookup fails.
pub struct LexicalExtractor {
    url_parts: Regex,
    ip_address: Regex,
    shortener: Regex,
}

impl LexicalExtractor {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| PhishnetError::FeatureExtraction(e.to_string()))
        };
        Ok(Self {
            url_parts: compile(r"^(?:([A-Za-z][A-Za-z0-9+.\-]*):)?(?://([^/?#]*))?([^?#]*)")?,
            ip_address: compile(r"[0-9]{1,3}(\.[0-9]{1,3}){3}")?,
            shortener: compile(r"(bit\.ly|goo\.gl|tinyurl\.com|ow\.ly|t\.co|tinyurl)")?,
        })
    }

    fn parts<'a>(&self, url: &'a str) -> UrlParts<'a> {
        let caps = self.url_parts.captures(url);
        let group = |i: usize| {
            caps.as_ref()
                .and_then(|c| c.get(i))
                .map_or("", |m| m.as_str())
        };
        UrlParts {
            scheme: group(1),
            netloc: group(2),
            path: group(3),
        }
    }

    fn url_length(url: &str) -> f64 {
        match url.chars().count() {
            n if n < 54 => -1.0,
            n if n <= 75 => 0.0,
            _ => 1.0,
        }
    }

    fn sub_domain(netloc: &str) -> f64 {
        match netloc.split('.').count() {
            n if n <= 2 => -1.0,
            3 => 0.0,
            _ => 1.0,
        }
    }

    fn port(netloc: &str) -> Result<f64> {
        match netloc.split(':').nth(1) {
            None => Ok(-1.0),
            Some(raw) => {
                let port: u32 = raw.parse().map_err(|_| {
                    PhishnetError::FeatureExtraction(format!("invalid port '{}' in {}", raw, netloc))
                })?;
                Ok(if port == 80 || port == 443 { -1.0 } else { 1.0 })
            }
        }
    }
}

impl FeatureExtractor for LexicalExtractor {
    fn extract(&self, url: &str) -> Result<Vec<f64>> {
        let url = url.trim();
        if url.is_empty() {
            return Err(PhishnetError::FeatureExtraction("empty url".to_string()));
        }
        let parts = self.parts(url);
        let flag = |b: bool| if b { 1.0 } else { -1.0 };
        let double_slash = parts.path.get(1..).map_or(false, |rest| rest.contains("//"));

        let features = vec![
            flag(self.ip_address.is_match(url)),
            Self::url_length(url),
            flag(self.shortener.is_match(url)),
            flag(url.contains('@')),
            flag(double_slash),
            flag(parts.netloc.contains('-')),
            Self::sub_domain(parts.netloc),
            // SSLfinal_State from the scheme alone
            if parts.scheme.eq_ignore_ascii_case("https") { -1.0 } else { 1.0 },
            1.0,  // Domain_registeration_length
            -1.0, // Favicon
            Self::port(parts.netloc)?,
            flag(parts.netloc.contains("https")),
            0.0,  // Request_URL
            0.0,  // URL_of_Anchor
            -1.0, // Links_in_tags
            -1.0, // SFH
            -1.0, // Submitting_to_email
            1.0,  // Abnormal_URL
            0.0,  // Redirect
            -1.0, // on_mouseover
            -1.0, // RightClick
            -1.0, // popUpWidnow
            -1.0, // Iframe
            1.0,  // age_of_domain
            1.0,  // DNSRecord
            -1.0, // web_traffic
            -1.0, // Page_Rank
            -1.0, // Google_Index
            -1.0, // Links_pointing_to_page
            -1.0, // Statistical_report
        ];
        debug_assert_eq!(features.len(), FEATURE_NAMES.len());
        Ok(features)
    }
}
