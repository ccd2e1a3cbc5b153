use percent_encoding::percent_decode_str;

use crate::error::AccessError;

/// PrefixMatch
///
/// How a configured route prefix is compared against a request path.
///
/// * `Segment`: the prefix must be followed by end-of-path or `/`, so `/dashboard`
///   covers `/dashboard` and `/dashboard/settings` but not `/dashboardish`.
/// * `Raw`: plain string prefix, `/dashboardish` is covered by `/dashboard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrefixMatch {
    #[default]
    Segment,
    Raw,
}

impl PrefixMatch {
    /// Parses the `ACCESS_PREFIX_MATCH` setting. Unknown values fall back to `Segment`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw" => PrefixMatch::Raw,
            _ => PrefixMatch::Segment,
        }
    }

    pub fn matches(self, path: &str, prefix: &str) -> bool {
        match self {
            PrefixMatch::Raw => path.starts_with(prefix),
            PrefixMatch::Segment => match path.strip_prefix(prefix) {
                Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
                None => false,
            },
        }
    }

    /// True when any of `prefixes` covers `path`.
    pub fn matches_any<S: AsRef<str>>(self, path: &str, prefixes: &[S]) -> bool {
        prefixes.iter().any(|p| self.matches(path, p.as_ref()))
    }
}

/// PathClass
///
/// The access category of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    /// Requires an active session.
    Protected,
    /// Login/signup pages, meant only for anonymous callers.
    Auth,
    Unclassified,
}

/// RequestPath
///
/// A request path in three forms:
///
/// * `raw`: as received, used for the `redirect` parameter.
/// * `decoded`: split on the raw `/` and percent-decoded per segment, with dot
///   segments left in place. `/billing/%2e%2e/x` decodes to `/billing/../x`.
/// * `normalized`: `decoded` with empty and `.` segments dropped and `..`
///   resolved without climbing above the root, so `/api/../dashboard` and
///   `/%64ashboard` are both seen as `/dashboard`.
///
/// Access checks look at both `decoded` and `normalized` and take the stricter
/// answer, so a path can be moved into a protected prefix by normalization but
/// never out of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    raw: String,
    decoded: String,
    normalized: String,
}

impl RequestPath {
    /// Fails with `MalformedRequestPath` when the path is not absolute, does not
    /// decode to UTF-8, contains control characters or encodes a path separator
    /// (`%2F`, `%5C`) inside a segment.
    pub fn parse(raw: &str) -> Result<Self, AccessError> {
        if !raw.starts_with('/') {
            return Err(AccessError::MalformedRequestPath(
                "path is not absolute".to_string(),
            ));
        }

        let mut decoded_segments: Vec<String> = Vec::new();
        for segment in raw.split('/').skip(1) {
            let decoded = percent_decode_str(segment).decode_utf8().map_err(|_| {
                AccessError::MalformedRequestPath("invalid UTF-8 escape".to_string())
            })?;

            if decoded.chars().any(char::is_control) {
                return Err(AccessError::MalformedRequestPath(
                    "control character in path".to_string(),
                ));
            }
            if decoded.contains(['/', '\\']) {
                return Err(AccessError::MalformedRequestPath(
                    "encoded separator in path segment".to_string(),
                ));
            }
            decoded_segments.push(decoded.into_owned());
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in &decoded_segments {
            match segment.as_str() {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            decoded: format!("/{}", decoded_segments.join("/")),
            normalized: format!("/{}", segments.join("/")),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn decoded(&self) -> &str {
        &self.decoded
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }
}

/// ExclusionList
///
/// Paths that never reach the access router: framework assets, image files and
/// the API prefix. Prefixes are plain string prefixes and suffixes are matched
/// case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionList {
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
}

impl Default for ExclusionList {
    fn default() -> Self {
        Self {
            prefixes: ["/_next/static", "/_next/image", "/favicon.ico", "/api"]
                .into_iter()
                .map(String::from)
                .collect(),
            suffixes: [".svg", ".png", ".jpg", ".jpeg", ".gif", ".webp"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl ExclusionList {
    /// Builds a list from comma-separated settings, keeping the defaults for
    /// whichever side is not provided.
    pub fn from_settings(prefixes: Option<&str>, suffixes: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            prefixes: prefixes.map(split_list).unwrap_or(defaults.prefixes),
            suffixes: suffixes.map(split_list).unwrap_or(defaults.suffixes),
        }
    }

    /// Both the decoded and the normalized form must be excluded, so dot
    /// segments cannot carry a gated path onto the list.
    pub fn is_excluded(&self, path: &RequestPath) -> bool {
        self.covers(path.decoded()) && self.covers(path.as_str())
    }

    fn covers(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
            || self.suffixes.iter().any(|s| path.ends_with(s.as_str()))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
