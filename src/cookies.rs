use axum::{
    http::{HeaderMap, HeaderValue, header},
    response::Response,
};

/// CookieOptions
///
/// Attributes written alongside a cookie in `Set-Cookie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    /// Lifetime in seconds. `None` produces a session cookie.
    pub max_age: Option<i64>,
    pub same_site: String,
    pub secure: bool,
    pub http_only: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            max_age: Some(400 * 24 * 60 * 60),
            same_site: "Lax".to_string(),
            secure: false,
            http_only: false,
        }
    }
}

/// CookieMutation
///
/// A cookie change requested while resolving a session (e.g. after a token
/// refresh). Mutations are plain values: they are collected during evaluation
/// and applied once, to the forwarded request and to the final response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieMutation {
    Set {
        name: String,
        value: String,
        options: CookieOptions,
    },
    Remove {
        name: String,
        options: CookieOptions,
    },
}

impl CookieMutation {
    pub fn name(&self) -> &str {
        match self {
            CookieMutation::Set { name, .. } | CookieMutation::Remove { name, .. } => name,
        }
    }

    /// Renders the mutation as a `Set-Cookie` header value.
    pub fn to_set_cookie(&self) -> String {
        let (name, value, options, max_age) = match self {
            CookieMutation::Set {
                name,
                value,
                options,
            } => (name, value.as_str(), options, options.max_age),
            CookieMutation::Remove { name, options } => (name, "", options, Some(0)),
        };

        let mut out = format!("{}={}; Path={}", name, value, options.path);
        if let Some(age) = max_age {
            out.push_str(&format!("; Max-Age={}", age));
        }
        out.push_str(&format!("; SameSite={}", options.same_site));
        if options.secure {
            out.push_str("; Secure");
        }
        if options.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

/// Reads every `Cookie` header into ordered name/value pairs.
pub fn parse_cookie_header(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Rewrites the request's `Cookie` header so the application behind the gateway
/// sees the same cookies the browser will hold after the response.
pub fn rewrite_request_cookies(headers: &mut HeaderMap, mutations: &[CookieMutation]) {
    if mutations.is_empty() {
        return;
    }

    let mut cookies = parse_cookie_header(headers);
    for mutation in mutations {
        cookies.retain(|(name, _)| name != mutation.name());
        if let CookieMutation::Set { name, value, .. } = mutation {
            cookies.push((name.clone(), value.clone()));
        }
    }

    headers.remove(header::COOKIE);
    if cookies.is_empty() {
        return;
    }

    let joined = cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ");
    match HeaderValue::from_str(&joined) {
        Ok(value) => {
            headers.insert(header::COOKIE, value);
        }
        Err(e) => tracing::warn!("dropping rewritten cookie header: {}", e),
    }
}

/// Produces the final response with one `Set-Cookie` header per mutation.
pub fn apply_to_response(mut response: Response, mutations: &[CookieMutation]) -> Response {
    for mutation in mutations {
        match HeaderValue::from_str(&mutation.to_set_cookie()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(cookie = mutation.name(), "skipping Set-Cookie: {}", e),
        }
    }
    response
}
