use async_trait::async_trait;
use axum::http::HeaderMap;
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    cookies::{CookieMutation, CookieOptions, parse_cookie_header},
    error::SessionError,
    models::Session,
};

/// Largest cookie value written before the session is split into `<name>.N` chunks.
pub const MAX_CHUNK_SIZE: usize = 3180;

/// A token closer than this to its expiry is refreshed ahead of time.
pub const EXPIRY_MARGIN_SECS: i64 = 10;

const BASE64_PREFIX: &str = "base64-";

/// HTTP timeout for the token refresh: three quarters of the session deadline.
pub fn refresh_timeout(session_timeout: std::time::Duration) -> std::time::Duration {
    session_timeout * 3 / 4
}

/// Credentials
///
/// The credential material carried by a request: its cookies in header order
/// and the local-development `x-user-id` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub cookies: Vec<(String, String)>,
    pub bypass_user: Option<String>,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            cookies: parse_cookie_header(headers),
            bypass_user: headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .map(String::from),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// SessionResolution
///
/// The answer of a session provider: the session, if any, and the cookie
/// changes the browser must receive to stay in sync (refreshed or cleared tokens).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionResolution {
    pub session: Option<Session>,
    pub cookies: Vec<CookieMutation>,
}

impl SessionResolution {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(session: Session) -> Self {
        Self {
            session: Some(session),
            cookies: Vec::new(),
        }
    }

    pub fn signed_out(cookies: Vec<CookieMutation>) -> Self {
        Self {
            session: None,
            cookies,
        }
    }
}

/// SessionProvider Trait
///
/// Resolves request credentials to a session. Called at most once per request;
/// any token refresh it performs is reported through `SessionResolution::cookies`
/// rather than by touching the response.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn resolve(&self, credentials: &Credentials) -> Result<SessionResolution, SessionError>;
}

/// SessionState
///
/// The shared handle to the session provider held in the application state.
pub type SessionState = Arc<dyn SessionProvider>;

/// Claims
///
/// The subset of a Supabase access token payload the gateway relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// StoredSession
///
/// The session object kept in the auth cookie. Fields the gateway does not
/// interpret (`user`, `token_type`, ...) are carried through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Decodes an auth cookie value: `base64-` prefixed base64url JSON, or plain
/// (possibly percent-encoded) JSON.
pub fn decode_cookie_value(value: &str) -> Result<StoredSession, SessionError> {
    let json = match value.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => {
            let bytes = URL_SAFE_NO_PAD
                .decode(encoded.trim_end_matches('='))
                .or_else(|_| STANDARD.decode(encoded))
                .map_err(|e| SessionError::MalformedCookie(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| SessionError::MalformedCookie(e.to_string()))?
        }
        None => percent_decode_str(value)
            .decode_utf8()
            .map_err(|e| SessionError::MalformedCookie(e.to_string()))?
            .into_owned(),
    };

    serde_json::from_str(&json).map_err(|e| SessionError::MalformedCookie(e.to_string()))
}

/// Encodes a session the way it is written back to the browser.
pub fn encode_cookie_value(stored: &StoredSession) -> Result<String, SessionError> {
    let json =
        serde_json::to_string(stored).map_err(|e| SessionError::MalformedCookie(e.to_string()))?;
    Ok(format!("{}{}", BASE64_PREFIX, URL_SAFE_NO_PAD.encode(json)))
}

/// SupabaseSessionProvider
///
/// Reads the `sb-<project-ref>-auth-token` cookie, verifies the access token
/// against the project's JWT secret and refreshes it through the Supabase Auth
/// token endpoint when it is about to expire.
pub struct SupabaseSessionProvider {
    client: reqwest::Client,
    supabase_url: String,
    anon_key: String,
    decoding_key: DecodingKey,
    validation: Validation,
    cookie_name: String,
    cookie_options: CookieOptions,
    local_bypass: bool,
}

impl SupabaseSessionProvider {
    pub fn new(config: &AppConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[config.jwt_audience.as_str()]);
        validation.validate_exp = true;
        validation.leeway = 0;

        // Refresh must give up before the router's session deadline, otherwise a
        // late answer is dropped together with the rotated refresh token.
        let client = reqwest::Client::builder()
            .timeout(refresh_timeout(config.session_timeout))
            .build()
            .unwrap_or_default();

        Self {
            client,
            supabase_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            cookie_name: config.session_cookie_name.clone(),
            cookie_options: CookieOptions {
                secure: config.secure_cookies,
                ..CookieOptions::default()
            },
            local_bypass: config.env == Env::Local,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Local development bypass: a UUID in `x-user-id` is taken as the caller.
    fn bypass_session(&self, credentials: &Credentials) -> Option<Session> {
        if !self.local_bypass {
            return None;
        }
        let user_id = Uuid::parse_str(credentials.bypass_user.as_deref()?).ok()?;
        Some(Session {
            user_id,
            email: None,
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    /// Names of every auth-cookie chunk the browser sent.
    fn present_cookie_names(&self, credentials: &Credentials) -> Vec<String> {
        let chunk_prefix = format!("{}.", self.cookie_name);
        credentials
            .cookies
            .iter()
            .map(|(name, _)| name)
            .filter(|name| **name == self.cookie_name || name.starts_with(&chunk_prefix))
            .cloned()
            .collect()
    }

    /// The auth cookie value, reassembled from `<name>.0`, `<name>.1`, ... when chunked.
    fn read_auth_cookie(&self, credentials: &Credentials) -> Option<String> {
        if let Some(value) = credentials.cookie(&self.cookie_name) {
            return Some(value.to_string());
        }

        let mut value = String::new();
        let mut index = 0;
        while let Some(chunk) = credentials.cookie(&format!("{}.{}", self.cookie_name, index)) {
            value.push_str(chunk);
            index += 1;
        }
        (index > 0).then_some(value)
    }

    fn removals(&self, present: &[String]) -> Vec<CookieMutation> {
        present
            .iter()
            .map(|name| CookieMutation::Remove {
                name: name.clone(),
                options: self.cookie_options.clone(),
            })
            .collect()
    }

    /// Cookie mutations that store `stored`, chunking large values and removing
    /// chunks left over from the previous layout.
    fn write_session(
        &self,
        stored: &StoredSession,
        present: &[String],
    ) -> Result<Vec<CookieMutation>, SessionError> {
        let encoded = encode_cookie_value(stored)?;

        let mut writes: Vec<(String, String)> = Vec::new();
        if encoded.len() <= MAX_CHUNK_SIZE {
            writes.push((self.cookie_name.clone(), encoded));
        } else {
            // base64url output is ASCII, so byte boundaries are char boundaries.
            for (index, chunk) in encoded.as_bytes().chunks(MAX_CHUNK_SIZE).enumerate() {
                writes.push((
                    format!("{}.{}", self.cookie_name, index),
                    String::from_utf8_lossy(chunk).into_owned(),
                ));
            }
        }

        let stale: Vec<String> = present
            .iter()
            .filter(|name| !writes.iter().any(|(written, _)| written == *name))
            .cloned()
            .collect();

        let mut mutations = self.removals(&stale);
        mutations.extend(writes.into_iter().map(|(name, value)| CookieMutation::Set {
            name,
            value,
            options: self.cookie_options.clone(),
        }));
        Ok(mutations)
    }

    fn session_from_claims(claims: Claims) -> Session {
        Session {
            user_id: claims.sub,
            email: claims.email,
            expires_at: DateTime::from_timestamp(claims.exp as i64, 0).unwrap_or_default(),
        }
    }

    /// Exchanges the refresh token for a new session.
    ///
    /// A 4xx answer means the refresh token is no longer valid: the caller is
    /// signed out and the auth cookies are cleared. Transport errors and 5xx
    /// answers are reported as errors so the caller can decide.
    async fn refresh(
        &self,
        refresh_token: &str,
        present: &[String],
    ) -> Result<SessionResolution, SessionError> {
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.supabase_url);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            tracing::info!(%status, "refresh token rejected, clearing session cookie");
            return Ok(SessionResolution::signed_out(self.removals(present)));
        }
        if !status.is_success() {
            return Err(SessionError::RefreshStatus(status));
        }

        let mut refreshed: StoredSession = response.json().await?;
        if refreshed.expires_at.is_none() {
            refreshed.expires_at = refreshed
                .extra
                .get("expires_in")
                .and_then(|v| v.as_i64())
                .map(|secs| Utc::now().timestamp() + secs);
        }

        let claims = match decode::<Claims>(
            refreshed.access_token.as_str(),
            &self.decoding_key,
            &self.validation,
        ) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::warn!("refreshed access token failed verification: {}", e);
                return Ok(SessionResolution::signed_out(self.removals(present)));
            }
        };

        let cookies = self.write_session(&refreshed, present)?;
        tracing::debug!(user_id = %claims.sub, "session refreshed");
        Ok(SessionResolution {
            session: Some(Self::session_from_claims(claims)),
            cookies,
        })
    }
}

#[async_trait]
impl SessionProvider for SupabaseSessionProvider {
    async fn resolve(&self, credentials: &Credentials) -> Result<SessionResolution, SessionError> {
        if let Some(session) = self.bypass_session(credentials) {
            return Ok(SessionResolution::authenticated(session));
        }

        let Some(value) = self.read_auth_cookie(credentials) else {
            return Ok(SessionResolution::anonymous());
        };
        let present = self.present_cookie_names(credentials);
        let stored = decode_cookie_value(&value)?;

        let current = match decode::<Claims>(
            stored.access_token.as_str(),
            &self.decoding_key,
            &self.validation,
        ) {
            Ok(data) => Some(Self::session_from_claims(data.claims)),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => None,
            Err(e) => {
                tracing::debug!("rejecting access token: {}", e);
                return Ok(SessionResolution::anonymous());
            }
        };

        let expiring = match &current {
            Some(session) => (session.expires_at - Utc::now()).num_seconds() <= EXPIRY_MARGIN_SECS,
            None => true,
        };
        if !expiring {
            if let Some(session) = current {
                return Ok(SessionResolution::authenticated(session));
            }
        }

        let Some(refresh_token) = stored.refresh_token.as_deref() else {
            return Ok(match current {
                Some(session) => SessionResolution::authenticated(session),
                None => SessionResolution::signed_out(self.removals(&present)),
            });
        };

        match self.refresh(refresh_token, &present).await {
            Ok(resolution) => Ok(resolution),
            // The token is still usable; try again on the next request.
            Err(e) if current.is_some() => {
                tracing::warn!("token refresh failed, keeping current session: {}", e);
                Ok(current
                    .map(SessionResolution::authenticated)
                    .unwrap_or_default())
            }
            Err(e) => Err(e),
        }
    }
}
