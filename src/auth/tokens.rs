//! Signed, expiring action tokens for signup confirmation and password reset.
//!
//! A token embeds a fingerprint of the piece of user state it is scoped to:
//! the confirmed flag for signup confirmation, the password hash for reset.
//! Verification recomputes the fingerprint from the current record, so a
//! token stops working as soon as that state changes. Nothing is persisted.

use std::future::Future;

use axum::extract::FromRef;
use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::auth::claims::{ActionClaims, ActionKind};
use crate::config::ActionTokenConfig;
use crate::error::AuthError;
use crate::state::AppState;
use crate::users::{User, UserId};

/// Digest of the user state an action token is bound to.
pub fn fingerprint(kind: ActionKind, user: &User) -> String {
    let material = match kind {
        ActionKind::SignupConfirm => format!("confirmed:{}", user.confirmed),
        ActionKind::PasswordReset => {
            format!("hash:{}", user.password_hash.as_deref().unwrap_or(""))
        }
    };
    Base64UrlUnpadded::encode_string(&Sha256::digest(material.as_bytes()))
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    signup_ttl: Duration,
    reset_ttl: Duration,
}

impl FromRef<AppState> for TokenCodec {
    fn from_ref(state: &AppState) -> Self {
        TokenCodec::new(
            &state.config.tokens,
            &state.config.jwt.issuer,
            &state.config.jwt.audience,
        )
    }
}

impl TokenCodec {
    pub fn new(config: &ActionTokenConfig, issuer: &str, audience: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            signup_ttl: Duration::seconds(config.signup_ttl_minutes.saturating_mul(60)),
            reset_ttl: Duration::seconds(config.reset_ttl_minutes.saturating_mul(60)),
        }
    }

    fn ttl(&self, kind: ActionKind) -> Duration {
        match kind {
            ActionKind::SignupConfirm => self.signup_ttl,
            ActionKind::PasswordReset => self.reset_ttl,
        }
    }

    pub fn issue(&self, user: &User, kind: ActionKind) -> anyhow::Result<String> {
        self.issue_with_ttl(user, kind, self.ttl(kind))
    }

    pub fn issue_with_ttl(
        &self,
        user: &User,
        kind: ActionKind,
        ttl: Duration,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now
            .checked_add(ttl)
            .and_then(|exp| u64::try_from(exp.unix_timestamp()).ok())
            .ok_or_else(|| anyhow::anyhow!("action token lifetime out of range: {}", ttl))?;
        let claims = ActionClaims {
            sub: user.id,
            act: kind,
            fpr: fingerprint(kind, user),
            iat: now.unix_timestamp() as u64,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user.id, kind = ?kind, "action token issued");
        Ok(token)
    }

    /// Checks signature, expiry and action kind; says nothing about staleness.
    pub fn decode(&self, token: &str, kind: ActionKind) -> Result<ActionClaims, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));

        let claims = decode::<ActionClaims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })?
            .claims;

        if claims.act != kind {
            warn!(expected = ?kind, got = ?claims.act, "action token used for the wrong action");
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Full verification against the subject's current state.
    ///
    /// `lookup` loads the subject; returning `None` (unknown user, or a
    /// subject the caller refuses) fails with `InvalidToken`.
    pub async fn verify<F, Fut>(
        &self,
        token: &str,
        kind: ActionKind,
        lookup: F,
    ) -> Result<User, AuthError>
    where
        F: FnOnce(UserId) -> Fut,
        Fut: Future<Output = anyhow::Result<Option<User>>>,
    {
        let claims = self.decode(token, kind)?;
        let user = lookup(claims.sub).await?.ok_or(AuthError::InvalidToken)?;
        if fingerprint(kind, &user) != claims.fpr {
            debug!(user_id = %user.id, kind = ?kind, "stale action token");
            return Err(AuthError::StaleToken);
        }
        Ok(user)
    }
}
