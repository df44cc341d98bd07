//! # cc-auth-jwt
//!
//! HS256 implementation of `IdentityProvider`.
//! Verifies access tokens minted by the OAuth provider and turns their
//! claims into an [`Identity`] used to look up (or create) the profile row.

use cc_core::error::{AppError, Result};
use cc_core::traits::{Identity, IdentityProvider};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

/// Provider-specific profile hints carried in the token.
#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    /// `audience: None` skips the `aud` check.
    pub fn new(secret: &SecretString, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn authenticate(&self, bearer_token: &str) -> Result<Identity> {
        let data = decode::<Claims>(bearer_token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "rejected access token");
            AppError::Unauthorized("invalid or expired token".into())
        })?;
        let claims = data.claims;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("token subject is not a user id".into()))?;

        Ok(Identity {
            user_id,
            username: display_name(&claims, user_id),
            avatar_url: claims.user_metadata.avatar_url.filter(|u| !u.is_empty()),
        })
    }
}

/// Provider user name, then full name, then the e-mail local part, then a
/// stable placeholder built from the id.
fn display_name(claims: &Claims, user_id: Uuid) -> String {
    let meta = &claims.user_metadata;
    meta.user_name
        .as_deref()
        .or(meta.full_name.as_deref())
        .or_else(|| claims.email.as_deref().and_then(|e| e.split('@').next()))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("user-{}", &user_id.simple().to_string()[..8]))
}
