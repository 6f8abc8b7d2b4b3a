use std::ops::Deref;

use chrono::{serde::ts_seconds, DateTime, Utc};
use data_encoding::HEXLOWER;
use jsonwebtoken::{EncodingKey, Header};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    error::Error,
    model::mongodb::Id,
    Config,
};

/// A pending password reset, as stored in the database. There is at most
/// one per user: issuing a new token upserts over the previous entry, so
/// only the latest link a user was emailed can ever work.
#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordResetCore {
    pub user_id: Id,
    /// SHA-256 hex of the signed token. The plaintext only ever exists in
    /// the reset email.
    pub reset_token: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
}

impl PasswordResetCore {
    /// Check that this entry can still be consumed at the given instant.
    pub fn ensure_consumable(&self, now: DateTime<Utc>) -> Result<(), Error> {
        if self.is_used {
            return Err(Error::Validation(
                "This token has already been used. Please request a new reset link".to_string(),
            ));
        }
        if now > self.expires_at {
            return Err(Error::Validation(
                "This token has expired. Please request a new reset link".to_string(),
            ));
        }
        Ok(())
    }
}

/// A password reset entry without an ID.
pub type NewPasswordReset = PasswordResetCore;

/// A password reset entry from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordReset {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub reset: PasswordResetCore,
}

impl Deref for PasswordReset {
    type Target = PasswordResetCore;

    fn deref(&self) -> &Self::Target {
        &self.reset
    }
}

/// Claims inside the signed reset token: the owning user plus a random
/// nonce, so every issued token is distinct even within the same second.
#[derive(Serialize, Deserialize)]
struct ResetClaims {
    #[serde(rename = "uid")]
    user_id: Id,
    #[serde(rename = "rnd")]
    nonce: String,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// Issue a fresh reset token for the given user.
///
/// Returns the plaintext (to be emailed as a link, then forgotten) and the
/// storable entry holding only its hash.
pub fn issue_reset_token(user_id: Id, config: &Config) -> (String, NewPasswordReset) {
    let mut nonce = [0_u8; 32];
    rand::thread_rng().fill(&mut nonce);

    let expire_at = Utc::now() + config.reset_ttl();
    let claims = ResetClaims {
        user_id,
        nonce: HEXLOWER.encode(&nonce),
        expire_at,
    };
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret()),
    )
    .unwrap(); // Infallible.

    let entry = NewPasswordReset {
        user_id,
        reset_token: digest_reset_token(&token),
        expires_at: expire_at,
        is_used: false,
    };
    (token, entry)
}

/// SHA-256 hex of a presented token, matching the stored form.
pub fn digest_reset_token(token: &str) -> String {
    HEXLOWER.encode(&Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use jsonwebtoken::{DecodingKey, Validation};
    use mongodb::bson::oid::ObjectId;

    use super::*;

    #[test]
    fn digests_are_stable_hex() {
        let digest = digest_reset_token("some-token");
        assert_eq!(64, digest.len());
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, digest_reset_token("some-token"));
        assert_ne!(digest, digest_reset_token("some-other-token"));
    }

    #[test]
    fn issued_tokens_match_their_stored_hash() {
        let config = Config::example();
        let user_id: Id = ObjectId::new().into();

        let (plain, entry) = issue_reset_token(user_id, &config);

        assert_eq!(user_id, entry.user_id);
        assert_eq!(digest_reset_token(&plain), entry.reset_token);
        assert!(!entry.is_used);

        // The expiry sits one reset-TTL in the future.
        let expected = Utc::now() + config.reset_ttl();
        assert!((expected - entry.expires_at) < Duration::seconds(5));
    }

    #[test]
    fn issued_tokens_are_signed_for_the_right_user() {
        let config = Config::example();
        let user_id: Id = ObjectId::new().into();

        let (plain, _) = issue_reset_token(user_id, &config);

        let decoded = jsonwebtoken::decode::<ResetClaims>(
            &plain,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(user_id, decoded.claims.user_id);
    }

    #[test]
    fn no_two_issued_tokens_collide() {
        let config = Config::example();
        let user_id: Id = ObjectId::new().into();

        let (first, _) = issue_reset_token(user_id, &config);
        let (second, _) = issue_reset_token(user_id, &config);

        assert_ne!(first, second);
    }

    #[test]
    fn fresh_entries_are_consumable() {
        let config = Config::example();
        let (_, entry) = issue_reset_token(ObjectId::new().into(), &config);

        assert!(entry.ensure_consumable(Utc::now()).is_ok());
    }

    #[test]
    fn used_entries_are_rejected() {
        let config = Config::example();
        let (_, entry) = issue_reset_token(ObjectId::new().into(), &config);
        let entry = PasswordResetCore {
            is_used: true,
            ..entry
        };

        let err = entry.ensure_consumable(Utc::now()).unwrap_err();
        assert!(err.to_string().contains("already been used"));
    }

    #[test]
    fn expired_entries_are_rejected_even_if_unused() {
        let config = Config::example();
        let (_, entry) = issue_reset_token(ObjectId::new().into(), &config);

        let past_expiry = entry.expires_at + Duration::seconds(1);
        let err = entry.ensure_consumable(past_expiry).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }
}
