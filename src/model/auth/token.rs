use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{
    errors::Error as JwtError, DecodingKey, EncodingKey, Header, TokenData, Validation,
};
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{self, FromRequest},
    Request, State,
};
use serde::{Deserialize, Serialize};
use time;

use crate::{
    model::{mongodb::Id, user::User},
    Config,
};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// A session token proving a completed login for a specific user.
///
/// The token is stateless apart from the revocation counter: it carries the
/// user's `token_version` at issue time, and the [`Session`] guard rejects
/// it once the user's counter has moved on (logout, password reset).
///
/// [`Session`]: crate::model::auth::Session
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(rename = "uid")]
    user_id: Id,
    #[serde(rename = "tv")]
    token_version: u32,
    /// Random nonce so no two issued tokens are byte-identical.
    #[serde(rename = "jti")]
    nonce: u32,
}

impl AuthToken {
    /// Create a new [`AuthToken`] for the given user.
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            token_version: user.token_version,
            nonce: rand::random(),
        }
    }

    /// The user this token belongs to.
    pub fn user_id(&self) -> Id {
        self.user_id
    }

    /// The user's revocation counter at issue time.
    pub fn token_version(&self) -> u32 {
        self.token_version
    }

    /// Serialize this token into a guarded session cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .unwrap(); // Infallible.

        Cookie::build(AUTH_TOKEN_COOKIE, token)
            .http_only(true)
            .secure(config.secure_cookies())
            .same_site(SameSite::Strict)
            .max_age(time::Duration::seconds(config.auth_ttl().num_seconds()))
            .finish()
    }

    /// Deserialize a token from a cookie, verifying signature and expiry.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self, JwtError> {
        jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = ();

    /// Extract and verify the session token from the cookie. Requests
    /// without a valid token never reach a handler.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let config = req.guard::<&State<Config>>().await.unwrap(); // Valid as `Config` is always managed

        let cookie = match req.cookies().get(AUTH_TOKEN_COOKIE) {
            Some(cookie) => cookie,
            None => return request::Outcome::Failure((Status::Unauthorized, ())),
        };
        match Self::from_cookie(cookie, config) {
            Ok(token) => request::Outcome::Success(token),
            Err(_) => request::Outcome::Failure((Status::Unauthorized, ())),
        }
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::errors::ErrorKind as JwtErrorKind;

    use super::*;

    #[test]
    fn tokens_round_trip_through_cookies() {
        let config = Config::example();
        let user = User::example();

        let cookie = AuthToken::for_user(&user).into_cookie(&config);
        let token = AuthToken::from_cookie(&cookie, &config).unwrap();

        assert_eq!(user.id, token.user_id());
        assert_eq!(user.token_version, token.token_version());
    }

    #[test]
    fn cookies_are_guarded() {
        let config = Config::example();
        let cookie = AuthToken::for_user(&User::example()).into_cookie(&config);

        assert_eq!(Some(true), cookie.http_only());
        assert_eq!(Some(SameSite::Strict), cookie.same_site());
        assert_eq!(
            Some(time::Duration::seconds(config.auth_ttl().num_seconds())),
            cookie.max_age()
        );
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let config = Config::example();
        let cookie = AuthToken::for_user(&User::example()).into_cookie(&config);

        let tampered = Cookie::new(AUTH_TOKEN_COOKIE, format!("{}x", cookie.value()));
        assert!(AuthToken::from_cookie(&tampered, &config).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let config = Config::example();
        let claims = Claims {
            token: AuthToken::for_user(&User::example()),
            expire_at: Utc::now() - chrono::Duration::hours(1),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .unwrap();
        let cookie = Cookie::new(AUTH_TOKEN_COOKIE, token);

        let err = AuthToken::from_cookie(&cookie, &config).unwrap_err();
        assert!(matches!(err.kind(), JwtErrorKind::ExpiredSignature));
    }

    #[test]
    fn no_two_issued_tokens_are_identical() {
        let config = Config::example();
        let user = User::example();

        let first = AuthToken::for_user(&user).into_cookie(&config);
        let second = AuthToken::for_user(&user).into_cookie(&config);

        assert_ne!(first.value(), second.value());
    }
}
