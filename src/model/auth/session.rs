use std::ops::Deref;

use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    outcome::try_outcome,
    request::{self, FromRequest},
    Request,
};

use crate::{
    cache::{user_key, Cache},
    model::{
        auth::AuthToken,
        mongodb::{Coll, Id},
        user::{Role, User},
    },
};

/// A live authenticated session: a verified token whose revocation counter
/// still matches the user record. Handlers taking this guard receive the
/// loaded user.
pub struct Session {
    pub user: User,
}

impl Deref for Session {
    type Target = User;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let token = try_outcome!(req.guard::<AuthToken>().await);
        let users = try_outcome!(req.guard::<Coll<User>>().await);
        let cache = try_outcome!(req.guard::<Cache>().await);

        let user = match load_user(token.user_id(), &users, &cache).await {
            Ok(Some(user)) => user,
            // The token references a user that no longer exists.
            Ok(None) => return request::Outcome::Failure((Status::Unauthorized, ())),
            Err(err) => {
                error!("Failed to load session user: {err}");
                return request::Outcome::Failure((Status::InternalServerError, ()));
            }
        };

        // A stale counter means the session was revoked by a logout or a
        // password reset.
        if user.token_version != token.token_version() {
            return request::Outcome::Failure((Status::Unauthorized, ()));
        }

        request::Outcome::Success(Session { user })
    }
}

/// An authenticated session belonging to the admin.
pub struct AdminSession {
    pub user: User,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminSession {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let session = try_outcome!(req.guard::<Session>().await);
        if session.user.role != Role::Admin {
            return request::Outcome::Failure((Status::Forbidden, ()));
        }
        request::Outcome::Success(AdminSession { user: session.user })
    }
}

/// Load a user by ID, reading through the cache. Cached entries hold the
/// full database document, so the revocation check works without a
/// database round trip on a hit.
pub async fn load_user(id: Id, users: &Coll<User>, cache: &Cache) -> Result<Option<User>, DbError> {
    if let Some(user) = cache.get::<User>(&user_key(id)).await {
        return Ok(Some(user));
    }
    let user = users.find_one(id.as_doc(), None).await?;
    if let Some(user) = &user {
        cache.put(&user_key(id), user).await;
    }
    Ok(user)
}
