use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::{
    candidate::{Candidate, CandidateCore},
    reset::{PasswordReset, PasswordResetCore},
    user::{User, UserCore},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a
    /// collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// User collections.
const USERS: &str = "users";
impl MongoCollection for User {
    const NAME: &'static str = USERS;
}
impl MongoCollection for UserCore {
    const NAME: &'static str = USERS;
}

// Candidate collections.
const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}
impl MongoCollection for CandidateCore {
    const NAME: &'static str = CANDIDATES;
}

// Password reset collections.
const PASSWORD_RESETS: &str = "password_resets";
impl MongoCollection for PasswordReset {
    const NAME: &'static str = PASSWORD_RESETS;
}
impl MongoCollection for PasswordResetCore {
    const NAME: &'static str = PASSWORD_RESETS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // User collection: each identity field is unique on its own.
    for key in ["national_id", "email", "mobile"] {
        let index = IndexModel::builder()
            .keys(doc! { key: 1 })
            .options(unique.clone())
            .build();
        Coll::<User>::from_db(db).create_index(index, None).await?;
    }

    // At most one admin may exist system-wide; a partial unique index
    // backs up the checks in the registration and update paths.
    let single_admin = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! { "role": "admin" })
        .build();
    let admin_index = IndexModel::builder()
        .keys(doc! { "role": 1 })
        .options(single_admin)
        .build();
    Coll::<User>::from_db(db)
        .create_index(admin_index, None)
        .await?;

    // Candidate collection: (name, party) unique as a pair.
    let candidate_index = IndexModel::builder()
        .keys(doc! { "name": 1, "party": 1 })
        .options(unique.clone())
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    // Password reset collection: one outstanding entry per user, and the
    // hashed token is the lookup key at consumption time.
    for key in ["user_id", "reset_token"] {
        let index = IndexModel::builder()
            .keys(doc! { key: 1 })
            .options(unique.clone())
            .build();
        Coll::<PasswordReset>::from_db(db)
            .create_index(index, None)
            .await?;
    }

    Ok(())
}
