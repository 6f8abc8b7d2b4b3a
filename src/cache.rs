use redis::{aio::ConnectionManager, AsyncCommands};
use rocket::{
    request::{self, FromRequest, Request},
    serde::json::serde_json,
    State,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{model::mongodb::Id, Config};

/// Cache key for the candidate list.
pub const CANDIDATES_KEY: &str = "candidates";
/// Cache key for the tally.
pub const VOTE_COUNT_KEY: &str = "voteCount";

/// Cache key for a single user.
pub fn user_key(id: Id) -> String {
    format!("user:{id}")
}

/// Invalidation-on-write cache over Redis for the read-heavy queries.
///
/// Not correctness-critical: every operation degrades to a miss or a no-op
/// (with a logged warning) when the backend is unreachable, and every
/// entry carries a fixed TTL bounding staleness even if an invalidation is
/// missed.
pub struct Cache {
    conn: ConnectionManager,
    ttl: u64,
}

impl Cache {
    pub fn new(conn: ConnectionManager, ttl: u64) -> Self {
        Self { conn, ttl }
    }

    /// Look up a cached value. Any backend or decode failure is a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();
        let value: Option<String> = match conn.get(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!("Cache read for `{key}` failed: {err}");
                return None;
            }
        };
        value.and_then(|json| match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Cache entry for `{key}` is corrupt: {err}");
                None
            }
        })
    }

    /// Store a value under the fixed TTL.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                warn!("Failed to serialize cache entry for `{key}`: {err}");
                return;
            }
        };
        let mut conn = self.conn.clone();
        if let Err(err) = conn.set_ex::<_, _, ()>(key, json, self.ttl).await {
            warn!("Cache write for `{key}` failed: {err}");
        }
    }

    /// Drop entries after a write to the data behind them.
    pub async fn invalidate(&self, keys: &[&str]) {
        let mut conn = self.conn.clone();
        if let Err(err) = conn.del::<_, ()>(keys).await {
            warn!("Cache invalidation for {keys:?} failed: {err}");
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Cache {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        // Valid as the manager and config are always managed.
        let conn = req.guard::<&State<ConnectionManager>>().await.unwrap();
        let config = req.guard::<&State<Config>>().await.unwrap();
        request::Outcome::Success(Cache::new(conn.inner().clone(), config.cache_ttl()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_keys_embed_the_id() {
        let id: Id = "62c1f9ab0c1d2e3f4a5b6c7d".parse().unwrap();
        assert_eq!("user:62c1f9ab0c1d2e3f4a5b6c7d", user_key(id));
    }
}
