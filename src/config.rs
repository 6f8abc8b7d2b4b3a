use std::time::Duration as StdDuration;

use aws_config::SdkConfig;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_sns::{Client as SnsClient, Credentials, Region};
use chrono::Duration;
use mongodb::Client as MongoClient;
use redis::{aio::ConnectionManagerConfig, Client as RedisClient};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::{
    limiter::RateLimiter, model::mongodb::ensure_indexes_exist, notify::Mailer, storage::MediaStore,
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    hostname: String,
    auth_ttl: u32,
    reset_ttl: u32,
    cache_ttl: u32,
    reset_rate_window: u32,
    secure_cookies: bool,
    // secrets
    jwt_secret: String,
}

impl Config {
    /// The public hostname the site is running on.
    /// Used to build password-reset links.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Valid lifetime of session token cookies.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Valid lifetime of password-reset tokens.
    pub fn reset_ttl(&self) -> Duration {
        Duration::seconds(self.reset_ttl.into())
    }

    /// Seconds until a cache entry expires regardless of invalidation.
    pub fn cache_ttl(&self) -> u64 {
        self.cache_ttl.into()
    }

    /// Width of the per-email password-reset rate-limit window.
    pub fn reset_rate_window(&self) -> Duration {
        Duration::seconds(self.reset_rate_window.into())
    }

    /// Whether session cookies carry the `Secure` flag.
    /// Off for local development, on in production.
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    /// Secret key used to sign JWTs (session and reset tokens alike).
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self {
                hostname: "http://localhost:8000".to_string(),
                auth_ttl: 21600,
                reset_ttl: 3600,
                cache_ttl: 600,
                reset_rate_window: 600,
                secure_cookies: false,
                jwt_secret: "test-secret-do-not-deploy".to_string(),
            }
        }
    }
}

/// A fairing that loads the application config, puts it in managed state,
/// and constructs the in-memory rate limiter sized by it.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let limiter = RateLimiter::new(config.reset_rate_window());

        // Manage the state.
        rocket = rocket.manage(config).manage(limiter);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a
/// `Database` into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // Ensure the required unique indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "ballotbox".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Configuration for the cache.
#[derive(Deserialize)]
struct CacheConfig {
    // secrets
    redis_uri: String,
}

/// A fairing that connects to Redis and places a `ConnectionManager` into
/// managed state. The manager reconnects on its own; cache reads and
/// writes after a lost connection degrade to misses rather than errors.
pub struct CacheFairing;

#[rocket::async_trait]
impl Fairing for CacheFairing {
    fn info(&self) -> Info {
        Info {
            name: "Redis",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<CacheConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load cache config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        // Construct the connection.
        let client = match RedisClient::open(config.redis_uri.as_str()) {
            Ok(client) => client,
            Err(e) => {
                error!("Invalid redis URI: {e}");
                return Err(rocket);
            }
        };
        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(StdDuration::from_millis(500));
        let manager = match client
            .get_connection_manager_with_config(manager_config)
            .await
        {
            Ok(manager) => manager,
            Err(e) => {
                error!("Failed to connect to cache: {e}");
                return Err(rocket);
            }
        };
        info!("Cache connection online");

        // Manage the state.
        rocket = rocket.manage(manager);
        Ok(rocket)
    }
}

/// Configuration for the AWS connection.
#[derive(Deserialize)]
struct AwsConfig {
    // non-secrets
    aws_region: String,
    aws_access_key_id: String,
    s3_bucket: String,
    // secrets
    aws_secret_access_key: String,
}

/// A fairing that loads the AWS config and places an SNS `Client` (welcome
/// SMS) and a [`MediaStore`] (profile pictures) into managed state.
pub struct AwsFairing;

#[rocket::async_trait]
impl Fairing for AwsFairing {
    fn info(&self) -> Info {
        Info {
            name: "AWS",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<AwsConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load AWS config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        // Construct the connection.
        let aws_config = SdkConfig::builder()
            .region(Region::new(config.aws_region))
            .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                config.aws_access_key_id,
                config.aws_secret_access_key,
                None,
                None,
                "rocket config",
            )))
            .build();
        let sns = SnsClient::new(&aws_config);
        let media = MediaStore::new(S3Client::new(&aws_config), config.s3_bucket);
        info!("Loaded AWS config");

        // Manage the state.
        rocket = rocket.manage(sns).manage(media);
        Ok(rocket)
    }
}

/// Configuration for the transactional mail gateway.
#[derive(Deserialize)]
struct MailConfig {
    // non-secrets
    mail_endpoint: String,
    mail_from: String,
    // secrets
    mail_api_key: String,
}

/// A fairing that constructs the [`Mailer`] and places it into managed
/// state.
pub struct MailFairing;

#[rocket::async_trait]
impl Fairing for MailFairing {
    fn info(&self) -> Info {
        Info {
            name: "Mail",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<MailConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load mail config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let mailer = Mailer::new(config.mail_endpoint, config.mail_api_key, config.mail_from);
        info!("Loaded mail config");

        // Manage the state.
        rocket = rocket.manage(mailer);
        Ok(rocket)
    }
}
