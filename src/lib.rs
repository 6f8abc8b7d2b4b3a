#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

use rocket::{Build, Rocket};

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod model;
pub mod notify;
pub mod storage;

pub use config::Config;

/// Assemble the rocket instance: routes, catchers, and the ignite fairings
/// that construct every shared service (config, database, cache, AWS
/// clients, mailer) and place it into managed state.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/user", api::user_routes())
        .mount("/candidate", api::candidate_routes())
        .register("/", api::catchers())
        .attach(config::ConfigFairing)
        .attach(config::DatabaseFairing)
        .attach(config::CacheFairing)
        .attach(config::AwsFairing)
        .attach(config::MailFairing)
        .attach(logging::LoggerFairing)
}
