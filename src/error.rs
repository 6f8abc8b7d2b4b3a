use argon2::Error as Argon2Error;
use jsonwebtoken::errors::Error as JwtError;
use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};
use rocket::{http::Status, response::Responder, serde::json::Json};
use thiserror::Error;

use crate::model::api::ApiResponse;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything a request handler can fail with. Each variant maps onto a
/// fixed HTTP status, and the responder renders all of them through the
/// same `{status, message, payload}` envelope the success paths use.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),
    /// Uniqueness or state violation.
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    RateLimited(String),
    /// A downstream service (mail, SMS, object storage) failed.
    #[error("{0}")]
    Dependency(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Self::Validation(_) | Self::Conflict(_) => Status::BadRequest,
            Self::Unauthenticated(_) | Self::Jwt(_) => Status::Unauthorized,
            Self::Forbidden(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
            Self::RateLimited(_) => Status::TooManyRequests,
            Self::Db(err) if is_duplicate_key(err) => Status::BadRequest,
            Self::Db(_) | Self::Argon2(_) | Self::Dependency(_) => Status::InternalServerError,
        }
    }

    /// The message sent to the client. Internal errors are not echoed
    /// verbatim; their details only go to the log.
    fn public_message(&self) -> String {
        match self {
            Self::Db(err) if is_duplicate_key(err) => {
                "A record with these unique fields already exists".to_string()
            }
            Self::Db(_) | Self::Argon2(_) => "Internal server error".to_string(),
            Self::Jwt(_) => "Invalid or expired token".to_string(),
            other => other.to_string(),
        }
    }
}

/// Duplicate-key write errors surface uniqueness violations that the
/// pre-insert checks can miss under concurrent requests.
pub fn is_duplicate_key(err: &DbError) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_err)) if write_err.code == 11000
    )
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |err| match &err.message {
                    Some(msg) => format!("{field}: {msg}"),
                    None => format!("{field}: invalid value"),
                })
            })
            .collect::<Vec<_>>()
            .join("; ");
        Self::Validation(message)
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        let body = ApiResponse::message(status, self.public_message());
        (status, Json(body)).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(Status::BadRequest, Error::Validation("bad".into()).status());
        assert_eq!(Status::BadRequest, Error::Conflict("duplicate".into()).status());
        assert_eq!(
            Status::Unauthorized,
            Error::Unauthenticated("no session".into()).status()
        );
        assert_eq!(Status::Forbidden, Error::Forbidden("no".into()).status());
        assert_eq!(Status::NotFound, Error::NotFound("gone".into()).status());
        assert_eq!(
            Status::TooManyRequests,
            Error::RateLimited("slow down".into()).status()
        );
        assert_eq!(
            Status::InternalServerError,
            Error::Dependency("mail gateway".into()).status()
        );
    }

    #[test]
    fn token_failures_are_unauthorized() {
        let err = Error::from(JwtError::from(
            jsonwebtoken::errors::ErrorKind::ExpiredSignature,
        ));
        assert_eq!(Status::Unauthorized, err.status());

        let err = Error::from(JwtError::from(
            jsonwebtoken::errors::ErrorKind::InvalidSignature,
        ));
        assert_eq!(Status::Unauthorized, err.status());
    }
}
