use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};

use crate::model::api::ApiResponse;

mod auth;
mod candidate;
mod user;

/// Routes mounted under `/user`.
pub fn user_routes() -> Vec<Route> {
    let mut routes = auth::routes();
    routes.extend(user::routes());
    routes
}

/// Routes mounted under `/candidate`.
pub fn candidate_routes() -> Vec<Route> {
    candidate::routes()
}

pub fn catchers() -> Vec<Catcher> {
    catchers![envelope]
}

/// Render guard failures and unmatched routes through the same envelope as
/// handler errors.
#[catch(default)]
fn envelope(status: Status, _req: &Request) -> (Status, Json<ApiResponse<()>>) {
    let message = match status.code {
        400 | 422 => "Malformed request".to_string(),
        401 => "User not logged in".to_string(),
        403 => "Access denied".to_string(),
        404 => "Resource not found".to_string(),
        429 => "Too many requests".to_string(),
        _ => status.reason_lossy().to_string(),
    };
    (status, Json(ApiResponse::message(status, message)))
}
