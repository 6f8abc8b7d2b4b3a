use rocket::http::Status;
use serde::Serialize;

/// The uniform response envelope shared by success paths, error paths and
/// catchers alike.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub message: String,
    pub payload: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn new(status: Status, message: impl Into<String>, payload: T) -> Self {
        Self {
            status: status.code,
            message: message.into(),
            payload: Some(payload),
        }
    }

    /// A 200 envelope with a payload.
    pub fn ok(message: impl Into<String>, payload: T) -> Self {
        Self::new(Status::Ok, message, payload)
    }
}

impl ApiResponse<()> {
    /// An envelope with no payload.
    pub fn message(status: Status, message: impl Into<String>) -> Self {
        Self {
            status: status.code,
            message: message.into(),
            payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json::{self, json};

    use super::*;

    #[test]
    fn envelopes_serialize_with_all_three_fields() {
        let envelope = ApiResponse::ok("Fetched", vec![1, 2, 3]);
        assert_eq!(
            json!({ "status": 200, "message": "Fetched", "payload": [1, 2, 3] }),
            serde_json::to_value(&envelope).unwrap()
        );

        let envelope = ApiResponse::message(Status::NotFound, "Candidate not found");
        assert_eq!(
            json!({ "status": 404, "message": "Candidate not found", "payload": null }),
            serde_json::to_value(&envelope).unwrap()
        );
    }
}
