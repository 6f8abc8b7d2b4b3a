use rocket::serde::json::Value as JsonValue;
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::model::{mobile::Mobile, user::Role};

/// Registration request. Validation mirrors the eligibility rules: adults
/// only, a real mobile number, a 12-digit national ID.
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
    pub name: String,
    #[validate(range(min = 18, max = 100, message = "Age must be between 18 and 100"))]
    pub age: u8,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub mobile: Mobile,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(custom(function = "validate_national_id"))]
    pub national_id: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[serde(default)]
    pub role: Role,
    pub profile_picture: Option<String>,
}

/// Login credentials.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub national_id: String,
    pub password: String,
}

/// Profile update request. `password`, `has_voted` and `national_id` are
/// captured only so their presence can be rejected: the first two have
/// dedicated flows, the last is immutable.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
    pub name: Option<String>,
    #[validate(range(min = 18, max = 100, message = "Age must be between 18 and 100"))]
    pub age: Option<u8>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub mobile: Option<Mobile>,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: Option<String>,
    pub profile_picture: Option<String>,
    pub role: Option<Role>,
    pub password: Option<JsonValue>,
    #[serde(alias = "hasVoted", alias = "isVoted")]
    pub has_voted: Option<JsonValue>,
    #[serde(alias = "nationalId")]
    pub national_id: Option<JsonValue>,
}

impl UpdateUserRequest {
    /// Fields that may not be set through the profile-update path.
    pub fn immutable_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.password.is_some() {
            fields.push("password");
        }
        if self.has_voted.is_some() {
            fields.push("has_voted");
        }
        if self.national_id.is_some() {
            fields.push("national_id");
        }
        fields
    }
}

/// Password change request for a logged-in user.
#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Password reset submission: the emailed token plus the chosen password.
#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub token: String,
    pub password: String,
}

/// Candidate creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct CandidateRequest {
    #[validate(
        length(min = 1, message = "Name is required"),
        custom(function = "validate_proper_name")
    )]
    pub name: String,
    #[validate(
        length(min = 1, message = "Party name is required"),
        custom(function = "validate_proper_name")
    )]
    pub party: String,
    #[validate(range(min = 25, max = 75, message = "Candidate age must be between 25 and 75"))]
    pub age: u8,
}

/// Candidate update request. The vote ledger is write-protected from
/// direct updates; `votes` and `vote_count` are captured only so their
/// presence can be rejected.
#[derive(Debug, Deserialize, Validate)]
pub struct CandidateUpdateRequest {
    #[validate(
        length(min = 1, message = "Name must be at least 1 character"),
        custom(function = "validate_proper_name")
    )]
    pub name: Option<String>,
    #[validate(
        length(min = 1, message = "Party must be at least 1 character"),
        custom(function = "validate_proper_name")
    )]
    pub party: Option<String>,
    #[validate(range(min = 1, message = "Age must be a positive integer"))]
    pub age: Option<u8>,
    pub votes: Option<JsonValue>,
    #[serde(alias = "voteCount")]
    pub vote_count: Option<JsonValue>,
}

impl CandidateUpdateRequest {
    /// Write-protected fields present in the patch.
    pub fn protected_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.votes.is_some() {
            fields.push("votes");
        }
        if self.vote_count.is_some() {
            fields.push("vote_count");
        }
        fields
    }
}

fn validate_national_id(value: &str) -> Result<(), ValidationError> {
    if value.len() == 12 && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("national_id");
        err.message = Some("National ID must be exactly 12 digits".into());
        Err(err)
    }
}

fn validate_proper_name(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_ascii_alphabetic() || c.is_whitespace()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("proper_name");
        err.message = Some("Must not include numbers or special characters".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json::{self, json, Value};

    use super::*;

    fn signup_body() -> Value {
        json!({
            "name": "Aarav Sharma",
            "age": 30,
            "email": "aarav@example.com",
            "mobile": "+447700900123",
            "address": "12 Rose Lane",
            "national_id": "123412341234",
            "password": "Sample@123",
        })
    }

    #[test]
    fn well_formed_signups_validate() {
        let request: SignupRequest = serde_json::from_value(signup_body()).unwrap();
        assert!(request.validate().is_ok());
        // Role defaults to voter when absent.
        assert_eq!(Role::Voter, request.role);
    }

    #[test]
    fn bad_emails_are_rejected() {
        let mut body = signup_body();
        body["email"] = json!("not-an-email");
        let request: SignupRequest = serde_json::from_value(body).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
    }

    #[test]
    fn national_ids_must_be_twelve_digits() {
        for bad in ["12341234123", "1234123412345", "12341234123a"] {
            let mut body = signup_body();
            body["national_id"] = json!(bad);
            let request: SignupRequest = serde_json::from_value(body).unwrap();
            let errors = request.validate().unwrap_err();
            assert!(errors.field_errors().contains_key("national_id"), "{bad}");
        }
    }

    #[test]
    fn short_passwords_are_rejected() {
        let mut body = signup_body();
        body["password"] = json!("Short@1");
        let request: SignupRequest = serde_json::from_value(body).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));
    }

    #[test]
    fn minors_are_rejected() {
        let mut body = signup_body();
        body["age"] = json!(17);
        let request: SignupRequest = serde_json::from_value(body).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("age"));
    }

    #[test]
    fn invalid_mobiles_fail_to_deserialize() {
        let mut body = signup_body();
        body["mobile"] = json!("5555");
        assert!(serde_json::from_value::<SignupRequest>(body).is_err());
    }

    #[test]
    fn profile_patches_expose_immutable_fields() {
        let patch: UpdateUserRequest = serde_json::from_value(json!({
            "name": "Aarav S Sharma",
            "password": "Sneaky@123",
            "hasVoted": true,
        }))
        .unwrap();
        assert_eq!(vec!["password", "has_voted"], patch.immutable_fields());

        let clean: UpdateUserRequest =
            serde_json::from_value(json!({ "name": "Aarav S Sharma" })).unwrap();
        assert!(clean.immutable_fields().is_empty());
    }

    #[test]
    fn candidate_names_may_not_contain_digits() {
        let request: CandidateRequest = serde_json::from_value(json!({
            "name": "Morgan Reed 3rd",
            "party": "Unity",
            "age": 45,
        }))
        .unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
    }

    #[test]
    fn candidate_patches_expose_protected_fields() {
        let patch: CandidateUpdateRequest = serde_json::from_value(json!({
            "name": "Morgan Reed",
            "voteCount": 9000,
        }))
        .unwrap();
        assert_eq!(vec!["vote_count"], patch.protected_fields());

        let patch: CandidateUpdateRequest = serde_json::from_value(json!({
            "votes": [],
            "vote_count": 1,
        }))
        .unwrap();
        assert_eq!(vec!["votes", "vote_count"], patch.protected_fields());

        let clean: CandidateUpdateRequest =
            serde_json::from_value(json!({ "party": "Unity" })).unwrap();
        assert!(clean.protected_fields().is_empty());
    }
}
