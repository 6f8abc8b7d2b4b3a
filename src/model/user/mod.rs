use std::fmt::Display;
use std::ops::{Deref, DerefMut};

use argon2::Config as Argon2Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    model::{api::SignupRequest, mobile::Mobile, mongodb::Id},
};

/// A user is either an ordinary voter or the single system administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Voter,
    Admin,
}

impl Default for Role {
    fn default() -> Self {
        Self::Voter
    }
}

impl Display for Role {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Admin => "admin",
            }
        )
    }
}

/// Core user data, as stored in the database.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCore {
    pub name: String,
    pub age: u8,
    pub email: String,
    pub mobile: Mobile,
    pub address: String,
    /// The national identity number the user registers and logs in with.
    pub national_id: String,
    pub password_hash: String,
    pub role: Role,
    /// Flips false to true exactly once, when the user casts their vote.
    pub has_voted: bool,
    /// Session revocation counter: tokens carry the value current at issue
    /// time and stop validating once it moves on.
    pub token_version: u32,
    pub profile_picture: Option<String>,
}

impl UserCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        // Unwrap safe because the only way to create a UserCore is via
        // From<SignupRequest>, so the hash is always well-formed.
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap()
    }

    /// Check that this user may cast a vote right now.
    pub fn ensure_can_vote(&self) -> Result<(), Error> {
        if self.role == Role::Admin {
            return Err(Error::Forbidden("Admin is not allowed to vote".to_string()));
        }
        if self.has_voted {
            return Err(Error::Conflict("You have already voted".to_string()));
        }
        Ok(())
    }
}

impl From<SignupRequest> for UserCore {
    /// Convert a [`SignupRequest`] to a new [`UserCore`] by hashing the
    /// password. The plaintext is never stored.
    fn from(request: SignupRequest) -> Self {
        Self {
            name: request.name,
            age: request.age,
            email: request.email,
            mobile: request.mobile,
            address: request.address,
            national_id: request.national_id,
            password_hash: hash_password(&request.password),
            role: request.role,
            has_voted: false,
            token_version: 0,
            profile_picture: request.profile_picture,
        }
    }
}

/// A user without an ID.
pub type NewUser = UserCore;

/// A user from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}

/// The client-facing projection of a user. The password hash and the
/// session revocation counter never leave the server.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub age: u8,
    pub email: String,
    pub mobile: Mobile,
    pub address: String,
    pub national_id: String,
    pub role: Role,
    pub has_voted: bool,
    pub profile_picture: Option<String>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name.clone(),
            age: user.age,
            email: user.email.clone(),
            mobile: user.mobile.clone(),
            address: user.address.clone(),
            national_id: user.national_id.clone(),
            role: user.role,
            has_voted: user.has_voted,
            profile_picture: user.profile_picture.clone(),
        }
    }
}

/// Hash a password for storage.
pub fn hash_password(password: &str) -> String {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    argon2::hash_encoded(password.as_bytes(), &salt, &Argon2Config::default()).unwrap()
    // Safe because the default `Config` is valid.
}

/// The password complexity policy applied wherever a new password is
/// chosen: at least 8 characters with upper case, lower case, digit and
/// symbol.
pub fn validate_password_strength(password: &str) -> Result<(), Error> {
    let long_enough = password.chars().count() >= 8;
    let upper = password.chars().any(char::is_uppercase);
    let lower = password.chars().any(char::is_lowercase);
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let symbol = password.chars().any(|c| !c.is_alphanumeric());
    if long_enough && upper && lower && digit && symbol {
        Ok(())
    } else {
        Err(Error::Validation(
            "Password must be at least 8 characters long and contain at least one \
             uppercase letter, one lowercase letter, one number, and one special character."
                .to_string(),
        ))
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl UserCore {
        pub fn example() -> Self {
            Self {
                name: "Aarav Sharma".to_string(),
                age: 30,
                email: "aarav@example.com".to_string(),
                mobile: "+447700900123".parse().unwrap(),
                address: "12 Rose Lane".to_string(),
                national_id: "123412341234".to_string(),
                password_hash: hash_password("Sample@123"),
                role: Role::Voter,
                has_voted: false,
                token_version: 0,
                profile_picture: None,
            }
        }

        pub fn example_admin() -> Self {
            Self {
                name: "Priya Verma".to_string(),
                email: "priya@example.com".to_string(),
                mobile: "+447700900456".parse().unwrap(),
                national_id: "432143214321".to_string(),
                role: Role::Admin,
                ..Self::example()
            }
        }
    }

    impl User {
        pub fn example() -> Self {
            Self {
                id: mongodb::bson::oid::ObjectId::new().into(),
                user: UserCore::example(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hashing_round_trips() {
        let user = UserCore::example();
        assert!(user.verify_password("Sample@123"));
        assert!(!user.verify_password("Sample@124"));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("Sample@123"), hash_password("Sample@123"));
    }

    #[test]
    fn strength_policy_accepts_compliant_passwords() {
        assert!(validate_password_strength("Sample@123").is_ok());
        assert!(validate_password_strength("aB3$efgh").is_ok());
    }

    #[test]
    fn strength_policy_rejects_weak_passwords() {
        // Too short.
        assert!(validate_password_strength("aB3$efg").is_err());
        // No upper case.
        assert!(validate_password_strength("sample@123").is_err());
        // No lower case.
        assert!(validate_password_strength("SAMPLE@123").is_err());
        // No digit.
        assert!(validate_password_strength("Sample@abc").is_err());
        // No symbol.
        assert!(validate_password_strength("Sample1234").is_err());
    }

    #[test]
    fn voters_who_have_not_voted_may_vote() {
        let user = UserCore::example();
        assert!(user.ensure_can_vote().is_ok());
    }

    #[test]
    fn admins_may_not_vote() {
        let admin = UserCore::example_admin();
        assert!(matches!(
            admin.ensure_can_vote(),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn voting_twice_is_rejected() {
        let user = UserCore {
            has_voted: true,
            ..UserCore::example()
        };
        assert!(matches!(user.ensure_can_vote(), Err(Error::Conflict(_))));
    }

    #[test]
    fn roles_serialize_as_lowercase_strings() {
        let json = rocket::serde::json::serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!("\"admin\"", json);
        let role: Role = rocket::serde::json::serde_json::from_str("\"voter\"").unwrap();
        assert_eq!(Role::Voter, role);
    }
}
