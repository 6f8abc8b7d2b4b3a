use mongodb::{
    bson::{doc, Document},
    options::{FindOneAndUpdateOptions, ReplaceOptions, ReturnDocument},
};
use rocket::{http::Status, serde::json::Json, Route, State};
use validator::Validate;

use crate::{
    cache::{user_key, Cache},
    error::{Error, Result},
    limiter::RateLimiter,
    model::{
        api::{
            ApiResponse, PasswordResetRequest, UpdatePasswordRequest, UpdateUserRequest,
        },
        auth::Session,
        mongodb::Coll,
        reset::{digest_reset_token, issue_reset_token, PasswordReset, PasswordResetCore},
        user::{hash_password, validate_password_strength, Role, User, UserView},
    },
    notify::Mailer,
    storage::MediaStore,
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![
        profile,
        update_user,
        update_password,
        request_password_reset,
        password_reset,
    ]
}

#[get("/profile")]
pub async fn profile(session: Session) -> Json<ApiResponse<UserView>> {
    // The session guard already loaded the user through the cache.
    Json(ApiResponse::ok(
        "User fetched successfully",
        UserView::from(&session.user),
    ))
}

#[put("/updateUser", data = "<patch>", format = "json")]
pub async fn update_user(
    session: Session,
    patch: Json<UpdateUserRequest>,
    users: Coll<User>,
    cache: Cache,
    media: &State<MediaStore>,
) -> Result<Json<ApiResponse<UserView>>> {
    let patch = patch.into_inner();

    // Password, voting flag and national ID have dedicated flows (or none
    // at all) and cannot be touched here.
    let immutable = patch.immutable_fields();
    if !immutable.is_empty() {
        return Err(Error::Validation(format!(
            "{} cannot be updated via this endpoint",
            immutable.join(", ")
        )));
    }
    patch.validate()?;

    // Escalating to admin is only possible while no admin exists.
    if patch.role == Some(Role::Admin) && session.user.role != Role::Admin {
        let existing_admin = users.find_one(doc! { "role": "admin" }, None).await?;
        if existing_admin.is_some() {
            return Err(Error::Conflict("Admin already exists".to_string()));
        }
    }

    // New email/mobile must not belong to a different user.
    if patch.email.is_some() || patch.mobile.is_some() {
        let mut identities = Vec::new();
        if let Some(email) = &patch.email {
            identities.push(doc! { "email": email });
        }
        if let Some(mobile) = &patch.mobile {
            identities.push(doc! { "mobile": mobile.clone() });
        }
        let clash = users
            .find_one(
                doc! { "$or": identities, "_id": { "$ne": *session.user.id } },
                None,
            )
            .await?;
        if clash.is_some() {
            return Err(Error::Conflict(
                "Email or mobile number already belongs to another user".to_string(),
            ));
        }
    }

    // Replacing the picture deletes the old object first; if that fails
    // the whole update is aborted rather than left inconsistent.
    if let Some(new_picture) = &patch.profile_picture {
        if let Some(old_picture) = &session.user.profile_picture {
            if old_picture != new_picture {
                media.delete_by_url(old_picture).await?;
            }
        }
    }

    let mut set = Document::new();
    if let Some(name) = &patch.name {
        set.insert("name", name.as_str());
    }
    if let Some(age) = patch.age {
        set.insert("age", i32::from(age));
    }
    if let Some(email) = &patch.email {
        set.insert("email", email.as_str());
    }
    if let Some(mobile) = &patch.mobile {
        set.insert("mobile", mobile.clone());
    }
    if let Some(address) = &patch.address {
        set.insert("address", address.as_str());
    }
    if let Some(picture) = &patch.profile_picture {
        set.insert("profile_picture", picture.as_str());
    }
    if let Some(role) = patch.role {
        set.insert("role", role.to_string());
    }
    if set.is_empty() {
        return Err(Error::Validation("No updatable fields provided".to_string()));
    }

    let updated = users
        .find_one_and_update(
            session.user.id.as_doc(),
            doc! { "$set": set },
            FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .await?
        .ok_or_else(|| Error::NotFound("User not found".to_string()))?;
    cache.invalidate(&[&user_key(session.user.id)]).await;

    Ok(Json(ApiResponse::ok(
        "User updated successfully",
        UserView::from(&updated),
    )))
}

#[put("/update-password", data = "<request>", format = "json")]
pub async fn update_password(
    session: Session,
    request: Json<UpdatePasswordRequest>,
    users: Coll<User>,
    cache: Cache,
) -> Result<Json<ApiResponse<()>>> {
    if !session.user.verify_password(&request.current_password) {
        return Err(Error::Unauthenticated("Invalid current password".to_string()));
    }
    validate_password_strength(&request.new_password)?;

    let hash = hash_password(&request.new_password);
    users
        .update_one(
            session.user.id.as_doc(),
            doc! { "$set": { "password_hash": hash } },
            None,
        )
        .await?;
    cache.invalidate(&[&user_key(session.user.id)]).await;

    Ok(Json(ApiResponse::message(Status::Ok, "Password updated")))
}

#[post("/request-password-reset")]
pub async fn request_password_reset(
    session: Session,
    resets: Coll<PasswordResetCore>,
    limiter: &State<RateLimiter>,
    mailer: &State<Mailer>,
    config: &State<Config>,
) -> Result<Json<ApiResponse<()>>> {
    let user = &session.user;

    if !limiter.check(&user.email) {
        return Err(Error::RateLimited(
            "Too many password reset requests for this email. Please try again after 10 minutes."
                .to_string(),
        ));
    }

    // Issuing a new token invalidates any outstanding one for this user.
    let (token, entry) = issue_reset_token(user.id, config);
    resets
        .replace_one(
            doc! { "user_id": *user.id },
            &entry,
            ReplaceOptions::builder().upsert(true).build(),
        )
        .await?;

    let reset_url = format!("{}/user/password-reset/{}", config.hostname(), token);
    mailer
        .send_reset_link(&user.email, &user.name, &reset_url)
        .await
        .map_err(|_| {
            Error::Dependency("Failed to send reset email. Please try again later.".to_string())
        })?;

    Ok(Json(ApiResponse::message(
        Status::Ok,
        "A password reset link has been sent to your email if the account exists.",
    )))
}

#[post("/password-reset", data = "<request>", format = "json")]
pub async fn password_reset(
    _session: Session,
    request: Json<PasswordResetRequest>,
    users: Coll<User>,
    resets: Coll<PasswordReset>,
    cache: Cache,
    mailer: &State<Mailer>,
) -> Result<Json<ApiResponse<()>>> {
    // Only the hash of the presented token is ever compared or stored.
    let hashed = digest_reset_token(&request.token);
    let entry = resets
        .find_one(doc! { "reset_token": &hashed }, None)
        .await?
        .ok_or_else(|| {
            Error::Validation(
                "Invalid or expired token. Please request a new password reset token".to_string(),
            )
        })?;
    entry.ensure_consumable(chrono::Utc::now())?;

    let user = users
        .find_one(entry.user_id.as_doc(), None)
        .await?
        .ok_or_else(|| {
            Error::NotFound("The user associated with this token was not found".to_string())
        })?;

    validate_password_strength(&request.password)?;
    if user.verify_password(&request.password) {
        return Err(Error::Validation(
            "The new password cannot be the same as your current password.".to_string(),
        ));
    }

    // Swap the hash and revoke every outstanding session in one update:
    // the owner has to log back in with the new password.
    let hash = hash_password(&request.password);
    users
        .update_one(
            user.id.as_doc(),
            doc! {
                "$set": { "password_hash": hash },
                "$inc": { "token_version": 1 },
            },
            None,
        )
        .await?;

    // The token is spent, successfully or not from here on.
    resets
        .update_one(entry.id.as_doc(), doc! { "$set": { "is_used": true } }, None)
        .await?;
    cache.invalidate(&[&user_key(user.id)]).await;

    mailer
        .send_reset_confirmation(&user.email)
        .await
        .map_err(|_| {
            Error::Dependency(
                "Password reset successful, but failed to send confirmation email.".to_string(),
            )
        })?;

    Ok(Json(ApiResponse::message(
        Status::Ok,
        "Password reset successful",
    )))
}
