use aws_sdk_sns::Client as SnsClient;
use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    tokio, Route, State,
};
use validator::Validate;

use crate::{
    cache::{user_key, Cache},
    error::{Error, Result},
    model::{
        api::{ApiResponse, LoginRequest, SignupRequest},
        auth::{AuthToken, Session, AUTH_TOKEN_COOKIE},
        mongodb::{Coll, Id},
        user::{NewUser, Role, User, UserView},
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![signup, login, logout]
}

#[cfg_attr(test, allow(unused_variables))]
#[post("/signup", data = "<request>", format = "json")]
pub async fn signup(
    request: Json<SignupRequest>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
    sender: &State<SnsClient>,
) -> Result<Json<ApiResponse<UserView>>> {
    let request = request.into_inner();
    request.validate()?;

    // Identity collision and single-admin checks run concurrently; the
    // unique indexes back them up under concurrent registrations.
    let with_identity = doc! {
        "$or": [
            { "national_id": &request.national_id },
            { "email": &request.email },
            { "mobile": request.mobile.clone() },
        ],
    };
    let (existing, existing_admin) = tokio::join!(
        users.find_one(with_identity, None),
        users.find_one(doc! { "role": "admin" }, None),
    );
    if existing?.is_some() {
        return Err(Error::Conflict(
            "User with the same national ID, email or mobile number already exists".to_string(),
        ));
    }
    if request.role == Role::Admin && existing_admin?.is_some() {
        return Err(Error::Conflict("Admin already exists".to_string()));
    }

    let name = request.name.clone();
    let mobile = request.mobile.clone();

    // The password is hashed on the way in; the plaintext is dropped here.
    let user = NewUser::from(request);
    let new_id: Id = new_users
        .insert_one(&user, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the database.
        .into();
    let user = User { id: new_id, user };

    // Welcome SMS. The account exists at this point; a delivery failure is
    // surfaced rather than swallowed.
    #[cfg(not(test))]
    sender
        .publish()
        .phone_number(mobile.to_string())
        .message(format!(
            "Hi {name}, welcome! Your registration is successful."
        ))
        .send()
        .await
        .map_err(|err| {
            warn!("Welcome SMS failed: {err}");
            Error::Dependency("Failed to send welcome SMS".to_string())
        })?;

    Ok(Json(ApiResponse::new(
        Status::Created,
        "User registered successfully",
        UserView::from(&user),
    )))
}

#[post("/login", data = "<credentials>", format = "json")]
pub async fn login(
    cookies: &CookieJar<'_>,
    credentials: Json<LoginRequest>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<ApiResponse<String>>> {
    // One generic failure for both unknown ID and wrong password, so the
    // response does not reveal which accounts exist.
    let user = users
        .find_one(doc! { "national_id": &credentials.national_id }, None)
        .await?
        .filter(|user| user.verify_password(&credentials.password))
        .ok_or_else(|| Error::Unauthenticated("Invalid national ID or password".to_string()))?;

    let cookie = AuthToken::for_user(&user).into_cookie(config);
    let token = cookie.value().to_string();
    cookies.add(cookie);

    Ok(Json(ApiResponse::ok("Login successful", token)))
}

#[post("/logout")]
pub async fn logout(
    session: Session,
    users: Coll<User>,
    cache: Cache,
    cookies: &CookieJar<'_>,
) -> Result<Json<ApiResponse<()>>> {
    // Bump the revocation counter so outstanding tokens die server-side,
    // then clear the cookie.
    users
        .update_one(
            session.user.id.as_doc(),
            doc! { "$inc": { "token_version": 1 } },
            None,
        )
        .await?;
    cache.invalidate(&[&user_key(session.user.id)]).await;
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));

    Ok(Json(ApiResponse::message(Status::Ok, "Logout successful")))
}
