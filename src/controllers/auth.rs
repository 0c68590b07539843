use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_sessions::Session;

use crate::auth::{self, AdminUser, ClientUser};
use crate::config::Config;
use crate::errors::Error;
use crate::models::{Role, User};
use crate::state::DBPool;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    login_id: String,
    password: String,
}

async fn login(
    pool: &DBPool,
    session: &Session,
    form: &LoginForm,
    role: Role,
) -> Result<Json<User>, Error> {
    let user = auth::authenticate(pool, form.login_id.trim(), &form.password, role).await?;
    auth::login(session, &user).await?;
    Ok(Json(user))
}

pub async fn admin_login(
    State(pool): State<DBPool>,
    session: Session,
    Json(form): Json<LoginForm>,
) -> Result<Json<User>, Error> {
    login(&pool, &session, &form, Role::Admin).await
}

pub async fn client_login(
    State(pool): State<DBPool>,
    session: Session,
    Json(form): Json<LoginForm>,
) -> Result<Json<User>, Error> {
    login(&pool, &session, &form, Role::Client).await
}

pub async fn logout(session: Session) -> Result<StatusCode, Error> {
    auth::logout(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_me(AdminUser(user): AdminUser) -> Json<User> {
    Json(user)
}

pub async fn client_me(ClientUser(user): ClientUser) -> Json<User> {
    Json(user)
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    password: String,
    confirmation: String,
}

pub async fn change_password(
    AdminUser(admin): AdminUser,
    State(pool): State<DBPool>,
    Json(form): Json<PasswordForm>,
) -> Result<StatusCode, Error> {
    auth::change_password(&pool, admin.id, &form.password, &form.confirmation).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordForm {
    login_id: String,
}

/// Always answers the same way so the response does not reveal which logins exist.
pub async fn forgot_password(
    State(pool): State<DBPool>,
    State(config): State<Arc<Config>>,
    Json(form): Json<ForgotPasswordForm>,
) -> Result<(StatusCode, Json<Value>), Error> {
    auth::request_password_reset(&pool, &config, form.login_id.trim()).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "if the account exists, a reset link has been issued",
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    token: String,
    password: String,
    confirmation: String,
}

pub async fn reset_password(
    State(pool): State<DBPool>,
    Json(form): Json<ResetPasswordForm>,
) -> Result<StatusCode, Error> {
    auth::reset_password(&pool, form.token.trim(), &form.password, &form.confirmation).await?;
    Ok(StatusCode::NO_CONTENT)
}
