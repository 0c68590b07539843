use std::sync::OnceLock;

use anyhow::anyhow;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task;
use tower_sessions::Session;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::datasource::repository::{password_resets, users};
use crate::errors::Error;
use crate::models::{Role, User};
use crate::state::DBPool;

const SESSION_USER_KEY: &str = "portal.user";
const MIN_PASSWORD_LENGTH: usize = 8;

/// What the session cookie remembers about the signed in user.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub role: Role,
}

fn hash_blocking(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(anyhow!("failed to hash password: {e}")))
}

fn verify_blocking(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Hashes on the blocking pool so argon2 never stalls the request workers.
pub async fn hash_password(password: &str) -> Result<String, Error> {
    let password = password.to_owned();
    task::spawn_blocking(move || hash_blocking(&password))
        .await
        .map_err(|e| Error::Internal(anyhow!("password hashing task failed: {e}")))?
}

/// Checks `password` against a PHC string on the blocking pool. Malformed hashes never verify.
pub async fn verify_password(password: &str, hash: &str) -> bool {
    let (password, hash) = (password.to_owned(), hash.to_owned());
    match task::spawn_blocking(move || verify_blocking(&password, &hash)).await {
        Ok(verified) => verified,
        Err(err) => {
            warn!("password verification task failed: {err}");
            false
        }
    }
}

/// A hash of a random secret, checked when there is no real hash so every login costs the same.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_blocking(&random_token()).unwrap_or_default())
}

/// Checks a login attempt. Without a stored hash the dummy is verified and the attempt fails.
async fn verify_login(password: &str, stored: Option<&str>) -> bool {
    if let Some(stored) = stored {
        return verify_password(password, stored).await;
    }
    let password = password.to_owned();
    let checked = task::spawn_blocking(move || verify_blocking(&password, dummy_hash())).await;
    if let Err(err) = checked {
        warn!("password verification task failed: {err}");
    }
    false
}

/// An unguessable, url safe token.
pub fn random_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), Error> {
    if password.trim().is_empty() {
        return Err(Error::validation("password must not be empty"));
    }
    if password != confirmation {
        return Err(Error::validation("passwords do not match"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Verifies credentials for a user of the given role and records the login.
///
/// Unknown logins, wrong roles, missing hashes and wrong passwords all fail the same way.
#[instrument(skip(pool, password))]
pub async fn authenticate(
    pool: &DBPool,
    login_id: &str,
    password: &str,
    role: Role,
) -> Result<User, Error> {
    let credentials = users::find_credentials(pool, login_id, role).await?;
    let stored = credentials.as_ref().and_then(|c| c.password_hash.as_deref());
    let verified = verify_login(password, stored).await;
    let Some(credentials) = credentials.filter(|_| verified) else {
        debug!("{role:?} login rejected");
        return Err(Error::InvalidCredentials);
    };

    let now = Utc::now();
    users::touch_last_login(pool, credentials.user.id, &now).await?;
    Ok(User {
        last_login: Some(now),
        ..credentials.user
    })
}

pub async fn login(session: &Session, user: &User) -> Result<(), Error> {
    session.cycle_id().await?;
    session
        .insert(
            SESSION_USER_KEY,
            SessionUser {
                id: user.id,
                role: user.role,
            },
        )
        .await?;
    Ok(())
}

pub async fn logout(session: &Session) -> Result<(), Error> {
    session.flush().await?;
    Ok(())
}

#[instrument(skip(pool, password, confirmation))]
pub async fn change_password(
    pool: &DBPool,
    user_id: Uuid,
    password: &str,
    confirmation: &str,
) -> Result<(), Error> {
    validate_new_password(password, confirmation)?;
    let hash = hash_password(password).await?;
    users::set_password_hash(pool, user_id, &hash).await?;
    info!("password changed");
    Ok(())
}

/// Stores a reset token for the named admin and returns it. Unknown logins yield `None`.
#[instrument(skip(pool, config))]
pub async fn request_password_reset(
    pool: &DBPool,
    config: &Config,
    login_id: &str,
) -> Result<Option<String>, Error> {
    let Some(admin) = users::find_by_login(pool, login_id, Role::Admin).await? else {
        debug!("password reset requested for unknown admin");
        return Ok(None);
    };
    let token = random_token();
    let expires_at = Utc::now() + config.reset_token_ttl();
    password_resets::insert(pool, &token, admin.id, &expires_at).await?;
    // there is no mail transport; the operator reads the link from the log
    info!(
        "password reset token for {} issued, valid until {expires_at}: {token}",
        admin.login_id
    );
    Ok(Some(token))
}

/// Consumes the reset token and sets the new password for the admin it was issued to.
#[instrument(skip_all)]
pub async fn reset_password(
    pool: &DBPool,
    token: &str,
    password: &str,
    confirmation: &str,
) -> Result<(), Error> {
    validate_new_password(password, confirmation)?;
    let hash = hash_password(password).await?;

    let mut tx = pool.begin().await?;
    let Some(user_id) = password_resets::consume(&mut *tx, token, &Utc::now()).await? else {
        return Err(Error::validation("invalid or expired reset token"));
    };
    users::set_password_hash(&mut *tx, user_id, &hash).await?;
    password_resets::delete_for_user(&mut *tx, user_id).await?;
    tx.commit().await?;
    info!("password reset for user {user_id}");
    Ok(())
}

/// Seeds an admin account when none exists yet.
pub async fn ensure_default_admin(pool: &DBPool, config: &Config) -> Result<(), Error> {
    if users::has_role(pool, Role::Admin).await? {
        return Ok(());
    }
    let password = match &config.default_admin_password {
        Some(password) => password.clone(),
        None => {
            let generated: String = random_token().chars().take(16).collect();
            warn!(
                "no default admin password configured, generated one for {}: {generated}",
                config.default_admin_login
            );
            generated
        }
    };
    let hash = hash_password(&password).await?;
    users::insert(
        pool,
        &users::NewUser {
            external_id: None,
            login_id: &config.default_admin_login,
            display_name: None,
            password_hash: Some(&hash),
            role: Role::Admin,
        },
    )
    .await?;
    info!("created default admin {}", config.default_admin_login);
    Ok(())
}

async fn session_user<S>(parts: &mut Parts, state: &S) -> Result<User, Error>
where
    DBPool: FromRef<S>,
    S: Send + Sync,
{
    let session = Session::from_request_parts(parts, state)
        .await
        .map_err(|(_, message)| Error::Internal(anyhow!(message)))?;
    let Some(session_user) = session.get::<SessionUser>(SESSION_USER_KEY).await? else {
        return Err(Error::Unauthenticated);
    };
    let pool = DBPool::from_ref(state);
    match users::find_by_id(&pool, session_user.id).await? {
        Some(user) if user.role == session_user.role => Ok(user),
        _ => {
            // account removed or changed since the session was created
            session.flush().await?;
            Err(Error::Unauthenticated)
        }
    }
}

/// A signed in administrator.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    DBPool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = session_user(parts, state).await?;
        match user.role {
            Role::Admin => Ok(Self(user)),
            Role::Client => Err(Error::Forbidden),
        }
    }
}

/// A signed in client. Administrators are refused.
#[derive(Debug, Clone)]
pub struct ClientUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for ClientUser
where
    DBPool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = session_user(parts, state).await?;
        match user.role {
            Role::Client => Ok(Self(user)),
            Role::Admin => Err(Error::Forbidden),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hash = hash_password("correct horse").await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash).await);
        assert!(!verify_password("battery staple", &hash).await);
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let a = hash_password("same password").await.unwrap();
        let b = hash_password("same password").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not a phc string").await);
        assert!(!verify_password("", "").await);
    }

    #[tokio::test]
    async fn test_missing_accounts_are_checked_against_a_real_hash() {
        let dummy = dummy_hash();
        assert!(dummy.starts_with("$argon2id$"));
        assert!(PasswordHash::new(dummy).is_ok());
        assert!(!verify_login("whatever", None).await);

        let real = hash_password("correct horse").await.unwrap();
        assert!(verify_login("correct horse", Some(&real)).await);
        assert!(!verify_login("battery staple", Some(&real)).await);
    }

    #[tokio::test]
    async fn test_missing_accounts_cost_a_full_verification() {
        let real = hash_password("correct horse").await.unwrap();
        // built once up front so the timing below only covers verification
        dummy_hash();
        let time = |stored: Option<String>| async move {
            let started = std::time::Instant::now();
            for _ in 0..3 {
                assert!(!verify_login("wrong guess", stored.as_deref()).await);
            }
            started.elapsed()
        };
        let known = time(Some(real)).await;
        let unknown = time(None).await;
        assert!(unknown * 4 > known, "{unknown:?} vs {known:?}");
    }

    #[test]
    fn test_validate_new_password() {
        assert!(validate_new_password("longenough", "longenough").is_ok());
        assert!(matches!(
            validate_new_password("   ", "   "),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate_new_password("longenough", "different"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate_new_password("short", "short"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_random_tokens() {
        let a = random_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, random_token());
    }
}
