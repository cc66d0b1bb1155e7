use crate::app::{ApiError, SharedState};
use crate::mailer::generate_reset_token;
use crate::store::{NewUser, PublicUser, Role, User};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session";

const RESET_TOKEN_TTL_MINUTES: i64 = 60;

/// Longest session lifetime; longer requests are cut to this.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
const FORGOT_PASSWORD_MESSAGE: &str = "If the email exists, a reset link will be sent";

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    /// Id of the authenticated user
    pub user_id: u64,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// In-memory session table keyed by session id.
///
/// Sessions do not survive a restart.
pub struct Sessions {
    ttl: Duration,
    entries: RwLock<HashMap<String, Session>>,
}

impl Sessions {
    pub fn new(ttl: Duration) -> Self {
        Sessions {
            ttl: ttl.min(MAX_SESSION_TTL),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new user session
    ///
    /// Sessions that have already expired are swept out first.
    ///
    /// # Arguments
    /// * `user_id` - The user to create a session for
    ///
    /// # Returns
    /// * `String` - A unique session ID
    pub fn create(&self, user_id: u64) -> String {
        let session_id = Uuid::new_v4().to_string();
        let now = SystemTime::now();
        let session = Session {
            user_id,
            expires_at: now.checked_add(self.ttl).unwrap_or(now + MAX_SESSION_TTL),
        };
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, session| session.expires_at > now);
        entries.insert(session_id.clone(), session);
        session_id
    }

    /// Validate a user session
    ///
    /// Expired sessions are dropped on sight.
    ///
    /// # Returns
    /// * `Option<u64>` - The user id if the session is valid
    pub fn validate(&self, session_id: &str) -> Option<u64> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.get(session_id) {
            Some(session) if session.expires_at > SystemTime::now() => Some(session.user_id),
            Some(_) => {
                entries.remove(session_id);
                None
            }
            None => None,
        }
    }

    pub fn remove(&self, session_id: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
    }

    /// Ends every session of one user.
    pub fn remove_user(&self, user_id: u64) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, session| session.user_id != user_id);
    }
}

/// The authenticated user, placed in request extensions by [`require_auth`].
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Hash a password using Argon2
///
/// # Arguments
/// * `password` - The plaintext password to hash
///
/// # Returns
/// * `Result<String, String>` - The password hash or an error
///
/// # Errors
/// * Returns an error if the password hashing fails
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err("Password hashing failed".to_string()),
    }
}

/// Verify a password against a stored hash
///
/// # Arguments
/// * `password` - The plaintext password to verify
/// * `hash` - The stored password hash to check against
///
/// # Returns
/// * `Result<bool, String>` - True if the password matches, false if not, or an error
///
/// # Errors
/// * Returns an error if the hash is in an invalid format
pub fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => return Err("Invalid password hash format".to_string()),
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Checks a registration request before anything is stored.
///
/// # Errors
/// * A message naming the first field that is missing or malformed
pub fn validate_registration(request: &RegisterRequest) -> Result<(), String> {
    if request.username.trim().is_empty() || request.email.trim().is_empty() || request.password.is_empty() {
        return Err("Username, email and password are required".to_string());
    }
    if !EMAIL.is_match(&request.email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn authenticate(state: &SharedState, jar: &CookieJar) -> Option<User> {
    let session_id = jar.get(SESSION_COOKIE)?;
    let user_id = state.sessions.validate(session_id.value())?;
    state.store.get_user(user_id).filter(|user| user.is_active)
}

/// Authentication middleware
///
/// Resolves the session cookie to an active user and stores it in the
/// request extensions as [`CurrentUser`].
///
/// # Returns
/// * `Response` - The inner response, or 401 when there is no valid session
pub async fn require_auth(
    State(state): State<SharedState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, &jar) {
        Some(user) => {
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        None => ApiError::Unauthorized("Authentication required".to_string()).into_response(),
    }
}

/// Like [`require_auth`] but only lets administrators through.
///
/// # Returns
/// * `Response` - The inner response, or 403 for anyone else
pub async fn require_admin(
    State(state): State<SharedState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, &jar) {
        Some(user) if user.is_admin() => {
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        _ => ApiError::Forbidden("Admin access required".to_string()).into_response(),
    }
}

/// Handle user registration
///
/// Creates the account and logs it in right away.
///
/// # Returns
/// * 201 with the new user and a session cookie
///
/// # Errors
/// * 400 if a field is missing, the email is malformed or already taken,
///   or the username is taken
pub async fn handle_register(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<PublicUser>), ApiError> {
    validate_registration(&request).map_err(ApiError::BadRequest)?;

    if state.store.get_user_by_username(&request.username).is_some() {
        return Err(ApiError::BadRequest("Username already exists".to_string()));
    }
    if state.store.get_user_by_email(&request.email).is_some() {
        return Err(ApiError::BadRequest("Email already exists".to_string()));
    }

    let password_hash = hash_password(&request.password).map_err(ApiError::Internal)?;
    let role = if state.config.is_admin_username(&request.username) {
        Role::Admin
    } else {
        Role::User
    };

    let user = state.store.create_user(NewUser {
        username: request.username,
        email: request.email,
        password_hash,
        full_name: request.full_name,
        role,
    })?;
    log::info!("registered user {} ({})", user.username, user.id);

    let session_id = state.sessions.create(user.id);
    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(session_id)),
        Json(PublicUser::from(&user)),
    ))
}

/// Handle user login
///
/// # Errors
/// * 401 if the credentials are wrong or the account is deactivated
pub async fn handle_login(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(credentials): Json<LoginRequest>,
) -> Result<(CookieJar, Json<PublicUser>), ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid username or password".to_string());

    let user = state
        .store
        .get_user_by_username(&credentials.username)
        .filter(|user| user.is_active)
        .ok_or_else(invalid)?;

    if !verify_password(&credentials.password, &user.password_hash).map_err(ApiError::Internal)? {
        return Err(invalid());
    }

    let session_id = state.sessions.create(user.id);
    log::debug!("user {} logged in", user.username);
    Ok((jar.add(session_cookie(session_id)), Json(PublicUser::from(&user))))
}

/// Handle user logout
///
/// Ends the session named by the cookie, if any, and clears the cookie.
pub async fn handle_logout(State(state): State<SharedState>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    let cleared = Cookie::build(SESSION_COOKIE).path("/").build();
    (jar.remove(cleared), Json(json!({ "message": "Logged out successfully" })))
}

pub async fn current_user(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

/// Handle a forgotten password
///
/// Records a reset token valid for one hour and mails it. Without a mail
/// relay the token is written to the log instead. The reply is the same
/// whether or not the address belongs to an account.
pub async fn handle_forgot_password(
    State(state): State<SharedState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    let reply = Json(json!({ "message": FORGOT_PASSWORD_MESSAGE }));

    let Some(user) = state
        .store
        .get_user_by_email(&request.email)
        .filter(|user| user.is_active)
    else {
        return Ok(reply);
    };

    let token = generate_reset_token();
    let expires_at = Utc::now() + chrono::Duration::minutes(RESET_TOKEN_TTL_MINUTES);
    state.store.create_password_reset(user.id, token.clone(), expires_at)?;

    match state.mailer.clone() {
        Some(mailer) => {
            let email = user.email.clone();
            let sent = tokio::task::spawn_blocking(move || {
                mailer
                    .send_password_reset(&email, &token)
                    .map_err(|e| e.to_string())
            })
            .await;
            match sent {
                Ok(Ok(())) => log::info!("sent password reset mail to user {}", user.id),
                Ok(Err(e)) => log::error!("failed to send password reset mail: {}", e),
                Err(e) => log::error!("password reset mail task failed: {}", e),
            }
        }
        None => log::info!("password reset token for {}: {}", user.email, token),
    }

    Ok(reply)
}

/// Handle a password reset
///
/// # Errors
/// * 400 if the token is unknown, already used or expired
pub async fn handle_reset_password(
    State(state): State<SharedState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.new_password.is_empty() {
        return Err(ApiError::BadRequest("New password is required".to_string()));
    }

    // claiming first means a token can change the password at most once
    let reset = state
        .store
        .claim_password_reset(&request.token, Utc::now())?
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired reset token".to_string()))?;

    let password_hash = hash_password(&request.new_password).map_err(ApiError::Internal)?;
    state.store.update_password(reset.user_id, password_hash)?;
    state.sessions.remove_user(reset.user_id);
    log::info!("password reset for user {}", reset.user_id);

    Ok(Json(json!({ "message": "Password reset successfully" })))
}
