//! Authentication Module
//!
//! Handles signup, login, session management and the profile-completion
//! funnel. Email verification tokens live in [`verification`].

pub mod handlers;
pub mod middleware;
pub mod verification;

use crate::core::config::ServerConfig;
use crate::core::db::parse_timestamp;
use crate::core::error::{StoreError, StoreResult};
use crate::core::mail::{verification_link, VerificationMailer};
use crate::core::models::{ProfileState, UserId, UserInfo};
use bcrypt::{hash, verify};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;
use verification::VerificationLedger;

const MAX_BIOGRAPHY_LEN: usize = 150;
const MIN_INTERESTS: usize = 5;

/// Session token for authenticated requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// One page of the profile-completion funnel, submitted in order.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ProfileStep {
    #[serde(rename_all = "camelCase")]
    Basics {
        age: u8,
        gender: String,
        sexual_preference: String,
        biography: String,
    },
    Interests {
        interests: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Picture {
        profile_picture: String,
    },
}

impl ProfileStep {
    /// Zero-based position of this step in the funnel.
    pub fn index(&self) -> u8 {
        match self {
            ProfileStep::Basics { .. } => 0,
            ProfileStep::Interests { .. } => 1,
            ProfileStep::Picture { .. } => 2,
        }
    }

    fn validate(&self) -> StoreResult<()> {
        match self {
            ProfileStep::Basics { age, biography, .. } => {
                if !(18..=120).contains(age) {
                    return Err(StoreError::Invalid("invalid age".to_string()));
                }
                if biography.chars().count() > MAX_BIOGRAPHY_LEN {
                    return Err(StoreError::Invalid(format!(
                        "biography must be no more than {} characters",
                        MAX_BIOGRAPHY_LEN
                    )));
                }
            }
            ProfileStep::Interests { interests } => {
                let distinct: BTreeSet<&str> = interests
                    .iter()
                    .map(|tag| tag.trim())
                    .filter(|tag| !tag.is_empty())
                    .collect();
                if distinct.len() < MIN_INTERESTS {
                    return Err(StoreError::Invalid(format!(
                        "at least {} interests are required",
                        MIN_INTERESTS
                    )));
                }
            }
            ProfileStep::Picture { profile_picture } => {
                if profile_picture.trim().is_empty() {
                    return Err(StoreError::Invalid("profile picture is required".to_string()));
                }
            }
        }
        Ok(())
    }
}

type UserRow = (i64, String, String, String, String, bool, String, i64, String);

const USER_COLUMNS: &str = "id, email, username, first_name, last_name, is_verified, profile_state, profile_step, created_at";

fn user_from_row(row: UserRow) -> StoreResult<UserInfo> {
    let (id, email, username, first_name, last_name, is_verified, state, step, created_at) = row;
    Ok(UserInfo {
        id: UserId(id),
        email,
        username,
        first_name,
        last_name,
        is_verified,
        profile: ProfileState::from_columns(&state, step),
        created_at: parse_timestamp(&created_at)?,
    })
}

fn conflict_on_unique(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{} already registered", what))
        }
        _ => StoreError::Unavailable(err),
    }
}

/// Auth manager handles accounts and sessions
pub struct AuthManager {
    pool: SqlitePool,
    mailer: Arc<dyn VerificationMailer>,
    verify_url: String,
    session_ttl: chrono::Duration,
    bcrypt_cost: u32,
    /// In-memory session cache
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthManager {
    pub fn new(pool: SqlitePool, config: &ServerConfig, mailer: Arc<dyn VerificationMailer>) -> Self {
        Self {
            pool,
            mailer,
            verify_url: config.verify_url.clone(),
            session_ttl: config.session_ttl,
            bcrypt_cost: config.bcrypt_cost,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new, unverified user and issue its verification token.
    pub async fn signup(&self, account: NewAccount) -> StoreResult<UserInfo> {
        let existing: Option<(String, String)> =
            sqlx::query_as("SELECT username, email FROM users WHERE username = ? OR email = ?")
                .bind(&account.username)
                .bind(&account.email)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((_, email)) = existing {
            let field = if email == account.email { "email" } else { "username" };
            return Err(StoreError::Conflict(format!("{} already registered", field)));
        }

        let password_hash = hash(&account.password, self.bcrypt_cost)
            .map_err(|e| StoreError::Invalid(format!("unusable password: {}", e)))?;
        let created_at = Utc::now();
        let token = VerificationLedger::new_token();
        let (state, step) = ProfileState::Unverified.to_columns();

        // User row and its token commit together or not at all
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO users (email, username, first_name, last_name, password_hash, profile_state, profile_step, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.email)
        .bind(&account.username)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&password_hash)
        .bind(state)
        .bind(step)
        .bind(created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "email or username"))?;

        let user_id = UserId(result.last_insert_rowid());
        VerificationLedger::issue(&mut tx, user_id, &token).await?;
        tx.commit().await?;

        info!("[Auth] User registered: {} ({})", account.username, user_id);

        let link = verification_link(&self.verify_url, &token);
        if let Err(e) = self.mailer.send_verification(&account.email, &link).await {
            warn!("[Auth] Verification mail to {} failed: {}", account.email, e);
        }

        Ok(UserInfo {
            id: user_id,
            email: account.email,
            username: account.username,
            first_name: account.first_name,
            last_name: account.last_name,
            is_verified: false,
            profile: ProfileState::Unverified,
            created_at,
        })
    }

    /// Login user and create session. Bad credentials are reported as
    /// `NotFound` without saying which part was wrong.
    pub async fn login(&self, email: &str, password: &str) -> StoreResult<(UserInfo, Session)> {
        let row: Option<(String, UserRow)> = sqlx::query_as::<_, (String, i64, String, String, String, String, bool, String, i64, String)>(
            &format!("SELECT password_hash, {} FROM users WHERE email = ?", USER_COLUMNS),
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(|(password_hash, id, email, username, first, last, verified, state, step, created)| {
            (password_hash, (id, email, username, first, last, verified, state, step, created))
        });

        let invalid = || StoreError::NotFound("account".to_string());
        let (password_hash, user_row) = row.ok_or_else(invalid)?;

        if !verify(password, &password_hash).unwrap_or(false) {
            warn!("[Auth] Failed login attempt for {}", email);
            return Err(invalid());
        }

        let user = user_from_row(user_row)?;
        if !user.is_verified {
            return Err(StoreError::Forbidden("email not verified".to_string()));
        }

        let session = self.create_session(user.id).await?;
        info!("[Auth] User logged in: {}", user.username);
        Ok((user, session))
    }

    async fn create_session(&self, user_id: UserId) -> StoreResult<Session> {
        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id,
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        Ok(session)
    }

    /// Resolve a session token to its user. Used by the HTTP middleware and
    /// the socket handshake.
    pub async fn validate_session(&self, token: &str) -> StoreResult<UserId> {
        let now = Utc::now();
        let cached = self
            .sessions
            .read()
            .await
            .get(token)
            .map(|session| (session.user_id, session.expires_at));
        match cached {
            Some((user_id, expires_at)) if expires_at > now => return Ok(user_id),
            Some(_) => {
                self.sessions.write().await.remove(token);
            }
            None => {}
        }

        let row: Option<(UserId, String)> =
            sqlx::query_as("SELECT user_id, expires_at FROM sessions WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        let Some((user_id, expires_at)) = row else {
            return Err(StoreError::NotFound("session".to_string()));
        };
        let live = expires_at
            .parse::<DateTime<Utc>>()
            .map(|expires| expires > now)
            .unwrap_or(false);
        if !live {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            info!("[Auth] Expired session for user {} removed", user_id);
            return Err(StoreError::NotFound("session".to_string()));
        }
        Ok(user_id)
    }

    /// Logout user (invalidate session)
    pub async fn logout(&self, token: &str) -> StoreResult<()> {
        self.sessions.write().await.remove(token);

        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        info!("[Auth] Session invalidated");
        Ok(())
    }

    /// Get user by ID
    pub async fn get_user(&self, user_id: UserId) -> StoreResult<UserInfo> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(user_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound("user".to_string()))
    }

    /// Store one profile step and advance the funnel.
    pub async fn complete_profile(
        &self,
        user_id: UserId,
        step: ProfileStep,
    ) -> StoreResult<ProfileState> {
        step.validate()?;

        let mut tx = self.pool.begin().await?;

        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT profile_state, profile_step FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (state, current) = row.ok_or_else(|| StoreError::NotFound("user".to_string()))?;

        let expected = match ProfileState::from_columns(&state, current) {
            ProfileState::Unverified => {
                return Err(StoreError::Forbidden("email not verified".to_string()))
            }
            ProfileState::Complete => {
                return Err(StoreError::Forbidden("profile already completed".to_string()))
            }
            ProfileState::ProfileIncomplete { step } => step,
        };

        if step.index() != expected {
            return Err(StoreError::Invalid(format!(
                "expected profile step {}",
                expected + 1
            )));
        }

        match &step {
            ProfileStep::Basics {
                age,
                gender,
                sexual_preference,
                biography,
            } => {
                sqlx::query(
                    "UPDATE users SET age = ?, gender = ?, sexual_preference = ?, biography = ? WHERE id = ?",
                )
                .bind(*age as i64)
                .bind(gender)
                .bind(sexual_preference)
                .bind(biography)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            }
            ProfileStep::Interests { interests } => {
                sqlx::query("DELETE FROM interests WHERE user_id = ?")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
                for tag in interests.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
                    sqlx::query("INSERT OR IGNORE INTO interests (user_id, tag) VALUES (?, ?)")
                        .bind(user_id)
                        .bind(tag)
                        .execute(&mut *tx)
                        .await?;
                }
            }
            ProfileStep::Picture { profile_picture } => {
                sqlx::query("UPDATE users SET profile_picture = ? WHERE id = ?")
                    .bind(profile_picture)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let next = ProfileState::after_step(expected + 1);
        let (state, step_column) = next.to_columns();
        sqlx::query("UPDATE users SET profile_state = ?, profile_step = ? WHERE id = ?")
            .bind(state)
            .bind(step_column)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("[Auth] User {} profile now {:?}", user_id, next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db;
    use crate::core::mail::testing::RecordingMailer;
    use tempfile::TempDir;

    const TEST_BCRYPT_COST: u32 = 4;

    async fn setup() -> (TempDir, AuthManager, Arc<RecordingMailer>, VerificationLedger) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = ServerConfig::with_base_dir(temp_dir.path());
        config.bcrypt_cost = TEST_BCRYPT_COST;
        let pool = db::connect(&config).await.unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let auth = AuthManager::new(pool.clone(), &config, mailer.clone());
        (temp_dir, auth, mailer, VerificationLedger::new(pool))
    }

    fn account(name: &str) -> NewAccount {
        NewAccount {
            email: format!("{}@example.com", name),
            username: name.to_string(),
            first_name: "Jane".to_string(),
            last_name: "Smith".to_string(),
            password: "correct horse".to_string(),
        }
    }

    #[tokio::test]
    async fn test_signup_issues_token_and_blocks_login() {
        let (_dir, auth, mailer, ledger) = setup().await;
        let user = auth.signup(account("jane")).await.unwrap();
        assert_eq!(user.profile, ProfileState::Unverified);

        let refused = auth.login("jane@example.com", "correct horse").await;
        assert!(matches!(refused, Err(StoreError::Forbidden(_))));

        let token = mailer.last_token().unwrap();
        assert_eq!(ledger.consume(&token).await.unwrap(), user.id);

        let (logged_in, session) = auth.login("jane@example.com", "correct horse").await.unwrap();
        assert_eq!(logged_in.profile, ProfileState::ProfileIncomplete { step: 0 });
        assert_eq!(auth.validate_session(&session.token).await.unwrap(), user.id);

        auth.logout(&session.token).await.unwrap();
        assert!(auth.validate_session(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped_from_cache_and_db() {
        let (_dir, mut auth, mailer, ledger) = setup().await;
        auth.session_ttl = chrono::Duration::zero();
        auth.signup(account("kim")).await.unwrap();
        ledger.consume(&mailer.last_token().unwrap()).await.unwrap();

        let (_, session) = auth.login("kim@example.com", "correct horse").await.unwrap();
        assert!(auth.sessions.read().await.contains_key(&session.token));

        assert!(matches!(
            auth.validate_session(&session.token).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(auth.sessions.read().await.is_empty());
        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&auth.pool)
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn test_unreadable_created_at_is_reported() {
        let (_dir, auth, _mailer, _ledger) = setup().await;
        let user = auth.signup(account("lee")).await.unwrap();
        sqlx::query("UPDATE users SET created_at = '' WHERE id = ?")
            .bind(user.id)
            .execute(&auth.pool)
            .await
            .unwrap();

        assert!(matches!(
            auth.get_user(user.id).await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_signup_reports_conflicting_field() {
        let (_dir, auth, _mailer, _ledger) = setup().await;
        auth.signup(account("jane")).await.unwrap();

        let mut same_name = account("jane");
        same_name.email = "other@example.com".to_string();
        match auth.signup(same_name).await {
            Err(StoreError::Conflict(msg)) => assert!(msg.contains("username")),
            other => panic!("expected conflict, got {:?}", other.map(|u| u.id)),
        }
    }

    #[tokio::test]
    async fn test_profile_steps_in_order() {
        let (_dir, auth, mailer, ledger) = setup().await;
        let user = auth.signup(account("sam")).await.unwrap();

        let early = auth
            .complete_profile(
                user.id,
                ProfileStep::Picture {
                    profile_picture: "/imgs/sam.jpg".into(),
                },
            )
            .await;
        assert!(matches!(early, Err(StoreError::Forbidden(_))));

        ledger.consume(&mailer.last_token().unwrap()).await.unwrap();

        let skipped = auth
            .complete_profile(
                user.id,
                ProfileStep::Picture {
                    profile_picture: "/imgs/sam.jpg".into(),
                },
            )
            .await;
        assert!(matches!(skipped, Err(StoreError::Invalid(_))));

        let state = auth
            .complete_profile(
                user.id,
                ProfileStep::Basics {
                    age: 30,
                    gender: "male".into(),
                    sexual_preference: "female".into(),
                    biography: "hello".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(state, ProfileState::ProfileIncomplete { step: 1 });

        let interests = ["anime", "music", "travel", "books", "art"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        auth.complete_profile(user.id, ProfileStep::Interests { interests })
            .await
            .unwrap();

        let state = auth
            .complete_profile(
                user.id,
                ProfileStep::Picture {
                    profile_picture: "/imgs/sam.jpg".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(state, ProfileState::Complete);

        let again = auth
            .complete_profile(
                user.id,
                ProfileStep::Picture {
                    profile_picture: "/imgs/sam2.jpg".into(),
                },
            )
            .await;
        assert!(matches!(again, Err(StoreError::Forbidden(_))));
    }

    #[test]
    fn test_interests_need_five_distinct_tags() {
        let step = ProfileStep::Interests {
            interests: vec!["a".into(), "a".into(), "b".into(), "c".into(), "d".into()],
        };
        assert!(step.validate().is_err());
    }
}
