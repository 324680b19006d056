//! End-to-end flows through the public API: presence and relay over the
//! hub, and token consumption through the ledger.

use async_trait::async_trait;
use chrono::Utc;
use matcha_server::build_state;
use matcha_server::chat::events::ServerEvent;
use matcha_server::chat::registry::Outbound;
use matcha_server::chat::relay::DeliveryOutcome;
use matcha_server::core::config::{AppState, ServerConfig};
use matcha_server::core::error::StoreError;
use matcha_server::core::mail::VerificationMailer;
use matcha_server::core::models::UserId;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

struct NullMailer;

#[async_trait]
impl VerificationMailer for NullMailer {
    async fn send_verification(&self, _email: &str, _link: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

async fn setup(verified: &[i64], pending: &[i64]) -> (TempDir, AppState) {
    let temp_dir = TempDir::new().unwrap();
    let state = build_state(
        ServerConfig::with_base_dir(temp_dir.path()),
        Arc::new(NullMailer),
    )
    .await
    .unwrap();

    let users = verified
        .iter()
        .map(|id| (*id, true))
        .chain(pending.iter().map(|id| (*id, false)));
    for (id, is_verified) in users {
        let (profile_state, profile_step) = if is_verified {
            ("complete", 0)
        } else {
            ("unverified", 0)
        };
        sqlx::query(
            "INSERT INTO users (id, email, username, first_name, last_name, password_hash, \
             is_verified, profile_state, profile_step, created_at) \
             VALUES (?, ?, ?, 'Test', 'User', 'x', ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(format!("user{}@example.com", id))
        .bind(format!("user{}", id))
        .bind(is_verified)
        .bind(profile_state)
        .bind(profile_step)
        .bind(Utc::now().to_rfc3339())
        .execute(&state.pool)
        .await
        .unwrap();
    }
    (temp_dir, state)
}

fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<ServerEvent> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|out| match out {
            Outbound::Event(event) => Some(event),
            Outbound::Close => None,
        })
        .collect()
}

fn last_presence(events: &[ServerEvent]) -> Option<Vec<UserId>> {
    events.iter().rev().find_map(|event| match event {
        ServerEvent::Presence { online } => Some(online.clone()),
        _ => None,
    })
}

#[tokio::test]
async fn test_two_users_chat_then_one_leaves() {
    let (_dir, state) = setup(&[7, 9], &[]).await;
    let hub = state.hub.clone();

    let (seven, mut rx7) = hub.connect(UserId(7));
    assert_eq!(last_presence(&drain(&mut rx7)), Some(vec![UserId(7)]));

    let (_nine, mut rx9) = hub.connect(UserId(9));
    assert_eq!(
        last_presence(&drain(&mut rx7)),
        Some(vec![UserId(7), UserId(9)])
    );
    assert_eq!(
        last_presence(&drain(&mut rx9)),
        Some(vec![UserId(7), UserId(9)])
    );

    let outcome = hub
        .send(UserId(7), UserId(9), "hi".to_string())
        .await
        .unwrap();
    assert_eq!(outcome, DeliveryOutcome::Delivered);
    match drain(&mut rx9).as_slice() {
        [ServerEvent::MessageReceived { from, message, .. }] => {
            assert_eq!(*from, UserId(7));
            assert_eq!(message, "hi");
        }
        other => panic!("expected one message, got {:?}", other),
    }

    hub.disconnect(&seven);
    assert_eq!(last_presence(&drain(&mut rx9)), Some(vec![UserId(9)]));

    // The message is in both users' history, and 9 sees 7 offline now
    let history = state
        .directory
        .history(UserId(9), UserId(7), None, 50)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message_content, "hi");
    let profile = state.directory.participant(UserId(9), UserId(7)).await.unwrap();
    assert_eq!(
        profile.status,
        matcha_server::core::models::PresenceStatus::Offline
    );
}

#[tokio::test]
async fn test_consume_pending_token_once() {
    let (_dir, state) = setup(&[], &[42]).await;
    sqlx::query("INSERT INTO email_verifications (token, user_id, created_at) VALUES (?, ?, ?)")
        .bind("abc123")
        .bind(42_i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&state.pool)
        .await
        .unwrap();

    assert_eq!(state.ledger.consume("abc123").await.unwrap(), UserId(42));

    let user = state.auth.get_user(UserId(42)).await.unwrap();
    assert!(user.is_verified);
    let remaining: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM email_verifications WHERE token = 'abc123'")
            .fetch_one(&state.pool)
            .await
            .unwrap();
    assert_eq!(remaining, 0);

    assert!(matches!(
        state.ledger.consume("abc123").await,
        Err(StoreError::NotFound(_))
    ));
}
