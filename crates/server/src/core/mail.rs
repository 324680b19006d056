//! Verification mail delivery
//!
//! Signup hands the verification link to a `VerificationMailer`. The default
//! mailer only records that a link went out; an SMTP transport can be
//! plugged in through `AppState` construction.

use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait VerificationMailer: Send + Sync {
    async fn send_verification(&self, email: &str, link: &str) -> anyhow::Result<()>;
}

/// Logs the recipient, never the link (it carries the token).
pub struct LogMailer;

#[async_trait]
impl VerificationMailer for LogMailer {
    async fn send_verification(&self, email: &str, _link: &str) -> anyhow::Result<()> {
        info!("[Mail] Verification link issued to {}", email);
        Ok(())
    }
}

/// Build the link a user follows to consume `token`.
pub fn verification_link(base: &str, token: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), token)
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Captures sent links so tests can follow them.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingMailer {
        pub fn last_token(&self) -> Option<String> {
            self.sent
                .lock()
                .last()
                .and_then(|(_, link)| link.rsplit('/').next().map(str::to_string))
        }
    }

    #[async_trait]
    impl VerificationMailer for RecordingMailer {
        async fn send_verification(&self, email: &str, link: &str) -> anyhow::Result<()> {
            self.sent.lock().push((email.to_string(), link.to_string()));
            Ok(())
        }
    }
}
