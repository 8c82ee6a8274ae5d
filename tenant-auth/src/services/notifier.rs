use async_trait::async_trait;

use crate::models::User;

/// Delivery hook for password reset tokens. The plaintext token only ever
/// passes through here.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset_token(&self, user: &User, token: &str) -> Result<(), anyhow::Error>;
}

/// Logs that a token was issued. Never logs the token itself.
pub struct LogNotifier;

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_reset_token(&self, user: &User, _token: &str) -> Result<(), anyhow::Error> {
        tracing::info!(user_id = %user.id, "Password reset token issued; no delivery channel configured");
        Ok(())
    }
}
