//! User model: owns accounts and receives notifications.

use serde::{Deserialize, Serialize};

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,

    /// Unique login/display name
    pub username: String,

    /// Telegram chat to notify, if linked
    pub telegram_chat_id: Option<String>,

    pub created_at: String,
}
