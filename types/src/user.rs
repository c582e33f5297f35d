use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The account behind the current session, as `/users/me` returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Account-creation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// Password-change payload. The server re-checks the current password and the
/// confirmation; the client sends all three verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}
