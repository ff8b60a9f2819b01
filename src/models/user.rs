use std::fmt;

use mongodb::bson::DateTime;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::{id_hex, required_text, rfc3339};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Expert,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Expert => "expert",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Subject of the identity-provider token.
    pub uid: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(rename = "photoURL", default)]
    pub photo_url: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
}

impl CreateUserRequest {
    /// Builds the user record for `uid`. Admins are never self-assigned.
    pub fn into_user(self, uid: &str) -> Result<User> {
        let email = self.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::bad_request("A valid email is required"));
        }
        let role = self.role.unwrap_or_default();
        if role == Role::Admin {
            return Err(AppError::forbidden("Cannot self-assign the admin role"));
        }

        let now = DateTime::now();
        Ok(User {
            id: None,
            uid: uid.to_string(),
            email,
            display_name: required_text(&self.display_name, "Display name", 100)?,
            role,
            photo_url: self.photo_url.unwrap_or_default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(rename = "_id")]
    pub id: String,
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        UserView {
            id: id_hex(&user.id),
            uid: user.uid,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
            photo_url: user.photo_url,
            is_active: user.is_active,
            created_at: rfc3339(&user.created_at),
            updated_at: rfc3339(&user.updated_at),
        }
    }
}

/// Directory entry used by the chat sidebar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub uid: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    pub is_online: bool,
}

impl PublicUser {
    pub fn new(user: User, is_online: bool) -> Self {
        PublicUser {
            id: id_hex(&user.id),
            uid: user.uid,
            display_name: user.display_name,
            email: user.email,
            role: user.role,
            photo_url: user.photo_url,
            is_online,
        }
    }
}

/// Embedded in bookings, experts and projects in place of a bare user id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub display_name: String,
    pub email: String,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: id_hex(&user.id),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            photo_url: user.photo_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(role: Option<Role>) -> CreateUserRequest {
        CreateUserRequest {
            email: "  Ada@Example.COM ".to_string(),
            display_name: " Ada ".to_string(),
            role,
            photo_url: None,
        }
    }

    #[test]
    fn normalizes_new_user() {
        let user = request(None).into_user("uid-1").unwrap();
        assert_eq!(user.uid, "uid-1");
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.display_name, "Ada");
        assert_eq!(user.role, Role::User);
        assert!(user.is_active);
    }

    #[test]
    fn refuses_self_assigned_admin() {
        let err = request(Some(Role::Admin)).into_user("uid-1").unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn role_uses_lowercase_wire_names() {
        assert_eq!(serde_json::to_value(Role::Expert).unwrap(), "expert");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }
}
