//! User model
//!
//! A user holds exactly one [`Role`], fixed at registration. The role decides
//! the permission set; the `is_staff` flag is separate and only gates
//! publisher administration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new, not yet persisted user.
    ///
    /// The password must already be hashed, see `services::password::hash_password`.
    pub fn new(username: String, email: String, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            password_hash,
            role,
            is_staff: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_reader(&self) -> bool {
        self.role == Role::Reader
    }

    pub fn is_journalist(&self) -> bool {
        self.role == Role::Journalist
    }

    pub fn is_editor(&self) -> bool {
        self.role == Role::Editor
    }

    /// Whether the user's role grants `permission`
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.permissions().contains(&permission)
    }
}

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Journalist,
    Editor,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Reader, Role::Journalist, Role::Editor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Journalist => "journalist",
            Role::Editor => "editor",
        }
    }

    /// Permissions granted to the role.
    ///
    /// This table is the single source of truth consulted at authorization time.
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Reader => &[ViewArticle, ViewNewsletter, Subscribe],
            Role::Journalist => &[
                ViewArticle,
                AddArticle,
                ChangeArticle,
                DeleteArticle,
                ViewNewsletter,
                AddNewsletter,
                ChangeNewsletter,
                DeleteNewsletter,
                JoinPublisher,
            ],
            Role::Editor => &[
                ViewArticle,
                ChangeArticle,
                DeleteArticle,
                ApproveArticle,
                ViewNewsletter,
                ChangeNewsletter,
                DeleteNewsletter,
                JoinPublisher,
            ],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reader" => Ok(Role::Reader),
            "journalist" => Ok(Role::Journalist),
            "editor" => Ok(Role::Editor),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Named capability checked by the authorization layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewArticle,
    AddArticle,
    ChangeArticle,
    DeleteArticle,
    ApproveArticle,
    ViewNewsletter,
    AddNewsletter,
    ChangeNewsletter,
    DeleteNewsletter,
    JoinPublisher,
    Subscribe,
}

/// Public projection of a user, safe to return from the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

/// Input for registering a user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Raw role name, validated at registration
    pub role: String,
}
