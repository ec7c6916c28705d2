use serde::Serialize;
use uuid::Uuid;

/// The role a user holds in the working group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Organizer: creates events and issues check-in codes.
    Admin,
    /// Regular teacher member.
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    /// Unknown role strings fall back to the least privileged role.
    pub fn from_db(value: &str) -> Self {
        match value {
            "admin" => Role::Admin,
            _ => Role::Member,
        }
    }
}

/// Represents a user in the system.
#[derive(Clone, Debug)]
pub struct User {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's full name.
    pub name: String,
    /// The user's username.
    pub username: String,
    /// The stored credential (`salt:key` or a legacy digest).
    pub password: String,
    /// The user's role.
    pub role: Role,
}

impl User {
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name.clone(),
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// The projection of a user that is safe to hand to handlers and clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub role: Role,
}

impl PublicUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
