//! Actors and the privilege check guarding collection writes

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Host user roles, lowest to highest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Player,
    Trusted,
    Assistant,
    Gamemaster,
}

impl Role {
    /// Only gamemasters may create collections or write to them.
    pub fn can_write_collections(self) -> bool {
        self >= Role::Gamemaster
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Player => "player",
            Self::Trusted => "trusted",
            Self::Assistant => "assistant",
            Self::Gamemaster => "gamemaster",
        };
        f.write_str(name)
    }
}

/// Whoever triggered the sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    pub fn gamemaster(name: impl Into<String>) -> Self {
        Self::new(name, Role::Gamemaster)
    }

    /// Fail with [`Error::Authorization`] unless this actor may write.
    pub fn authorize(&self, action: &str) -> Result<()> {
        if self.role.can_write_collections() {
            return Ok(());
        }
        tracing::warn!(
            actor = %self.name,
            role = %self.role,
            action,
            "Rejected unprivileged write"
        );
        Err(Error::Authorization {
            actor: format!("{} ({})", self.name, self.role),
            action: action.to_string(),
        })
    }
}

impl Default for Actor {
    fn default() -> Self {
        Self::new("player", Role::Player)
    }
}
