//! Role and identity-provider enumerations.
//!
//! The four access tiers and the provider labels are closed sets: they appear
//! verbatim in session tokens, in the users table, and in admin API bodies, so
//! both serde and sqlx map them to the exact wire strings (`admin_global`,
//! `admin_local`, `user`, `guest_local`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Access tier of an account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    /// Full administrative access to every machine and account.
    AdminGlobal,
    /// Administrative access scoped to the machine the account is linked to.
    AdminLocal,
    /// Regular authenticated account.
    User,
    /// Default tier for unlinked or secondary registrations.
    #[default]
    GuestLocal,
}

impl Role {
    /// Whether this role may reach administrative endpoints at all.
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::AdminGlobal | Self::AdminLocal)
    }

    /// Role-assignment matrix: may an actor with this role grant `target`?
    ///
    /// Scope (an `admin_local` actor may only touch accounts linked to its own
    /// machine) is checked by the caller against the user records; this matrix
    /// only answers the tier question.
    pub const fn may_assign(self, target: Self) -> bool {
        match self {
            Self::AdminGlobal => true,
            Self::AdminLocal => matches!(target, Self::User | Self::GuestLocal),
            Self::User | Self::GuestLocal => false,
        }
    }

    /// Wire label for this role.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdminGlobal => "admin_global",
            Self::AdminLocal => "admin_local",
            Self::User => "user",
            Self::GuestLocal => "guest_local",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin_global" => Ok(Self::AdminGlobal),
            "admin_local" => Ok(Self::AdminLocal),
            "user" => Ok(Self::User),
            "guest_local" => Ok(Self::GuestLocal),
            other => Err(Error::UnknownLabel(format!("role {other}"))),
        }
    }
}

/// Identity provider an account was created through.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Provider {
    /// Local email + password account.
    #[default]
    Email,
    Google,
    Apple,
}

impl Provider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Google => "google",
            Self::Apple => "apple",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "google" => Ok(Self::Google),
            "apple" => Ok(Self::Apple),
            other => Err(Error::UnknownLabel(format!("provider {other}"))),
        }
    }
}
