//! Service connection configuration.
//!
//! Mirrors the environment-driven selection at process start: when tenant
//! credentials are present the client targets a remote relay, otherwise it
//! falls back to the local service with a dummy user. The core treats the
//! credential contents as opaque.

use serde::{Deserialize, Serialize};

/// Environment variable carrying the remote user id.
pub const ENV_USER_ID: &str = "DICE_USER_ID";
/// Environment variable carrying the remote tenant id.
pub const ENV_TENANT_ID: &str = "DICE_TENANT_ID";
/// Environment variable carrying the remote tenant primary key.
pub const ENV_TENANT_KEY: &str = "DICE_TENANT_KEY";
/// Environment variable carrying the remote relay endpoint.
pub const ENV_ENDPOINT: &str = "DICE_RELAY_ENDPOINT";

/// User identity presented to the relay service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayUser {
    pub id: String,
    pub name: String,
}

impl RelayUser {
    /// Dummy identity used against the local service.
    pub fn local_dummy() -> Self {
        Self {
            id: "userId".to_string(),
            name: "Dummy(local)".to_string(),
        }
    }

    /// Identity used against a remote tenant.
    pub fn remote(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "Dummy(remote)".to_string(),
        }
    }
}

/// Insecure bearer material for the remote relay.
///
/// Debug output redacts the key; this is development-grade token plumbing,
/// not a credential store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsecureToken {
    tenant_key: String,
}

impl InsecureToken {
    pub fn new(tenant_key: impl Into<String>) -> Self {
        Self {
            tenant_key: tenant_key.into(),
        }
    }

    pub fn tenant_key(&self) -> &str {
        &self.tenant_key
    }
}

impl std::fmt::Debug for InsecureToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsecureToken").field("tenant_key", &"<redacted>").finish()
    }
}

/// Connection parameters selected at process start.
#[derive(Debug, Clone)]
pub enum ServiceConfig {
    /// In-process/local relay service.
    Local { user: RelayUser },
    /// Remote relay tenant.
    Remote {
        endpoint: String,
        tenant_id: String,
        token: InsecureToken,
        user: RelayUser,
    },
}

impl ServiceConfig {
    /// Selects local vs remote from the process environment.
    ///
    /// Remote requires all of user id, tenant id, and tenant key; anything
    /// missing means local, matching the original sample behavior.
    pub fn from_env() -> Self {
        let user_id = std::env::var(ENV_USER_ID).ok();
        let tenant_id = std::env::var(ENV_TENANT_ID).ok();
        let tenant_key = std::env::var(ENV_TENANT_KEY).ok();

        match (user_id, tenant_id, tenant_key) {
            (Some(user_id), Some(tenant_id), Some(tenant_key)) => Self::Remote {
                endpoint: std::env::var(ENV_ENDPOINT).unwrap_or_default(),
                tenant_id,
                token: InsecureToken::new(tenant_key),
                user: RelayUser::remote(user_id),
            },
            _ => Self::Local {
                user: RelayUser::local_dummy(),
            },
        }
    }

    pub fn user(&self) -> &RelayUser {
        match self {
            Self::Local { user } => user,
            Self::Remote { user, .. } => user,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }
}
