//! In-memory role client.
//!
//! Keeps roles per guild, records every call it receives and can be told to
//! fail the next call of a given kind. Used by the tests here and by the
//! controller's tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use discord_api::{CreateRole, ModifyRole, Role};
use tokio::sync::Mutex;

use crate::client::{RemoteError, RoleClient};

/// The kind of a remote call, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Get,
    Create,
    Modify,
    Delete,
}

/// A call received by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get {
        guild_id: String,
        role_id: String,
    },
    Create {
        guild_id: String,
        request: CreateRole,
    },
    Modify {
        guild_id: String,
        role_id: String,
        request: ModifyRole,
    },
    Delete {
        guild_id: String,
        role_id: String,
    },
}

impl Call {
    pub const fn kind(&self) -> CallKind {
        match self {
            Self::Get { .. } => CallKind::Get,
            Self::Create { .. } => CallKind::Create,
            Self::Modify { .. } => CallKind::Modify,
            Self::Delete { .. } => CallKind::Delete,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    guilds: HashMap<String, BTreeMap<String, Role>>,
    calls: Vec<Call>,
    failures: HashMap<CallKind, String>,
    next_id: u64,
}

impl State {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        // Snowflake-looking IDs keep the fixtures close to real payloads.
        (1_000_000_000_000_000 + self.next_id).to_string()
    }

    fn record(&mut self, call: Call) -> Result<(), RemoteError> {
        let kind = call.kind();
        self.calls.push(call);
        match self.failures.remove(&kind) {
            Some(reason) => Err(RemoteError::failed(reason)),
            None => Ok(()),
        }
    }
}

/// Role client backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryRoleClient {
    state: Mutex<State>,
}

impl InMemoryRoleClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a role directly, bypassing the call log. Returns its ID.
    pub async fn seed(&self, guild_id: &str, name: &str, customize: impl FnOnce(&mut Role)) -> String {
        let mut state = self.state.lock().await;
        let id = state.allocate_id();
        let mut role = Role {
            id: id.clone(),
            name: name.to_string(),
            color: 0,
            hoist: false,
            position: 1,
            permissions: "0".to_string(),
            managed: false,
            mentionable: false,
        };
        customize(&mut role);
        role.id.clone_from(&id);
        state
            .guilds
            .entry(guild_id.to_string())
            .or_default()
            .insert(id.clone(), role);
        id
    }

    /// Make the next call of `kind` fail with `reason`.
    pub async fn fail(&self, kind: CallKind, reason: impl Into<String>) {
        self.state.lock().await.failures.insert(kind, reason.into());
    }

    /// Get a role as currently stored.
    pub async fn role(&self, guild_id: &str, role_id: &str) -> Option<Role> {
        self.state
            .lock()
            .await
            .guilds
            .get(guild_id)
            .and_then(|roles| roles.get(role_id))
            .cloned()
    }

    /// All roles in a guild.
    pub async fn roles(&self, guild_id: &str) -> Vec<Role> {
        self.state
            .lock()
            .await
            .guilds
            .get(guild_id)
            .map(|roles| roles.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every call received so far, oldest first.
    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    /// Calls of one kind.
    pub async fn count(&self, kind: CallKind) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .count()
    }
}

#[async_trait]
impl RoleClient for InMemoryRoleClient {
    async fn get_role(&self, guild_id: &str, role_id: &str) -> Result<Role, RemoteError> {
        let mut state = self.state.lock().await;
        state.record(Call::Get {
            guild_id: guild_id.to_string(),
            role_id: role_id.to_string(),
        })?;
        state
            .guilds
            .get(guild_id)
            .and_then(|roles| roles.get(role_id))
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    async fn create_role(&self, guild_id: &str, request: &CreateRole) -> Result<Role, RemoteError> {
        let mut state = self.state.lock().await;
        state.record(Call::Create {
            guild_id: guild_id.to_string(),
            request: request.clone(),
        })?;

        let id = state.allocate_id();
        let role = Role {
            id: id.clone(),
            name: request.name.clone(),
            color: request.color.unwrap_or_default(),
            hoist: request.hoist.unwrap_or_default(),
            position: 1,
            permissions: request
                .permissions
                .clone()
                .unwrap_or_else(|| "0".to_string()),
            managed: false,
            mentionable: request.mentionable.unwrap_or_default(),
        };
        state
            .guilds
            .entry(guild_id.to_string())
            .or_default()
            .insert(id, role.clone());
        Ok(role)
    }

    async fn modify_role(
        &self,
        guild_id: &str,
        role_id: &str,
        request: &ModifyRole,
    ) -> Result<Role, RemoteError> {
        let mut state = self.state.lock().await;
        state.record(Call::Modify {
            guild_id: guild_id.to_string(),
            role_id: role_id.to_string(),
            request: request.clone(),
        })?;

        let role = state
            .guilds
            .get_mut(guild_id)
            .and_then(|roles| roles.get_mut(role_id))
            .ok_or(RemoteError::NotFound)?;
        if let Some(name) = &request.name {
            role.name.clone_from(name);
        }
        if let Some(permissions) = &request.permissions {
            role.permissions.clone_from(permissions);
        }
        if let Some(color) = request.color {
            role.color = color;
        }
        if let Some(hoist) = request.hoist {
            role.hoist = hoist;
        }
        if let Some(mentionable) = request.mentionable {
            role.mentionable = mentionable;
        }
        if let Some(position) = request.position {
            role.position = position;
        }
        Ok(role.clone())
    }

    async fn delete_role(&self, guild_id: &str, role_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        state.record(Call::Delete {
            guild_id: guild_id.to_string(),
            role_id: role_id.to_string(),
        })?;
        state
            .guilds
            .get_mut(guild_id)
            .and_then(|roles| roles.remove(role_id))
            .map(|_| ())
            .ok_or(RemoteError::NotFound)
    }
}
