//! The external client seam: the four role calls the reconciler needs.

use std::sync::Arc;

use async_trait::async_trait;
use discord_api::{CreateRole, DiscordClient, ModifyRole, Role};
use thiserror::Error;

/// Failure of a single remote call, split into the one outcome the
/// reconciler treats as data (not found) and everything else.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The addressed role does not exist.
    #[error("role not found")]
    NotFound,

    /// Any other failure.
    #[error("{0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RemoteError {
    /// Wrap an arbitrary failure message.
    pub fn failed(reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        Self::Failed(reason.into())
    }

    /// Check whether this is the not-found outcome.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<discord_api::Error> for RemoteError {
    fn from(error: discord_api::Error) -> Self {
        if error.is_not_found() {
            Self::NotFound
        } else {
            Self::Failed(Box::new(error))
        }
    }
}

/// Remote role operations, scoped `guild/role`.
#[async_trait]
pub trait RoleClient: Send + Sync {
    /// Fetch a role by ID.
    async fn get_role(&self, guild_id: &str, role_id: &str) -> Result<Role, RemoteError>;

    /// Create a role.
    async fn create_role(&self, guild_id: &str, request: &CreateRole) -> Result<Role, RemoteError>;

    /// Modify a role; unset request fields are left untouched.
    async fn modify_role(
        &self,
        guild_id: &str,
        role_id: &str,
        request: &ModifyRole,
    ) -> Result<Role, RemoteError>;

    /// Delete a role.
    async fn delete_role(&self, guild_id: &str, role_id: &str) -> Result<(), RemoteError>;
}

#[async_trait]
impl RoleClient for DiscordClient {
    async fn get_role(&self, guild_id: &str, role_id: &str) -> Result<Role, RemoteError> {
        Ok(Self::get_role(self, guild_id, role_id).await?)
    }

    async fn create_role(&self, guild_id: &str, request: &CreateRole) -> Result<Role, RemoteError> {
        Ok(Self::create_role(self, guild_id, request).await?)
    }

    async fn modify_role(
        &self,
        guild_id: &str,
        role_id: &str,
        request: &ModifyRole,
    ) -> Result<Role, RemoteError> {
        Ok(Self::modify_role(self, guild_id, role_id, request).await?)
    }

    async fn delete_role(&self, guild_id: &str, role_id: &str) -> Result<(), RemoteError> {
        Ok(Self::delete_role(self, guild_id, role_id).await?)
    }
}

#[async_trait]
impl<T: RoleClient + ?Sized> RoleClient for Arc<T> {
    async fn get_role(&self, guild_id: &str, role_id: &str) -> Result<Role, RemoteError> {
        (**self).get_role(guild_id, role_id).await
    }

    async fn create_role(&self, guild_id: &str, request: &CreateRole) -> Result<Role, RemoteError> {
        (**self).create_role(guild_id, request).await
    }

    async fn modify_role(
        &self,
        guild_id: &str,
        role_id: &str,
        request: &ModifyRole,
    ) -> Result<Role, RemoteError> {
        (**self).modify_role(guild_id, role_id, request).await
    }

    async fn delete_role(&self, guild_id: &str, role_id: &str) -> Result<(), RemoteError> {
        (**self).delete_role(guild_id, role_id).await
    }
}
