//! Reconciler implementation.
//!
//! State is never kept between calls. Each operation re-derives where the
//! record stands from its external name, its cached status ID and what the
//! remote API returns, so any pass can be interrupted and repeated.

use std::future::Future;

use async_trait::async_trait;
use discord_api::ModifyRole;
use tracing::{debug, info, warn};

use crate::client::{RemoteError, RoleClient};
use crate::context::{Context, Interrupted};
use crate::error::{Error, Operation, Result};
use crate::resource::{DeletionPolicy, Managed, RoleRecord};
use crate::types::{
    ExternalCreation, ExternalDeletion, ExternalObservation, ExternalUpdate,
    PartialSuccessWarning, RoleObservation,
};

/// Driver-facing contract for one kind of managed record.
#[async_trait]
pub trait ExternalResource<R: Send>: Send + Sync {
    /// Compare the record against the remote entity.
    async fn observe(&self, ctx: &Context, record: &mut R) -> Result<ExternalObservation>;

    /// Create the remote entity and bind its ID to the record.
    async fn create(&self, ctx: &Context, record: &mut R) -> Result<ExternalCreation>;

    /// Push the managed properties to the bound remote entity.
    async fn update(&self, ctx: &Context, record: &mut R) -> Result<ExternalUpdate>;

    /// Delete the bound remote entity.
    async fn delete(&self, ctx: &Context, record: &mut R) -> Result<ExternalDeletion>;

    /// Release client resources.
    async fn disconnect(&self, ctx: &Context) -> Result<()>;
}

/// Observe/Create/Update/Delete for Discord roles.
#[derive(Debug, Clone)]
pub struct RoleReconciler<C> {
    client: C,
}

impl<C: RoleClient> RoleReconciler<C> {
    /// Create a reconciler around a role client.
    pub const fn new(client: C) -> Self {
        Self { client }
    }

    /// Get the client.
    pub const fn client(&self) -> &C {
        &self.client
    }
}

/// Run a remote call under the caller's context.
async fn guarded<T, F>(
    ctx: &Context,
    operation: Operation,
    resource: &str,
    call: F,
) -> Result<std::result::Result<T, RemoteError>>
where
    F: Future<Output = std::result::Result<T, RemoteError>> + Send,
{
    ctx.run(call).await.map_err(|reason| {
        let resource = resource.to_string();
        match reason {
            Interrupted::Cancelled => Error::Cancelled {
                operation,
                resource,
            },
            Interrupted::DeadlineExceeded => Error::DeadlineExceeded {
                operation,
                resource,
            },
        }
    })
}

fn validated<R: RoleRecord + ?Sized>(record: &R) -> Result<()> {
    record
        .parameters()
        .validate()
        .map_err(|reason| Error::invalid_spec(record.name(), reason))
}

// Observe and Delete only need the address; a bad payload must not block them.
fn addressable<R: RoleRecord + ?Sized>(record: &R) -> Result<()> {
    record
        .parameters()
        .validate_address()
        .map_err(|reason| Error::invalid_spec(record.name(), reason))
}

#[async_trait]
impl<C, R> ExternalResource<R> for RoleReconciler<C>
where
    C: RoleClient,
    R: RoleRecord + Send,
{
    async fn observe(&self, ctx: &Context, record: &mut R) -> Result<ExternalObservation> {
        // Fall back to the status-cached ID when a crash lost the binding.
        let Some(role_id) = record
            .external_name()
            .or_else(|| record.cached_id())
            .map(str::to_owned)
        else {
            debug!(resource = record.name(), "No external name, role does not exist yet");
            return Ok(ExternalObservation::absent());
        };
        addressable(record)?;

        let guild_id = record.parameters().guild_id.clone();
        let outcome = guarded(
            ctx,
            Operation::Observe,
            record.name(),
            self.client.get_role(&guild_id, &role_id),
        )
        .await?;

        let role = match outcome {
            Ok(role) => role,
            Err(RemoteError::NotFound) => {
                info!(
                    resource = record.name(),
                    guild_id = %guild_id,
                    role_id = %role_id,
                    "Role no longer exists remotely"
                );
                return Ok(ExternalObservation::absent());
            }
            Err(e) => return Err(Error::remote(Operation::Observe, record.name(), e)),
        };

        let observation = RoleObservation::from(&role);
        let drift = record.parameters().drift(&observation);

        if record.external_name().is_none() {
            info!(
                resource = record.name(),
                role_id = %observation.id,
                "Recovered external name from status"
            );
            record.set_external_name(&observation.id);
        }
        if observation.managed {
            debug!(resource = record.name(), "Role is managed by an integration");
        }
        record.set_observation(observation);

        debug!(resource = record.name(), drift = ?drift, "Observed role");
        Ok(ExternalObservation::present(drift))
    }

    async fn create(&self, ctx: &Context, record: &mut R) -> Result<ExternalCreation> {
        validated(record)?;
        let parameters = record.parameters().clone();
        let request = parameters.create_request();

        info!(
            resource = record.name(),
            guild_id = %parameters.guild_id,
            name = %parameters.name,
            "Creating role"
        );

        let role = guarded(
            ctx,
            Operation::Create,
            record.name(),
            self.client.create_role(&parameters.guild_id, &request),
        )
        .await?
        .map_err(|e| Error::remote(Operation::Create, record.name(), e))?;

        // Bind before anything else can fail, so the role is never orphaned.
        record.set_external_name(&role.id);
        record.set_observation(RoleObservation::from(&role));

        let mut warnings = Vec::new();
        if let Some(position) = parameters.position {
            let moved = guarded(
                ctx,
                Operation::Create,
                record.name(),
                self.client
                    .modify_role(&parameters.guild_id, &role.id, &ModifyRole::position(position)),
            )
            .await;

            match moved {
                Ok(Ok(updated)) => record.set_observation(RoleObservation::from(&updated)),
                Ok(Err(e)) => warnings.push(PartialSuccessWarning {
                    property: "position",
                    reason: e.to_string(),
                }),
                Err(e) => warnings.push(PartialSuccessWarning {
                    property: "position",
                    reason: e.to_string(),
                }),
            }
        }

        for warning in &warnings {
            warn!(
                resource = record.name(),
                role_id = %role.id,
                property = warning.property,
                reason = %warning.reason,
                "Role created but a follow-up step failed; next update will converge it"
            );
        }

        info!(resource = record.name(), role_id = %role.id, "Role created");
        Ok(ExternalCreation {
            external_name: role.id,
            warnings,
        })
    }

    async fn update(&self, ctx: &Context, record: &mut R) -> Result<ExternalUpdate> {
        let Some(role_id) = record.external_name().map(str::to_owned) else {
            return Err(Error::missing_binding(Operation::Update, record.name()));
        };
        validated(record)?;

        let parameters = record.parameters().clone();
        let request = parameters.modify_request();
        let applied = managed_fields(&request);

        info!(
            resource = record.name(),
            role_id = %role_id,
            fields = ?applied,
            "Updating role"
        );

        let role = guarded(
            ctx,
            Operation::Update,
            record.name(),
            self.client
                .modify_role(&parameters.guild_id, &role_id, &request),
        )
        .await?
        .map_err(|e| Error::remote(Operation::Update, record.name(), e))?;

        record.set_observation(RoleObservation::from(&role));
        Ok(ExternalUpdate { applied })
    }

    async fn delete(&self, ctx: &Context, record: &mut R) -> Result<ExternalDeletion> {
        if record.deletion_policy() == DeletionPolicy::Orphan {
            info!(resource = record.name(), "Deletion policy is Orphan, keeping remote role");
            return Ok(ExternalDeletion::Orphaned);
        }
        let Some(role_id) = record.external_name().map(str::to_owned) else {
            debug!(resource = record.name(), "No external name, nothing to delete");
            return Ok(ExternalDeletion::AlreadyGone);
        };
        addressable(record)?;

        let guild_id = record.parent_id().to_owned();
        info!(resource = record.name(), role_id = %role_id, "Deleting role");

        let outcome = guarded(
            ctx,
            Operation::Delete,
            record.name(),
            self.client.delete_role(&guild_id, &role_id),
        )
        .await?;

        match outcome {
            Ok(()) => Ok(ExternalDeletion::Deleted),
            Err(RemoteError::NotFound) => {
                debug!(resource = record.name(), role_id = %role_id, "Role already gone");
                Ok(ExternalDeletion::AlreadyGone)
            }
            Err(e) => Err(Error::remote(Operation::Delete, record.name(), e)),
        }
    }

    async fn disconnect(&self, _ctx: &Context) -> Result<()> {
        // The HTTP client pools connections internally; nothing to release.
        Ok(())
    }
}

/// Field names carried by a modify request.
fn managed_fields(request: &ModifyRole) -> Vec<&'static str> {
    [
        ("name", request.name.is_some()),
        ("color", request.color.is_some()),
        ("hoist", request.hoist.is_some()),
        ("mentionable", request.mentionable.is_some()),
        ("permissions", request.permissions.is_some()),
        ("position", request.position.is_some()),
    ]
    .into_iter()
    .filter_map(|(field, set)| set.then_some(field))
    .collect()
}
