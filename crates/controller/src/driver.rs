//! One reconciliation pass over one record.
//!
//! connect → Observe → Delete | Create | Update | nothing → Disconnect →
//! conditions. The caller persists the record afterwards.

use std::sync::Arc;

use discord_reconciler::{
    Condition, Connector, Context, Error as ReconcileError, ExternalDeletion, ExternalResource,
    Managed, ManagedObject, PartialSuccessWarning, Role,
};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::provider::{ClientFactory, EnvLookup, ProviderConnector, process_env};
use crate::store::{ManifestStore, Snapshot, StoredRecord};

/// What a successful pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Created {
        external_name: String,
        warnings: Vec<PartialSuccessWarning>,
    },
    Updated {
        applied: Vec<&'static str>,
    },
    UpToDate,
    Deleted(ExternalDeletion),
}

impl PassOutcome {
    /// The record is finished with and its file can go.
    pub const fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }
}

/// Reconcile one object against Discord.
///
/// Errors after a successful connect are also written to the record's
/// `Synced` condition so they survive the pass.
pub async fn reconcile_role(
    ctx: &Context,
    connector: &dyn Connector,
    object: &mut ManagedObject,
) -> std::result::Result<PassOutcome, ReconcileError> {
    let kind = object.kind().to_string();
    let external = match connector.connect(ctx, object).await {
        Ok(external) => external,
        Err(e) => {
            if let Some(role) = object.as_role_mut() {
                role.set_condition(Condition::reconcile_error(e.to_string()));
            }
            return Err(e);
        }
    };
    let Some(role) = object.as_role_mut() else {
        return Err(ReconcileError::wrong_kind(discord_reconciler::ROLE_KIND, kind));
    };

    let result = converge(ctx, external.as_ref(), role).await;

    if let Err(e) = external.disconnect(ctx).await {
        warn!(resource = role.metadata.name.as_str(), error = %e, "Disconnect failed");
    }

    match &result {
        Ok(outcome) => {
            role.set_condition(Condition::reconcile_success());
            debug!(resource = role.metadata.name.as_str(), outcome = ?outcome, "Pass complete");
        }
        Err(e) => {
            warn!(
                resource = role.metadata.name.as_str(),
                reason = e.reason(),
                error = %e,
                "Pass failed"
            );
            role.set_condition(Condition::reconcile_error(e.to_string()));
        }
    }
    result
}

async fn converge(
    ctx: &Context,
    external: &dyn ExternalResource<Role>,
    role: &mut Role,
) -> std::result::Result<PassOutcome, ReconcileError> {
    let observation = external.observe(ctx, role).await?;

    if role.deletion_requested() {
        role.set_condition(Condition::deleting());
        if !observation.resource_exists {
            return Ok(PassOutcome::Deleted(ExternalDeletion::AlreadyGone));
        }
        let deletion = external.delete(ctx, role).await?;
        info!(resource = role.metadata.name.as_str(), deletion = ?deletion, "Role deleted");
        return Ok(PassOutcome::Deleted(deletion));
    }

    if !observation.resource_exists {
        let creation = external.create(ctx, role).await?;
        let condition = if creation.warnings.is_empty() {
            Condition::creating()
        } else {
            let message = creation
                .warnings
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            Condition::creating().with_message(message)
        };
        role.set_condition(condition);
        return Ok(PassOutcome::Created {
            external_name: creation.external_name,
            warnings: creation.warnings,
        });
    }

    if !observation.resource_up_to_date {
        info!(
            resource = role.metadata.name.as_str(),
            drift = ?observation.drift,
            "Role drifted"
        );
        let update = match external.update(ctx, role).await {
            Ok(update) => update,
            Err(e) => {
                role.set_condition(Condition::unavailable());
                return Err(e);
            }
        };
        role.set_condition(Condition::available());
        return Ok(PassOutcome::Updated {
            applied: update.applied,
        });
    }

    role.set_condition(Condition::available());
    Ok(PassOutcome::UpToDate)
}

/// Ties the store to the connector: loads, reconciles and persists records.
pub struct Controller {
    store: ManifestStore,
    factory: Arc<dyn ClientFactory>,
    env: EnvLookup,
}

impl Controller {
    pub fn new(store: ManifestStore, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            store,
            factory,
            env: process_env(),
        }
    }

    #[must_use]
    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    pub const fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// Connector over the provider configs and secrets of a snapshot.
    pub fn connector(&self, snapshot: &Snapshot) -> ProviderConnector {
        ProviderConnector::new(
            snapshot.provider_configs.clone(),
            snapshot.secrets.clone(),
            self.factory.clone(),
        )
        .with_env_lookup(self.env.clone())
    }

    /// Reconcile one stored record and write the result back.
    ///
    /// The record is saved even when the pass fails so the error condition
    /// and any binding made before the failure are kept.
    pub async fn sync(
        &self,
        ctx: &Context,
        connector: &dyn Connector,
        record: StoredRecord,
    ) -> Result<PassOutcome> {
        let StoredRecord { path, mut object } = record;
        let result = reconcile_role(ctx, connector, &mut object).await;

        match (&result, object.as_role()) {
            (Ok(outcome), _) if outcome.is_deleted() => self.store.remove(&path).await?,
            (_, Some(role)) => self.store.save_role(&path, role).await?,
            (_, None) => {}
        }

        result.map_err(Error::from)
    }

    /// Load everything and reconcile every record once, one at a time.
    pub async fn sync_all(&self, ctx: &Context) -> Result<Vec<(String, Result<PassOutcome>)>> {
        let snapshot = self.store.load().await?;
        let connector = self.connector(&snapshot);
        let mut results = Vec::with_capacity(snapshot.records.len());

        for record in snapshot.records {
            let name = record.object.name().to_string();
            let result = self.sync(ctx, &connector, record).await;
            results.push((name, result));
        }
        Ok(results)
    }
}
