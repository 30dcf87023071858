//! The `Role` managed resource and the capabilities the reconciler needs
//! from any managed record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{RoleObservation, RoleParameters};

/// API group/version of every manifest this provider understands.
pub const API_VERSION: &str = "discord.crossplane.io/v1alpha1";

/// Kind of the role managed resource.
pub const ROLE_KIND: &str = "Role";

/// Annotation holding the remote ID (the external identity binding).
pub const EXTERNAL_NAME_ANNOTATION: &str = "crossplane.io/external-name";

/// Provider config used when a record names none.
pub const DEFAULT_PROVIDER_CONFIG: &str = "default";

/// Capabilities the reconciler needs from any managed record.
pub trait Managed: Send + Sync {
    /// Manifest kind.
    fn kind(&self) -> &str;

    /// Record name, for logs and errors.
    fn name(&self) -> &str;

    /// ID of the remote container the entity lives in (the guild).
    fn parent_id(&self) -> &str;

    /// Remote ID bound to this record, if any.
    fn external_name(&self) -> Option<&str>;

    /// Bind the remote ID.
    fn set_external_name(&mut self, external_name: &str);

    /// Remote ID cached on status by a previous observation.
    fn cached_id(&self) -> Option<&str>;

    /// The user asked for the remote entity to go away.
    fn deletion_requested(&self) -> bool;

    /// What to do with the remote entity on deletion.
    fn deletion_policy(&self) -> DeletionPolicy;

    /// Name of the provider config to connect with.
    fn provider_config_name(&self) -> &str;

    /// Current status conditions.
    fn conditions(&self) -> &[Condition];

    /// Set a condition, replacing any of the same type.
    fn set_condition(&mut self, condition: Condition);
}

/// The role-shaped part of a managed record.
pub trait RoleRecord: Managed {
    /// Desired properties.
    fn parameters(&self) -> &RoleParameters;

    /// Record the latest observation (refreshes the cached ID).
    fn set_observation(&mut self, observation: RoleObservation);
}

/// Object metadata, trimmed to what the provider uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Set when deletion has been requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Reference to a provider config by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfigReference {
    pub name: String,
}

impl Default for ProviderConfigReference {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROVIDER_CONFIG.to_string(),
        }
    }
}

/// What happens to the remote entity when the record is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    /// Delete the remote entity.
    #[default]
    Delete,
    /// Leave the remote entity in place and forget it.
    Orphan,
}

/// Condition types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    /// The remote entity is usable.
    Ready,
    /// The last pass succeeded.
    Synced,
}

/// Condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A status condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    fn new(kind: ConditionType, status: ConditionStatus, reason: &str) -> Self {
        Self {
            kind,
            status,
            reason: reason.to_string(),
            message: None,
            last_transition_time: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The remote role exists and matches.
    pub fn available() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::True, "Available")
    }

    /// The remote role is being created.
    pub fn creating() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::False, "Creating")
    }

    /// The remote role is being deleted.
    pub fn deleting() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::False, "Deleting")
    }

    /// The remote role exists but is not usable as declared.
    pub fn unavailable() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::False, "Unavailable")
    }

    /// The last pass succeeded.
    pub fn reconcile_success() -> Self {
        Self::new(ConditionType::Synced, ConditionStatus::True, "ReconcileSuccess")
    }

    /// The last pass failed.
    pub fn reconcile_error(message: impl Into<String>) -> Self {
        Self::new(ConditionType::Synced, ConditionStatus::False, "ReconcileError")
            .with_message(message)
    }

    /// Same status and reason; transition time and message ignored.
    pub fn equivalent(&self, other: &Self) -> bool {
        self.kind == other.kind && self.status == other.status && self.reason == other.reason
    }
}

/// Replace the condition of the same type, keeping its transition time when
/// nothing material changed.
pub fn upsert_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.kind == condition.kind) {
        Some(existing) => {
            if existing.equivalent(&condition) {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

/// `spec` of a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    pub for_provider: RoleParameters,
    #[serde(default)]
    pub provider_config_ref: ProviderConfigReference,
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

/// `status` of a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<RoleObservation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// A declarative Discord role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: RoleSpec,
    #[serde(default)]
    pub status: RoleStatus,
}

impl Role {
    /// Create a role record.
    pub fn new(name: impl Into<String>, parameters: RoleParameters) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: ROLE_KIND.to_string(),
            metadata: ObjectMeta::named(name),
            spec: RoleSpec {
                for_provider: parameters,
                ..Default::default()
            },
            status: RoleStatus::default(),
        }
    }

    /// Set the external name annotation.
    #[must_use]
    pub fn with_external_name(mut self, external_name: impl Into<String>) -> Self {
        self.metadata
            .annotations
            .insert(EXTERNAL_NAME_ANNOTATION.to_string(), external_name.into());
        self
    }

    /// Condition of a given type, if present.
    pub fn condition(&self, kind: ConditionType) -> Option<&Condition> {
        self.status.conditions.iter().find(|c| c.kind == kind)
    }
}

impl Managed for Role {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn parent_id(&self) -> &str {
        &self.spec.for_provider.guild_id
    }

    fn external_name(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(EXTERNAL_NAME_ANNOTATION)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    fn set_external_name(&mut self, external_name: &str) {
        self.metadata.annotations.insert(
            EXTERNAL_NAME_ANNOTATION.to_string(),
            external_name.to_string(),
        );
    }

    fn cached_id(&self) -> Option<&str> {
        self.status
            .at_provider
            .as_ref()
            .map(|o| o.id.as_str())
            .filter(|id| !id.is_empty())
    }

    fn deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    fn deletion_policy(&self) -> DeletionPolicy {
        self.spec.deletion_policy
    }

    fn provider_config_name(&self) -> &str {
        &self.spec.provider_config_ref.name
    }

    fn conditions(&self) -> &[Condition] {
        &self.status.conditions
    }

    fn set_condition(&mut self, condition: Condition) {
        upsert_condition(&mut self.status.conditions, condition);
    }
}

impl RoleRecord for Role {
    fn parameters(&self) -> &RoleParameters {
        &self.spec.for_provider
    }

    fn set_observation(&mut self, observation: RoleObservation) {
        self.status.at_provider = Some(observation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: discord.crossplane.io/v1alpha1
kind: Role
metadata:
  name: admin
  annotations:
    crossplane.io/external-name: "111"
spec:
  forProvider:
    guildId: "999"
    name: Admin
    hoist: true
"#;

    #[test]
    fn manifest_decodes_with_defaults() -> Result<(), serde_yaml::Error> {
        let role: Role = serde_yaml::from_str(MANIFEST)?;
        assert_eq!(role.name(), "admin");
        assert_eq!(role.external_name(), Some("111"));
        assert_eq!(role.provider_config_name(), DEFAULT_PROVIDER_CONFIG);
        assert_eq!(role.deletion_policy(), DeletionPolicy::Delete);
        assert_eq!(role.parameters().hoist, Some(true));
        assert_eq!(role.parameters().color, None);
        assert!(!role.deletion_requested());
        Ok(())
    }

    #[test]
    fn empty_external_name_counts_as_unbound() {
        let role = Role::new("admin", RoleParameters::new("1", "Admin")).with_external_name("");
        assert_eq!(role.external_name(), None);
    }

    #[test]
    fn cached_id_comes_from_status() {
        let mut role = Role::new("admin", RoleParameters::new("1", "Admin"));
        assert_eq!(role.cached_id(), None);
        role.set_observation(RoleObservation {
            id: "42".to_string(),
            ..Default::default()
        });
        assert_eq!(role.cached_id(), Some("42"));
    }

    #[test]
    fn unchanged_condition_keeps_transition_time() {
        let mut role = Role::new("admin", RoleParameters::new("1", "Admin"));
        role.set_condition(Condition::available());
        let first = role
            .condition(ConditionType::Ready)
            .map(|c| c.last_transition_time);

        role.set_condition(Condition::available());
        let second = role
            .condition(ConditionType::Ready)
            .map(|c| c.last_transition_time);

        assert_eq!(first, second);
        assert_eq!(role.conditions().len(), 1);
    }

    #[test]
    fn changed_condition_replaces_previous() {
        let mut role = Role::new("admin", RoleParameters::new("1", "Admin"));
        role.set_condition(Condition::creating());
        role.set_condition(Condition::available());
        role.set_condition(Condition::reconcile_error("boom"));

        assert_eq!(role.conditions().len(), 2);
        assert_eq!(
            role.condition(ConditionType::Ready).map(|c| c.reason.as_str()),
            Some("Available")
        );
        assert_eq!(
            role.condition(ConditionType::Synced)
                .and_then(|c| c.message.as_deref()),
            Some("boom")
        );
    }

    #[test]
    fn round_trip_preserves_status() -> Result<(), serde_yaml::Error> {
        let mut role: Role = serde_yaml::from_str(MANIFEST)?;
        role.set_condition(Condition::available());
        let text = serde_yaml::to_string(&role)?;
        let back: Role = serde_yaml::from_str(&text)?;
        assert_eq!(back, role);
        Ok(())
    }
}
