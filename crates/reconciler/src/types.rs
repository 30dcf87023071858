//! Core types for the reconciler.

use std::fmt;

use discord_api::{CreateRole, ModifyRole, Role};
use serde::{Deserialize, Serialize};

/// Desired state of one role.
///
/// Every tunable property is optional. `None` means the property is not
/// managed: it is never sent and never compared, so Discord (or a human)
/// may set it to anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleParameters {
    /// Guild the role lives in. Part of the remote address, never mutated.
    pub guild_id: String,
    /// Role name. Always managed.
    pub name: String,
    /// RGB color as an integer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    /// Display the role separately in the member list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hoist: Option<bool>,
    /// Allow anyone to @mention the role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentionable: Option<bool>,
    /// Permission bit set as a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    /// Position in the role hierarchy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
}

impl RoleParameters {
    /// Create parameters with only the required fields set.
    pub fn new(guild_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn with_color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    #[must_use]
    pub const fn with_hoist(mut self, hoist: bool) -> Self {
        self.hoist = Some(hoist);
        self
    }

    #[must_use]
    pub const fn with_mentionable(mut self, mentionable: bool) -> Self {
        self.mentionable = Some(mentionable);
        self
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.permissions = Some(permissions.into());
        self
    }

    #[must_use]
    pub const fn with_position(mut self, position: i32) -> Self {
        self.position = Some(position);
        self
    }

    /// Reject parameters the remote address cannot be built from.
    pub fn validate_address(&self) -> Result<(), String> {
        if self.guild_id.trim().is_empty() {
            return Err("forProvider.guildId is required".to_string());
        }
        Ok(())
    }

    /// Reject parameters that cannot be sent in a create or modify request.
    pub fn validate(&self) -> Result<(), String> {
        self.validate_address()?;
        if let Some(permissions) = &self.permissions {
            if permissions.parse::<u64>().is_err() {
                return Err(format!(
                    "forProvider.permissions must be a decimal bit set, got '{permissions}'"
                ));
            }
        }
        Ok(())
    }

    /// Creation payload. Position is applied by a follow-up call.
    pub fn create_request(&self) -> CreateRole {
        CreateRole {
            name: self.name.clone(),
            permissions: self.permissions.clone(),
            color: self.color,
            hoist: self.hoist,
            mentionable: self.mentionable,
        }
    }

    /// Modify payload: the name plus every managed property.
    pub fn modify_request(&self) -> ModifyRole {
        ModifyRole {
            name: Some(self.name.clone()),
            permissions: self.permissions.clone(),
            color: self.color,
            hoist: self.hoist,
            mentionable: self.mentionable,
            position: self.position,
        }
    }

    /// Names of the managed properties whose observed value differs.
    pub fn drift(&self, observed: &RoleObservation) -> Vec<&'static str> {
        let mut drifted = Vec::new();

        if self.name != observed.name {
            drifted.push("name");
        }
        if differs(self.color.as_ref(), &observed.color) {
            drifted.push("color");
        }
        if differs(self.hoist.as_ref(), &observed.hoist) {
            drifted.push("hoist");
        }
        if differs(self.mentionable.as_ref(), &observed.mentionable) {
            drifted.push("mentionable");
        }
        if self
            .permissions
            .as_deref()
            .is_some_and(|p| !same_permissions(p, &observed.permissions))
        {
            drifted.push("permissions");
        }
        if differs(self.position.as_ref(), &observed.position) {
            drifted.push("position");
        }

        drifted
    }

    /// Check whether no managed property has drifted.
    pub fn is_up_to_date(&self, observed: &RoleObservation) -> bool {
        self.drift(observed).is_empty()
    }
}

/// A managed property differs only when it is set and unequal.
fn differs<T: PartialEq + ?Sized>(desired: Option<&T>, observed: &T) -> bool {
    desired.is_some_and(|d| d != observed)
}

/// Permission strings compare numerically so "08" matches "8".
fn same_permissions(desired: &str, observed: &str) -> bool {
    match (desired.parse::<u64>(), observed.parse::<u64>()) {
        (Ok(d), Ok(o)) => d == o,
        _ => desired == observed,
    }
}

/// Observed state of the remote role, refreshed every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleObservation {
    /// Remote ID; doubles as the cached binding for crash recovery.
    pub id: String,
    pub name: String,
    pub color: u32,
    pub hoist: bool,
    pub mentionable: bool,
    pub permissions: String,
    pub position: i32,
    /// Owned by an integration. Informational only, never changed.
    pub managed: bool,
}

impl From<&Role> for RoleObservation {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id.clone(),
            name: role.name.clone(),
            color: role.color,
            hoist: role.hoist,
            mentionable: role.mentionable,
            permissions: role.permissions.clone(),
            position: role.position,
            managed: role.managed,
        }
    }
}

/// Outcome of Observe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalObservation {
    /// The remote role exists.
    pub resource_exists: bool,
    /// No managed property has drifted.
    pub resource_up_to_date: bool,
    /// Drifted property names, empty when up to date.
    pub drift: Vec<&'static str>,
}

impl ExternalObservation {
    /// The remote role does not exist (or is not known).
    pub const fn absent() -> Self {
        Self {
            resource_exists: false,
            resource_up_to_date: false,
            drift: Vec::new(),
        }
    }

    /// The remote role exists with the given drift.
    pub fn present(drift: Vec<&'static str>) -> Self {
        Self {
            resource_exists: true,
            resource_up_to_date: drift.is_empty(),
            drift,
        }
    }
}

/// A best-effort step after creation failed; the role exists and is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSuccessWarning {
    /// The property that could not be applied.
    pub property: &'static str,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for PartialSuccessWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created but could not apply {}: {}",
            self.property, self.reason
        )
    }
}

/// Outcome of Create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCreation {
    /// The new binding.
    pub external_name: String,
    /// Follow-up steps that failed without failing the creation.
    pub warnings: Vec<PartialSuccessWarning>,
}

/// Outcome of Update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalUpdate {
    /// Properties sent in the modify call.
    pub applied: Vec<&'static str>,
}

/// Outcome of Delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalDeletion {
    /// The remote role was deleted by this call.
    Deleted,
    /// Nothing to do: unbound, or already gone remotely.
    AlreadyGone,
    /// The deletion policy keeps the remote role; nothing was called.
    Orphaned,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed() -> RoleObservation {
        RoleObservation {
            id: "900".to_string(),
            name: "Admin".to_string(),
            color: 5,
            hoist: true,
            mentionable: false,
            permissions: "8".to_string(),
            position: 2,
            managed: false,
        }
    }

    #[test]
    fn unset_color_is_never_compared() {
        let desired = RoleParameters::new("1", "Admin").with_hoist(true);
        assert!(desired.is_up_to_date(&observed()));
    }

    #[test]
    fn set_color_that_differs_is_drift() {
        let desired = RoleParameters::new("1", "Admin").with_color(5);
        let mut remote = observed();
        remote.color = 7;
        assert_eq!(desired.drift(&remote), vec!["color"]);
        assert!(!desired.is_up_to_date(&remote));
    }

    #[test]
    fn unset_properties_tolerate_any_remote_value() {
        let desired = RoleParameters::new("1", "Admin");
        for (color, hoist, mentionable, position) in
            [(0, false, false, 0), (7, true, true, 9), (u32::MAX, true, false, -1)]
        {
            let remote = RoleObservation {
                color,
                hoist,
                mentionable,
                position,
                permissions: "1234".to_string(),
                ..observed()
            };
            assert!(desired.is_up_to_date(&remote));
        }
    }

    #[test]
    fn name_is_always_compared() {
        let desired = RoleParameters::new("1", "Moderator");
        assert_eq!(desired.drift(&observed()), vec!["name"]);
    }

    #[test]
    fn permissions_compare_numerically() {
        let desired = RoleParameters::new("1", "Admin").with_permissions("08");
        assert!(desired.is_up_to_date(&observed()));
        let desired = RoleParameters::new("1", "Admin").with_permissions("16");
        assert_eq!(desired.drift(&observed()), vec!["permissions"]);
    }

    #[test]
    fn create_request_leaves_out_position() {
        let desired = RoleParameters::new("1", "Admin")
            .with_position(3)
            .with_mentionable(true);
        let request = desired.create_request();
        assert_eq!(request.name, "Admin");
        assert_eq!(request.mentionable, Some(true));
        assert_eq!(request.color, None);
    }

    #[test]
    fn modify_request_always_carries_name() {
        let request = RoleParameters::new("1", "Admin").modify_request();
        assert_eq!(request.name.as_deref(), Some("Admin"));
        assert_eq!(request.position, None);
        assert_eq!(request.hoist, None);
    }

    #[test]
    fn validate_rejects_missing_guild_and_bad_permissions() {
        assert!(RoleParameters::new("", "Admin").validate().is_err());
        assert!(
            RoleParameters::new("1", "Admin")
                .with_permissions("ADMINISTRATOR")
                .validate()
                .is_err()
        );
        assert!(RoleParameters::new("1", "Admin").validate().is_ok());
    }

    #[test]
    fn observation_from_role_keeps_managed_flag() {
        let role = Role {
            id: "5".to_string(),
            name: "Bot".to_string(),
            color: 0,
            hoist: false,
            position: 1,
            permissions: "0".to_string(),
            managed: true,
            mentionable: false,
        };
        let observation = RoleObservation::from(&role);
        assert!(observation.managed);
        assert_eq!(observation.id, "5");
    }
}
