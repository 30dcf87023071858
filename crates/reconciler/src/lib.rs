//! Declarative reconciliation of Discord roles.
//!
//! A `Role` record declares what a guild role should look like. The
//! reconciler compares it against the live role and converges it:
//!
//! - **Observe**: does the bound role exist, and has any managed property drifted?
//! - **Create**: create the role and bind its ID to the record
//! - **Update**: push the managed properties to the bound role
//! - **Delete**: remove the bound role (idempotent)
//!
//! # Key Concepts
//!
//! ## External name
//!
//! The remote ID lives in the `crossplane.io/external-name` annotation. Without
//! it (and without an ID cached on status) the role is treated as not created.
//!
//! ## Optional properties
//!
//! Color, hoist, mentionable, permissions and position are only sent and only
//! compared when set. Leaving them unset lets anyone change them freely.
//!
//! # Example
//!
//! ```ignore
//! use discord_reconciler::{Context, ExternalResource, Role, RoleParameters, RoleReconciler};
//!
//! let reconciler = RoleReconciler::new(discord_client);
//! let mut role = Role::new("admin", RoleParameters::new("81384788765712384", "Admin"));
//!
//! let ctx = Context::background();
//! if !reconciler.observe(&ctx, &mut role).await?.resource_exists {
//!     reconciler.create(&ctx, &mut role).await?;
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod client;
pub mod connector;
pub mod context;
pub mod error;
pub mod memory;
pub mod reconciler;
pub mod resource;
pub mod types;

// Re-export main types
pub use client::{RemoteError, RoleClient};
pub use connector::{
    Connector, Decoder, KindRegistry, ManagedObject, PASSIVE_KINDS, decode_other, expect_role,
};
pub use context::{Context, Interrupted};
pub use error::{ConnectStage, Error, Operation, Result};
pub use memory::InMemoryRoleClient;
pub use reconciler::{ExternalResource, RoleReconciler};
pub use resource::{
    API_VERSION, Condition, ConditionStatus, ConditionType, DEFAULT_PROVIDER_CONFIG,
    DeletionPolicy, EXTERNAL_NAME_ANNOTATION, Managed, ObjectMeta, ProviderConfigReference,
    ROLE_KIND, Role, RoleRecord, RoleSpec, RoleStatus,
};
pub use types::{
    ExternalCreation, ExternalDeletion, ExternalObservation, ExternalUpdate,
    PartialSuccessWarning, RoleObservation, RoleParameters,
};
