//! Managed object decoding and the connector contract.
//!
//! Manifests arrive as untyped documents. The [`KindRegistry`] maps each
//! `(apiVersion, kind)` pair to a decoder and is filled in explicitly at
//! start-up. A [`Connector`] turns a decoded object into a ready reconciler.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::reconciler::ExternalResource;
use crate::resource::{API_VERSION, ROLE_KIND, Role};

/// Passive kinds the export tool writes. They are recognised so the
/// controller does not warn about them, but nothing reconciles them.
pub const PASSIVE_KINDS: [&str; 3] = ["Channel", "Webhook", "Invite"];

/// A decoded manifest.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedObject {
    Role(Box<Role>),
    /// A recognised kind without a reconciler.
    Other {
        api_version: String,
        kind: String,
        name: String,
        raw: Value,
    },
}

impl ManagedObject {
    pub fn kind(&self) -> &str {
        match self {
            Self::Role(role) => &role.kind,
            Self::Other { kind, .. } => kind,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Role(role) => &role.metadata.name,
            Self::Other { name, .. } => name,
        }
    }

    pub fn as_role(&self) -> Option<&Role> {
        match self {
            Self::Role(role) => Some(&**role),
            Self::Other { .. } => None,
        }
    }

    pub fn as_role_mut(&mut self) -> Option<&mut Role> {
        match self {
            Self::Role(role) => Some(&mut **role),
            Self::Other { .. } => None,
        }
    }

    pub fn into_role(self) -> Option<Role> {
        match self {
            Self::Role(role) => Some(*role),
            Self::Other { .. } => None,
        }
    }
}

/// Narrow an object to a role, or fail with `WrongKind`.
pub fn expect_role(object: &ManagedObject) -> Result<&Role> {
    object
        .as_role()
        .ok_or_else(|| Error::wrong_kind(ROLE_KIND, object.kind()))
}

/// Builds a [`ManagedObject`] from a raw document.
pub type Decoder = fn(Value) -> std::result::Result<ManagedObject, serde_json::Error>;

fn decode_role(value: Value) -> std::result::Result<ManagedObject, serde_json::Error> {
    serde_json::from_value::<Role>(value).map(|role| ManagedObject::Role(Box::new(role)))
}

/// Decoder for kinds that are kept as raw documents.
pub fn decode_other(value: Value) -> std::result::Result<ManagedObject, serde_json::Error> {
    let field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_owned);
    let api_version = field("apiVersion").unwrap_or_default();
    let kind = field("kind").unwrap_or_default();
    let name = value
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    Ok(ManagedObject::Other {
        api_version,
        kind,
        name,
        raw: value,
    })
}

/// Explicit `(apiVersion, kind)` to decoder map.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    decoders: HashMap<(String, String), Decoder>,
}

impl KindRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the role kind and the passive exported kinds.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(API_VERSION, ROLE_KIND, decode_role);
        for kind in PASSIVE_KINDS {
            registry.register(API_VERSION, kind, decode_other);
        }
        registry
    }

    /// Register a decoder, replacing any previous one for the pair.
    pub fn register(
        &mut self,
        api_version: impl Into<String>,
        kind: impl Into<String>,
        decoder: Decoder,
    ) {
        self.decoders
            .insert((api_version.into(), kind.into()), decoder);
    }

    pub fn is_registered(&self, api_version: &str, kind: &str) -> bool {
        self.decoders
            .contains_key(&(api_version.to_string(), kind.to_string()))
    }

    /// Decode a document. Returns `None` for unregistered kinds.
    pub fn decode(&self, value: Value) -> Result<Option<ManagedObject>> {
        let api_version = value
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let Some(decoder) = self.decoders.get(&(api_version, kind.clone())) else {
            debug!(kind = %kind, "No decoder registered");
            return Ok(None);
        };

        let name = value
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_string();
        decoder(value)
            .map(Some)
            .map_err(|e| Error::invalid_spec(name, e.to_string()))
    }
}

/// Resolves configuration and credentials for a record and returns a
/// reconciler bound to them.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Fails with `WrongKind` for non-role objects and `ConfigResolution`
    /// for any later stage.
    async fn connect(
        &self,
        ctx: &Context,
        object: &ManagedObject,
    ) -> Result<Box<dyn ExternalResource<Role>>>;
}
