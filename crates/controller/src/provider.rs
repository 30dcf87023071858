//! Provider configs, secrets and the connector that turns them into clients.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use discord_api::{DiscordClient, DiscordConfig};
use discord_reconciler::{
    ConnectStage, Connector, Context, Error as ReconcileError, ExternalResource, Managed,
    ManagedObject, ObjectMeta, Operation, Role, RoleClient, RoleReconciler, expect_role,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kind of provider config manifests.
pub const PROVIDER_CONFIG_KIND: &str = "ProviderConfig";

/// Kind and API version of secret manifests.
pub const SECRET_KIND: &str = "Secret";
pub const SECRET_API_VERSION: &str = "v1";

/// Where the bot token comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialsSource {
    Secret,
    Environment,
}

/// Key inside a named secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

/// Environment variable holding the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSelector {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    pub source: CredentialsSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeySelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfigSpec {
    pub credentials: ProviderCredentials,
}

/// Connection settings shared by the records that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ProviderConfigSpec,
}

/// A secret manifest. Plain `stringData` wins over base64 `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub string_data: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    /// Value stored under `key`, decoding `data` entries from base64.
    pub fn value(&self, key: &str) -> Result<Option<String>, String> {
        if let Some(value) = self.string_data.get(key) {
            return Ok(Some(value.clone()));
        }
        let Some(encoded) = self.data.get(key) else {
            return Ok(None);
        };
        let bytes = BASE64.decode(encoded.trim()).map_err(|e| {
            format!("secret '{}' key '{key}' is not valid base64: {e}", self.metadata.name)
        })?;
        String::from_utf8(bytes).map(Some).map_err(|e| {
            format!("secret '{}' key '{key}' is not UTF-8: {e}", self.metadata.name)
        })
    }
}

/// Builds a role client around a bot token.
pub trait ClientFactory: Send + Sync {
    fn build(&self, token: &str) -> Result<Arc<dyn RoleClient>, String>;
}

/// Builds real Discord clients.
#[derive(Debug, Clone, Default)]
pub struct DiscordClientFactory {
    config: DiscordConfig,
}

impl DiscordClientFactory {
    pub const fn new(config: DiscordConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for DiscordClientFactory {
    fn build(&self, token: &str) -> Result<Arc<dyn RoleClient>, String> {
        DiscordClient::with_config(token, self.config.clone())
            .map(|client| Arc::new(client) as Arc<dyn RoleClient>)
            .map_err(|e| e.to_string())
    }
}

impl<F> ClientFactory for F
where
    F: Fn(&str) -> Result<Arc<dyn RoleClient>, String> + Send + Sync,
{
    fn build(&self, token: &str) -> Result<Arc<dyn RoleClient>, String> {
        self(token)
    }
}

/// Reads an environment variable.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The process environment.
pub fn process_env() -> EnvLookup {
    Arc::new(|key: &str| std::env::var(key).ok())
}

/// Connector resolving provider configs and secrets loaded from manifests.
#[derive(Clone)]
pub struct ProviderConnector {
    configs: HashMap<String, ProviderConfig>,
    secrets: HashMap<String, Secret>,
    factory: Arc<dyn ClientFactory>,
    env: EnvLookup,
}

impl fmt::Debug for ProviderConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConnector")
            .field("configs", &self.configs.keys().collect::<Vec<_>>())
            .field("secrets", &self.secrets.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ProviderConnector {
    pub fn new(
        configs: HashMap<String, ProviderConfig>,
        secrets: HashMap<String, Secret>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            configs,
            secrets,
            factory,
            env: process_env(),
        }
    }

    #[must_use]
    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    fn resolve_config(&self, role: &Role) -> Result<&ProviderConfig, ReconcileError> {
        let name = role.provider_config_name();
        self.configs.get(name).ok_or_else(|| {
            ReconcileError::config_resolution(
                ConnectStage::ResolveProviderConfig,
                format!("provider config '{name}' not found"),
            )
        })
    }

    fn extract_token(&self, config: &ProviderConfig) -> Result<String, ReconcileError> {
        let fail = |reason: String| {
            ReconcileError::config_resolution(ConnectStage::ExtractCredentials, reason)
        };
        let credentials = &config.spec.credentials;

        let token = match credentials.source {
            CredentialsSource::Secret => {
                let selector = credentials.secret_ref.as_ref().ok_or_else(|| {
                    fail(format!(
                        "provider config '{}' uses a Secret source without secretRef",
                        config.metadata.name
                    ))
                })?;
                let secret = self
                    .secrets
                    .get(&selector.name)
                    .ok_or_else(|| fail(format!("secret '{}' not found", selector.name)))?;
                secret.value(&selector.key).map_err(fail)?.ok_or_else(|| {
                    fail(format!(
                        "secret '{}' has no key '{}'",
                        selector.name, selector.key
                    ))
                })?
            }
            CredentialsSource::Environment => {
                let selector = credentials.env.as_ref().ok_or_else(|| {
                    fail(format!(
                        "provider config '{}' uses an Environment source without env",
                        config.metadata.name
                    ))
                })?;
                (self.env)(&selector.name).ok_or_else(|| {
                    fail(format!("environment variable '{}' is not set", selector.name))
                })?
            }
        };

        let token = token.trim();
        if token.is_empty() {
            return Err(fail(format!(
                "credentials of provider config '{}' are empty",
                config.metadata.name
            )));
        }
        Ok(token.to_string())
    }
}

#[async_trait]
impl Connector for ProviderConnector {
    async fn connect(
        &self,
        ctx: &Context,
        object: &ManagedObject,
    ) -> Result<Box<dyn ExternalResource<Role>>, ReconcileError> {
        let role = expect_role(object)?;
        if ctx.interrupted().is_some() {
            return Err(ReconcileError::Cancelled {
                operation: Operation::Connect,
                resource: role.metadata.name.clone(),
            });
        }

        let config = self.resolve_config(role)?;
        let token = self.extract_token(config)?;
        let client = self.factory.build(&token).map_err(|reason| {
            ReconcileError::config_resolution(ConnectStage::BuildClient, reason)
        })?;

        debug!(
            resource = role.metadata.name.as_str(),
            provider_config = config.metadata.name.as_str(),
            "Connected"
        );
        Ok(Box::new(RoleReconciler::new(client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discord_reconciler::{InMemoryRoleClient, RoleParameters};

    fn memory_factory() -> Arc<dyn ClientFactory> {
        let client: Arc<dyn RoleClient> = Arc::new(InMemoryRoleClient::new());
        Arc::new(move |_: &str| Ok::<_, String>(client.clone()))
    }

    fn secret_config(secret: &str, key: &str) -> ProviderConfig {
        ProviderConfig {
            api_version: discord_reconciler::API_VERSION.to_string(),
            kind: PROVIDER_CONFIG_KIND.to_string(),
            metadata: ObjectMeta::named("default"),
            spec: ProviderConfigSpec {
                credentials: ProviderCredentials {
                    source: CredentialsSource::Secret,
                    secret_ref: Some(SecretKeySelector {
                        name: secret.to_string(),
                        key: key.to_string(),
                    }),
                    env: None,
                },
            },
        }
    }

    fn secret(name: &str, key: &str, value: &str) -> Secret {
        Secret {
            api_version: SECRET_API_VERSION.to_string(),
            kind: SECRET_KIND.to_string(),
            metadata: ObjectMeta::named(name),
            string_data: BTreeMap::from([(key.to_string(), value.to_string())]),
            data: BTreeMap::new(),
        }
    }

    fn connector(configs: Vec<ProviderConfig>, secrets: Vec<Secret>) -> ProviderConnector {
        ProviderConnector::new(
            configs
                .into_iter()
                .map(|c| (c.metadata.name.clone(), c))
                .collect(),
            secrets
                .into_iter()
                .map(|s| (s.metadata.name.clone(), s))
                .collect(),
            memory_factory(),
        )
    }

    fn role_object() -> ManagedObject {
        ManagedObject::Role(Box::new(Role::new(
            "admin",
            RoleParameters::new("1", "Admin"),
        )))
    }

    async fn stage_of(connector: &ProviderConnector, object: &ManagedObject) -> Option<ConnectStage> {
        match connector.connect(&Context::background(), object).await {
            Err(ReconcileError::ConfigResolution { stage, .. }) => Some(stage),
            _ => None,
        }
    }

    /// Given a secret-backed provider config with its secret
    /// When a role connects
    /// Then a reconciler is returned
    #[tokio::test]
    async fn connects_with_secret_credentials() {
        let connector = connector(
            vec![secret_config("discord", "token")],
            vec![secret("discord", "token", "abc\n")],
        );

        let result = connector.connect(&Context::background(), &role_object()).await;

        assert!(result.is_ok());
    }

    /// Given a secret that only carries base64 `data`
    /// When a role connects
    /// Then the decoded token is used
    #[tokio::test]
    async fn connects_with_base64_secret_data() -> Result<(), serde_yaml::Error> {
        let secret: Secret = serde_yaml::from_str(
            r"
apiVersion: v1
kind: Secret
metadata:
  name: discord
data:
  token: YWJjCg==
",
        )?;
        assert_eq!(secret.value("token"), Ok(Some("abc\n".to_string())));

        let connector = connector(vec![secret_config("discord", "token")], vec![secret]);
        let result = connector.connect(&Context::background(), &role_object()).await;

        assert!(result.is_ok());
        Ok(())
    }

    #[test]
    fn string_data_wins_and_bad_base64_is_reported() {
        let mut both = secret("discord", "token", "plain");
        both.data.insert("token".to_string(), "b3RoZXI=".to_string());
        assert_eq!(both.value("token"), Ok(Some("plain".to_string())));

        let mut broken = secret("discord", "other", "x");
        broken.data.insert("token".to_string(), "not base64!".to_string());
        assert!(broken.value("token").is_err());
        assert_eq!(broken.value("missing"), Ok(None));
    }

    #[tokio::test]
    async fn non_role_objects_are_wrong_kind() {
        let connector = connector(vec![], vec![]);
        let object = ManagedObject::Other {
            api_version: discord_reconciler::API_VERSION.to_string(),
            kind: "Channel".to_string(),
            name: "general".to_string(),
            raw: serde_json::Value::Null,
        };

        let result = connector.connect(&Context::background(), &object).await;

        assert!(matches!(result, Err(ReconcileError::WrongKind { .. })));
    }

    #[tokio::test]
    async fn missing_provider_config_fails_resolution() {
        let connector = connector(vec![], vec![]);
        assert_eq!(
            stage_of(&connector, &role_object()).await,
            Some(ConnectStage::ResolveProviderConfig)
        );
    }

    #[tokio::test]
    async fn missing_secret_key_or_empty_token_fail_extraction() {
        let missing_secret = connector(vec![secret_config("discord", "token")], vec![]);
        let missing_key = connector(
            vec![secret_config("discord", "token")],
            vec![secret("discord", "other", "abc")],
        );
        let empty_token = connector(
            vec![secret_config("discord", "token")],
            vec![secret("discord", "token", "  ")],
        );

        for connector in [missing_secret, missing_key, empty_token] {
            assert_eq!(
                stage_of(&connector, &role_object()).await,
                Some(ConnectStage::ExtractCredentials)
            );
        }
    }

    #[tokio::test]
    async fn environment_credentials_use_the_lookup() {
        let mut config = secret_config("unused", "unused");
        config.spec.credentials = ProviderCredentials {
            source: CredentialsSource::Environment,
            secret_ref: None,
            env: Some(EnvSelector {
                name: "BOT_TOKEN".to_string(),
            }),
        };
        let with_token = connector(vec![config.clone()], vec![]).with_env_lookup(Arc::new(
            |key: &str| (key == "BOT_TOKEN").then(|| "abc".to_string()),
        ));
        let without_token =
            connector(vec![config], vec![]).with_env_lookup(Arc::new(|_: &str| None));

        assert!(
            with_token
                .connect(&Context::background(), &role_object())
                .await
                .is_ok()
        );
        assert_eq!(
            stage_of(&without_token, &role_object()).await,
            Some(ConnectStage::ExtractCredentials)
        );
    }

    #[tokio::test]
    async fn factory_failure_is_build_client_stage() {
        let failing: Arc<dyn ClientFactory> =
            Arc::new(|_: &str| Err::<Arc<dyn RoleClient>, String>("bad token".to_string()));
        let connector = ProviderConnector::new(
            HashMap::from([("default".to_string(), secret_config("discord", "token"))]),
            HashMap::from([("discord".to_string(), secret("discord", "token", "abc"))]),
            failing,
        );

        assert_eq!(
            stage_of(&connector, &role_object()).await,
            Some(ConnectStage::BuildClient)
        );
    }

    #[test]
    fn provider_config_manifest_decodes() -> Result<(), serde_yaml::Error> {
        let config: ProviderConfig = serde_yaml::from_str(
            r"
apiVersion: discord.crossplane.io/v1alpha1
kind: ProviderConfig
metadata:
  name: default
spec:
  credentials:
    source: Secret
    secretRef:
      name: discord-token
      key: token
",
        )?;
        assert_eq!(config.spec.credentials.source, CredentialsSource::Secret);
        assert_eq!(
            config.spec.credentials.secret_ref.map(|s| s.key),
            Some("token".to_string())
        );
        Ok(())
    }
}
