//! Export and dedupe against a mocked Discord API.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use discord_api::{DiscordClient, DiscordConfig};
use discord_provider::dedupe;
use discord_provider::export::{ExportKinds, export_guild};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn client(server: &MockServer) -> Result<DiscordClient, discord_api::Error> {
    let config = DiscordConfig::with_base_url(format!("{}/api/v10/", server.uri())).max_retries(0);
    DiscordClient::with_config("test-token", config)
}

async fn mock_get(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn channel(id: &str, kind: u8, name: &str, position: i32) -> serde_json::Value {
    json!({ "id": id, "type": kind, "name": name, "position": position })
}

/// Given a guild with @everyone, a bot role and one regular role
/// When only roles are exported
/// Then a single bound manifest is written under the guild slug
#[tokio::test]
async fn export_writes_bound_role_manifests() -> TestResult {
    let server = MockServer::start().await;
    mock_get(&server, "/api/v10/guilds/100", json!({ "id": "100", "name": "Test Guild" })).await;
    mock_get(
        &server,
        "/api/v10/guilds/100/roles",
        json!([
            { "id": "100", "name": "@everyone", "color": 0, "hoist": false, "position": 0,
              "permissions": "0", "managed": false, "mentionable": false },
            { "id": "200", "name": "Some Bot", "color": 0, "hoist": false, "position": 1,
              "permissions": "8", "managed": true, "mentionable": false },
            { "id": "300", "name": "Moderators", "color": 5, "hoist": true, "position": 2,
              "permissions": "8", "managed": false, "mentionable": true }
        ]),
    )
    .await;

    let out = tempfile::tempdir()?;
    let summary = export_guild(
        &client(&server)?,
        "100",
        out.path(),
        ExportKinds::from_flags(true, false, false, false),
    )
    .await?;

    assert_eq!(summary.roles, 1);
    assert_eq!(summary.skipped_roles, 2);
    assert_eq!(summary.guild_dir, out.path().join("test-guild"));

    let written = std::fs::read_to_string(out.path().join("test-guild/roles/moderators.yaml"))?;
    let manifest: serde_json::Value = serde_yaml::from_str(&written)?;
    assert_eq!(manifest["kind"], "Role");
    assert_eq!(
        manifest["metadata"]["annotations"]["crossplane.io/external-name"],
        "300"
    );
    assert_eq!(manifest["spec"]["forProvider"]["name"], "Moderators");
    assert!(!out.path().join("test-guild/channels").exists());
    Ok(())
}

/// Given channels whose names repeat
/// When every kind is exported
/// Then file names stay unique by falling back to the channel ID
#[tokio::test]
async fn export_disambiguates_repeated_names() -> TestResult {
    let server = MockServer::start().await;
    mock_get(&server, "/api/v10/guilds/100", json!({ "id": "100", "name": "Test Guild" })).await;
    mock_get(&server, "/api/v10/guilds/100/roles", json!([])).await;
    mock_get(&server, "/api/v10/guilds/100/webhooks", json!([])).await;
    mock_get(&server, "/api/v10/guilds/100/invites", json!([])).await;
    mock_get(
        &server,
        "/api/v10/guilds/100/channels",
        json!([channel("1", 0, "general", 0), channel("2", 0, "general", 1)]),
    )
    .await;

    let out = tempfile::tempdir()?;
    let summary = export_guild(&client(&server)?, "100", out.path(), ExportKinds::all()).await?;

    assert_eq!(summary.channels, 2);
    let dir = out.path().join("test-guild/channels");
    assert!(dir.join("general.yaml").exists());
    assert!(dir.join("general-2.yaml").exists());
    Ok(())
}

/// Given two text channels and a category all named "general", plus "random"
/// When the plan is executed
/// Then every "general" but the top-most is deleted and "random" is kept
#[tokio::test]
async fn dedupe_deletes_only_the_duplicates() -> TestResult {
    let server = MockServer::start().await;
    mock_get(
        &server,
        "/api/v10/guilds/100/channels",
        json!([
            channel("10", 0, "general", 0),
            channel("20", 0, "general", 4),
            channel("30", 4, "general", 1),
            channel("40", 0, "random", 2)
        ]),
    )
    .await;
    for (id, kind, position) in [("20", 0, 4), ("30", 4, 1)] {
        Mock::given(method("DELETE"))
            .and(path(format!("/api/v10/channels/{id}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(channel(id, kind, "general", position)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = client(&server)?;
    let plan = dedupe::plan(&client, "100").await?;
    let report = dedupe::execute(&client, &plan).await;

    assert_eq!(report.deleted, vec!["30".to_string(), "20".to_string()]);
    assert!(report.failed.is_empty());
    Ok(())
}

/// Given a delete that Discord refuses
/// When the plan is executed
/// Then the failure is reported and nothing aborts
#[tokio::test]
async fn dedupe_collects_delete_failures() -> TestResult {
    let server = MockServer::start().await;
    mock_get(
        &server,
        "/api/v10/guilds/100/channels",
        json!([channel("10", 0, "general", 0), channel("20", 0, "general", 1)]),
    )
    .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v10/channels/20"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "code": 50013, "message": "Missing Permissions" })),
        )
        .mount(&server)
        .await;

    let client = client(&server)?;
    let plan = dedupe::plan(&client, "100").await?;
    let report = dedupe::execute(&client, &plan).await;

    assert!(report.deleted.is_empty());
    assert!(matches!(report.failed.as_slice(), [(id, _)] if id == "20"));
    Ok(())
}
