//! Traffic manager values derived from the client configuration

use serde_json::{Map, Value as JsonValue, json};
use tether_core::config::DEFAULT_APP_PROTOCOL_STRATEGY;
use tether_core::{ClientConfig, Values};

/// Compute the default values of the traffic manager release
///
/// `client_version` is the version of this client, with or without a
/// leading `v`; the manager image is pinned to the same version.
pub fn traffic_manager_values(config: &ClientConfig, client_version: &str) -> Values {
    let mut values = Map::new();

    values.insert(
        "image".to_string(),
        json!({
            "registry": config.images.registry,
            "tag": client_version.trim_start_matches('v'),
        }),
    );
    values.insert("systemaHost".to_string(), json!(config.cloud.systema_host));
    values.insert("systemaPort".to_string(), json!(config.cloud.systema_port));

    if let Some(size) = &config.grpc.max_receive_size {
        values.insert("grpc".to_string(), json!({ "maxReceiveSize": size }));
    }

    if config.images.agent_image.is_some() || config.images.webhook_registry.is_some() {
        let mut image = Map::new();
        if let Some(agent_image) = &config.images.agent_image {
            let (name, tag) = agent_image.split_once(':').unwrap_or((agent_image, ""));
            image.insert("name".to_string(), json!(name));
            image.insert("tag".to_string(), json!(tag));
        }
        if let Some(registry) = &config.images.webhook_registry {
            image.insert("registry".to_string(), json!(registry));
        }
        values.insert("agent".to_string(), json!({ "image": image }));
    }

    if config.intercept.app_protocol_strategy != DEFAULT_APP_PROTOCOL_STRATEGY {
        values.insert(
            "agentInjector".to_string(),
            json!({ "appProtocolStrategy": config.intercept.app_protocol_strategy }),
        );
    }

    if config.api.port != 0 {
        values.insert(
            "telepresenceAPI".to_string(),
            json!({ "port": config.api.port }),
        );
    }

    Values(JsonValue::Object(values))
}
