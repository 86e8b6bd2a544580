//! Typed read of the configuration tree

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

/// File name of an application's configuration inside its directory.
pub const CONFIG_FILE: &str = "application.json";

/// Credentials of one client application, from the `clients` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: String,
    pub client_type: String,
    pub security_key: String,
}

/// One entry of the `resources` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    pub id: String,
    /// Id of the extension providing the resource (`type`)
    pub extension: Option<String>,
    pub config: Value,
}

/// The recognized top-level keys of `application.json`.
///
/// Reading is lenient: values of the wrong type are logged and replaced by
/// their defaults. Unknown keys stay in the tree and are ignored here.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationConfig {
    pub id: Option<String>,
    pub name: Option<String>,
    pub html_app: Option<String>,
    pub visible: bool,
    pub resources: Vec<ResourceEntry>,
    pub clients: BTreeMap<String, ClientRecord>,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            html_app: None,
            visible: true,
            resources: Vec::new(),
            clients: BTreeMap::new(),
        }
    }
}

impl ApplicationConfig {
    pub fn from_tree(tree: &Value) -> Self {
        let Some(root) = tree.as_object() else {
            tracing::warn!("Application configuration is not an object, using defaults");
            return Self::default();
        };

        Self {
            id: string_field(root, "id"),
            name: string_field(root, "name"),
            html_app: string_field(root, "html-app"),
            visible: match root.get("visible") {
                None | Some(Value::Null) => true,
                Some(Value::Bool(visible)) => *visible,
                Some(other) => {
                    tracing::warn!(value = %other, "'visible' is not a boolean, defaulting to true");
                    true
                }
            },
            resources: object_field(root, "resources")
                .map(read_resources)
                .unwrap_or_default(),
            clients: object_field(root, "clients")
                .map(read_clients)
                .unwrap_or_default(),
        }
    }

    pub fn resource(&self, id: &str) -> Option<&ResourceEntry> {
        self.resources.iter().find(|entry| entry.id == id)
    }
}

/// The minimal tree written for an application without configuration.
pub fn default_tree(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "resources": {},
    })
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(value) => Some(value.clone()),
        Value::Null => None,
        other => {
            tracing::warn!(key, value = %other, "Expected a string, ignoring");
            None
        }
    }
}

fn object_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    match object.get(key)? {
        Value::Object(value) => Some(value),
        Value::Null => None,
        other => {
            tracing::warn!(key, value = %other, "Expected an object, ignoring");
            None
        }
    }
}

fn read_resources(resources: &Map<String, Value>) -> Vec<ResourceEntry> {
    resources
        .iter()
        .filter_map(|(id, entry)| {
            let Some(entry) = entry.as_object() else {
                tracing::warn!(resource = %id, "Resource entry is not an object, skipping");
                return None;
            };
            Some(ResourceEntry {
                id: id.clone(),
                extension: string_field(entry, "type"),
                config: object_field(entry, "config")
                    .map(|config| Value::Object(config.clone()))
                    .unwrap_or_else(|| Value::Object(Map::new())),
            })
        })
        .collect()
}

fn read_clients(clients: &Map<String, Value>) -> BTreeMap<String, ClientRecord> {
    clients
        .iter()
        .filter_map(|(id, client)| {
            let record = client.as_object().and_then(|client| {
                Some(ClientRecord {
                    id: id.clone(),
                    client_type: client.get("type")?.as_str()?.to_string(),
                    security_key: client.get("security-key")?.as_str()?.to_string(),
                })
            });
            if record.is_none() {
                tracing::warn!(client = %id, "Client entry needs string 'type' and 'security-key', skipping");
            }
            record.map(|record| (id.clone(), record))
        })
        .collect()
}
