//! Filtered configuration view

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::Application;

/// `${key}` placeholder
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("Invalid placeholder regex"));

/// Flat key/value mapping injected into wrapped resources in place of the
/// full configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredView {
    properties: BTreeMap<String, String>,
}

impl FilteredView {
    pub fn new() -> Self {
        Self::default()
    }

    /// `application.id`, `application.name` and `application.dir`.
    pub fn for_application(app: &Application) -> Self {
        Self::new()
            .with("application.id", app.id())
            .with("application.name", app.name())
            .with("application.dir", app.directory().display().to_string())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy of `value` with `${key}` placeholders in every string replaced.
    /// Unknown placeholders are left as written; object keys are untouched.
    pub fn filter(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.substitute(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.filter(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.filter(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn substitute(&self, text: &str) -> String {
        PLACEHOLDER
            .replace_all(text, |caps: &Captures| match self.properties.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}
