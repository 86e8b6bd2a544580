//! [`TestApps`]: a temporary applications directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;
use tenancy_core::ServerConfig;

/// Temporary directory holding one sub-directory per application.
///
/// # Example
///
/// ```rust,no_run
/// use tenancy_test_utils::TestApps;
///
/// let apps = TestApps::new();
/// apps.write_config("demo", &serde_json::json!({"id": "demo"}));
/// let config = apps.server_config();
/// ```
pub struct TestApps {
    temp_dir: TempDir,
}

impl Default for TestApps {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApps {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn app_dir(&self, id: &str) -> PathBuf {
        self.root().join(id)
    }

    pub fn config_path(&self, id: &str) -> PathBuf {
        self.app_dir(id).join("application.json")
    }

    /// Server configuration using this directory for applications.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::default().with_applications_dir(self.root())
    }

    /// Write `application.json` for `id`.
    pub fn write_config(&self, id: &str, tree: &Value) {
        fs::create_dir_all(self.app_dir(id)).unwrap();
        fs::write(
            self.config_path(id),
            serde_json::to_string_pretty(tree).unwrap(),
        )
        .unwrap();
    }

    /// Write raw bytes as `application.json` for `id`.
    pub fn write_raw_config(&self, id: &str, content: &str) {
        fs::create_dir_all(self.app_dir(id)).unwrap();
        fs::write(self.config_path(id), content).unwrap();
    }

    pub fn read_config(&self, id: &str) -> String {
        let path = self.config_path(id);
        fs::read_to_string(&path)
            .unwrap_or_else(|_| panic!("Could not read file: {}", path.display()))
    }

    pub fn read_json(&self, id: &str) -> Value {
        serde_json::from_str(&self.read_config(id)).unwrap()
    }

    /// # Panics
    /// Panics with a descriptive message if the file does not exist.
    pub fn assert_config_exists(&self, id: &str) {
        let path = self.config_path(id);
        assert!(path.exists(), "Expected file to exist: {}", path.display());
    }
}
