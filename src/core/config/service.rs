use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use crate::core::errors::ApiError;

/// Loads and merges the public config file with the local secrets file.
///
/// Lookup order for the config file: `ADA_CONFIG_PATH`, then
/// `<user_data_dir>/config.yml`, then `<project_root>/config.yml`.
/// Secrets always come from `<user_data_dir>/secrets.yaml` and win on
/// key conflicts.
#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("ADA_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn load_config(&self) -> Result<Value, ApiError> {
        let public_config = load_yaml_file(&self.config_path());
        let secrets_config = load_yaml_file(&self.paths.secrets_path);
        Ok(deep_merge(&public_config, &secrets_config))
    }

    /// The OpenAI API key, from the environment or from secrets.yaml.
    ///
    /// Startup fails without one; handlers never reach this path unset.
    pub fn openai_api_key(&self) -> Result<String, ApiError> {
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }

        self.load_config()?
            .get("openai")
            .and_then(|v| v.get("api_key"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                ApiError::Internal(
                    "OPENAI_API_KEY is not set and openai.api_key is missing from secrets.yaml"
                        .to_string(),
                )
            })
    }

    pub fn server_port(&self) -> u16 {
        self.get_u64(&["server", "port"]).unwrap_or(8000) as u16
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.get_string_list(&["server", "cors_allowed_origins"])
    }

    pub fn chat_model(&self) -> String {
        self.get_string(&["openai", "chat_model"])
            .unwrap_or_else(|| "gpt-4o".to_string())
    }

    pub fn embeddings_model(&self) -> String {
        self.get_string(&["openai", "embeddings_model"])
            .unwrap_or_else(|| "text-embedding-3-small".to_string())
    }

    pub fn openai_base_url(&self) -> String {
        self.get_string(&["openai", "base_url"])
            .unwrap_or_else(|| "https://api.openai.com".to_string())
    }

    pub fn temperature(&self) -> f64 {
        self.get_f64(&["openai", "temperature"]).unwrap_or(0.7)
    }

    pub fn session_expiry_minutes(&self) -> u64 {
        self.get_u64(&["sessions", "expiry_minutes"]).unwrap_or(30)
    }

    pub fn max_sessions(&self) -> usize {
        self.get_u64(&["sessions", "max_sessions"]).unwrap_or(1000) as usize
    }

    fn get_value(&self, path: &[&str]) -> Option<Value> {
        let mut current = self.load_config().ok()?;
        for key in path {
            current = current.get(key)?.clone();
        }
        Some(current)
    }

    fn get_string(&self, path: &[&str]) -> Option<String> {
        self.get_value(path)?.as_str().map(|s| s.to_string())
    }

    fn get_u64(&self, path: &[&str]) -> Option<u64> {
        self.get_value(path)?.as_u64()
    }

    fn get_f64(&self, path: &[&str]) -> Option<f64> {
        self.get_value(path)?.as_f64()
    }

    fn get_string_list(&self, path: &[&str]) -> Vec<String> {
        self.get_value(path)
            .and_then(|value| value.as_array().cloned())
            .map(|list| {
                list.iter()
                    .filter_map(|item| item.as_str())
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| item.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => Value::Object(Map::new()),
            Err(err) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), err);
                Value::Object(Map::new())
            }
        },
        Err(err) => {
            tracing::warn!("Failed to read {}: {}", path.display(), err);
            Value::Object(Map::new())
        }
    }
}

fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let entry = merged.entry(key.clone()).or_insert(Value::Null);
                *entry = deep_merge(entry, value);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}
