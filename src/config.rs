//! Client settings.
//!
//! Settings arrive as `initializationOptions` or through
//! `workspace/didChangeConfiguration`, either flat or nested under an
//! `interlisLsp` section:
//!
//! ```json
//! { "interlisLsp": { "modelRepositories": "http://models.interlis.ch/;/home/me/models" } }
//! ```

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Repositories used when the client configures none.
pub const DEFAULT_MODEL_REPOSITORIES: &str = "http://models.interlis.ch/";

/// Compiler executable used when neither the settings nor the environment
/// name one.
pub const DEFAULT_COMPILER_COMMAND: &str = "ili2c-symbols";

/// Environment variable consulted for the compiler executable.
pub const COMPILER_ENV_VAR: &str = "INTERLIS_COMPILER";

const SETTINGS_SECTION: &str = "interlisLsp";

/// Placeholders understood by the Java tooling that have no meaning here.
const IGNORED_REPOSITORIES: &[&str] = &["%ILI_DIR", "%JAR_DIR"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Model repositories separated by `;` or `,`
    #[serde(deserialize_with = "string_or_list")]
    pub model_repositories: String,
    /// Log repository fetch failures at debug level only
    #[serde(deserialize_with = "lenient_bool")]
    pub suppress_repository_logs: bool,
    /// Compiler executable override
    pub compiler_command: Option<String>,
    /// Remove the caret marker from auto-close edits. Off for clients that
    /// place the cursor at the marker themselves.
    #[serde(deserialize_with = "lenient_bool")]
    pub strip_caret_sentinel: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            model_repositories: String::new(),
            suppress_repository_logs: true,
            compiler_command: None,
            strip_caret_sentinel: false,
        }
    }
}

impl ClientSettings {
    /// Parse settings from a client payload, falling back to defaults.
    pub fn from_value(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };

        let section = value.get(SETTINGS_SECTION).unwrap_or(value);
        if !section.is_object() {
            return Self::default();
        }

        match serde_json::from_value(section.clone()) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring malformed client settings: {}", e);
                Self::default()
            }
        }
    }

    /// Repository locations in configured order, without duplicates.
    pub fn repositories(&self) -> Vec<String> {
        let raw = if self.model_repositories.trim().is_empty() {
            DEFAULT_MODEL_REPOSITORIES
        } else {
            self.model_repositories.as_str()
        };

        let mut repositories: Vec<String> = Vec::new();
        for entry in raw.split([';', ',']) {
            let entry = entry.trim();
            if entry.is_empty() || IGNORED_REPOSITORIES.contains(&entry) {
                continue;
            }
            if !repositories.iter().any(|r| r == entry) {
                repositories.push(entry.to_string());
            }
        }
        repositories
    }

    /// Key identifying the repository configuration.
    ///
    /// Model discovery re-reads repositories only when this changes.
    pub fn repository_key(&self) -> String {
        self.repositories().join(";")
    }

    /// Compiler executable: settings, then environment, then the default.
    pub fn compiler_command(&self) -> String {
        self.compiler_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .or_else(|| {
                std::env::var(COMPILER_ENV_VAR)
                    .ok()
                    .filter(|c| !c.trim().is_empty())
            })
            .unwrap_or_else(|| DEFAULT_COMPILER_COMMAND.to_string())
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(";"),
        other => other.to_string(),
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => !s.trim().eq_ignore_ascii_case("false"),
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = ClientSettings::from_value(None);
        assert!(settings.suppress_repository_logs);
        assert!(!settings.strip_caret_sentinel);
        assert_eq!(settings.repositories(), vec![DEFAULT_MODEL_REPOSITORIES]);
    }

    #[test]
    fn test_nested_section() {
        let value = json!({
            "interlisLsp": {
                "modelRepositories": "http://a.example/; /tmp/models ,http://a.example/",
                "suppressRepositoryLogs": "false"
            }
        });
        let settings = ClientSettings::from_value(Some(&value));
        assert_eq!(
            settings.repositories(),
            vec!["http://a.example/", "/tmp/models"]
        );
        assert!(!settings.suppress_repository_logs);
        assert_eq!(settings.repository_key(), "http://a.example/;/tmp/models");
    }

    #[test]
    fn test_flat_settings_and_list() {
        let value = json!({
            "modelRepositories": ["%ILI_DIR", "/srv/models"],
            "suppressRepositoryLogs": false,
            "compilerCommand": " /opt/ili2c-symbols ",
            "stripCaretSentinel": true
        });
        let settings = ClientSettings::from_value(Some(&value));
        assert_eq!(settings.repositories(), vec!["/srv/models"]);
        assert!(!settings.suppress_repository_logs);
        assert_eq!(settings.compiler_command(), "/opt/ili2c-symbols");
        assert!(settings.strip_caret_sentinel);
    }

    #[test]
    fn test_malformed_settings_fall_back() {
        let value = json!({ "compilerCommand": 42 });
        assert_eq!(ClientSettings::from_value(Some(&value)), ClientSettings::default());
        let value = json!("not an object");
        assert_eq!(ClientSettings::from_value(Some(&value)), ClientSettings::default());
    }

    #[test]
    fn test_repository_key_changes_with_repositories() {
        let a = ClientSettings {
            model_repositories: "/a".into(),
            ..Default::default()
        };
        let b = ClientSettings {
            model_repositories: "/a;/b".into(),
            ..Default::default()
        };
        assert_ne!(a.repository_key(), b.repository_key());
    }
}
