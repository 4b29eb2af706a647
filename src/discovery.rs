//! Model discovery across configured repositories.
//!
//! Feeds `IMPORTS` completion. Remote repositories publish an
//! `ilimodels.xml` index; local directories are scanned for `.ili` files and
//! their `MODEL` headers. Results are cached per repository configuration.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{LazyLock, PoisonError, RwLock};

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::config::ClientSettings;

static MODEL_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:(?:TYPE|REFSYSTEM|SYMBOLOGY|CONTRACTED)\s+)?MODEL\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static MODEL pattern")
});

/// Source of importable model names.
#[tower_lsp::async_trait]
pub trait ModelDiscovery: Send + Sync {
    /// Names starting with `prefix` (case-insensitive), minus those whose
    /// uppercase form is in `exclude_upper`, sorted case-insensitively.
    fn search_models(&self, prefix: &str, exclude_upper: &HashSet<String>) -> Vec<String>;

    /// Pick up a changed repository configuration.
    async fn refresh(&self, _settings: &ClientSettings) {}
}

#[derive(Debug, Default)]
struct DiscoveryState {
    key: Option<String>,
    /// Configuration of the most recently started reload
    pending: Option<String>,
    /// Uppercase name -> first seen spelling
    models: BTreeMap<String, String>,
}

/// Discovery backed by the configured model repositories.
#[derive(Debug)]
pub struct RepositoryModelDiscovery {
    state: RwLock<DiscoveryState>,
    client: reqwest::Client,
}

impl Default for RepositoryModelDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryModelDiscovery {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(DiscoveryState::default()),
            client: reqwest::Client::new(),
        }
    }

    /// Key of the repository configuration currently loaded.
    pub fn loaded_key(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .key
            .clone()
    }

    /// Re-read repositories if the configuration changed since the last
    /// refresh. Unreachable repositories are skipped. A reload overtaken by
    /// one for a newer configuration discards its result.
    pub async fn reload(&self, settings: &ClientSettings) {
        let key = settings.repository_key();
        if !self.begin_reload(&key) {
            return;
        }

        let mut models = BTreeMap::new();
        for repository in settings.repositories() {
            match self.list_repository(&repository).await {
                Ok(names) => {
                    tracing::debug!("Found {} models in {}", names.len(), repository);
                    for name in names {
                        models.entry(name.to_uppercase()).or_insert(name);
                    }
                }
                Err(e) if settings.suppress_repository_logs => {
                    tracing::debug!("Skipping repository {}: {:#}", repository, e);
                }
                Err(e) => {
                    tracing::warn!("Skipping repository {}: {:#}", repository, e);
                }
            }
        }

        self.finish_reload(key, models);
    }

    /// Mark `key` as the configuration being loaded. False when it is
    /// already loaded or loading.
    fn begin_reload(&self, key: &str) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.key.as_deref() == Some(key) && state.pending.is_none() {
            return false;
        }
        if state.pending.as_deref() == Some(key) {
            return false;
        }
        state.pending = Some(key.to_string());
        true
    }

    /// Store the models for `key` unless a newer reload has started.
    fn finish_reload(&self, key: String, models: BTreeMap<String, String>) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.pending.as_deref() != Some(key.as_str()) {
            tracing::debug!("Discarding stale model list for {}", key);
            return false;
        }
        tracing::info!("Model discovery loaded {} models", models.len());
        *state = DiscoveryState {
            key: Some(key),
            pending: None,
            models,
        };
        true
    }

    async fn list_repository(&self, repository: &str) -> Result<Vec<String>> {
        if repository.starts_with("http://") || repository.starts_with("https://") {
            let url = format!("{}/ilimodels.xml", repository.trim_end_matches('/'));
            let body = self
                .client
                .get(&url)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .with_context(|| format!("failed to fetch {}", url))?
                .text()
                .await
                .with_context(|| format!("failed to read {}", url))?;
            Ok(parse_model_index(&body))
        } else {
            scan_directory(Path::new(repository)).await
        }
    }
}

#[tower_lsp::async_trait]
impl ModelDiscovery for RepositoryModelDiscovery {
    fn search_models(&self, prefix: &str, exclude_upper: &HashSet<String>) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        filter_models(state.models.values(), prefix, exclude_upper)
    }

    async fn refresh(&self, settings: &ClientSettings) {
        self.reload(settings).await;
    }
}

/// Prefix filter, exclusion and ordering shared by discovery implementations.
pub fn filter_models<'a>(
    names: impl IntoIterator<Item = &'a String>,
    prefix: &str,
    exclude_upper: &HashSet<String>,
) -> Vec<String> {
    let prefix = prefix.trim().to_lowercase();
    let mut found: Vec<String> = names
        .into_iter()
        .filter(|name| name.to_lowercase().starts_with(&prefix))
        .filter(|name| !exclude_upper.contains(&name.to_uppercase()))
        .cloned()
        .collect();
    found.sort_by_key(|name| name.to_lowercase());
    found.dedup();
    found
}

/// Model names listed in an `ilimodels.xml` document.
///
/// Reads the `Name` child of each `ModelMetadata` entry. Parsing stops at
/// the first malformed construct, keeping the names read so far.
pub fn parse_model_index(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut names = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                if is_model_name(&path) {
                    current = Some(String::new());
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(name) = current.as_mut() {
                    match t.unescape() {
                        Ok(text) => name.push_str(&text),
                        Err(e) => tracing::debug!("Bad text in model index: {}", e),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(name) = current.as_mut() {
                    name.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                if is_model_name(&path) {
                    if let Some(name) = current.take() {
                        let name = name.trim();
                        if !name.is_empty() {
                            names.push(name.to_string());
                        }
                    }
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(
                    "Malformed model index at {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
            Ok(_) => {}
        }
    }
    names
}

/// `…ModelMetadata/Name`, with or without a class-qualified element name.
fn is_model_name(path: &[String]) -> bool {
    match path {
        [.., parent, leaf] => {
            parent.ends_with("ModelMetadata") && (leaf == "Name" || leaf.ends_with(".Name"))
        }
        _ => false,
    }
}

/// Model names declared in INTERLIS source.
pub fn scan_model_names(source: &str) -> Vec<String> {
    MODEL_HEADER_RE
        .captures_iter(source)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

async fn scan_directory(dir: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to list {}", dir.display()))?;

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_ili = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ili"));
        if !is_ili {
            continue;
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(source) => names.extend(scan_model_names(&source)),
            Err(e) => tracing::debug!("Cannot read {}: {}", path.display(), e),
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_parse_model_index() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<IliRepository09.RepositoryIndex>
  <IliRepository09.RepositoryIndex.ModelMetadata TID="1">
    <Name>GeometryCHLV95_V1</Name>
    <SchemaLanguage>ili2_3</SchemaLanguage>
  </IliRepository09.RepositoryIndex.ModelMetadata>
  <IliRepository09.RepositoryIndex.ModelMetadata TID="2">
    <Name> Units </Name>
  </IliRepository09.RepositoryIndex.ModelMetadata>
</IliRepository09.RepositoryIndex>"#;
        assert_eq!(parse_model_index(xml), vec!["GeometryCHLV95_V1", "Units"]);
    }

    #[test]
    fn test_parse_model_index_decodes_entities_and_ignores_other_names() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<IliRepository09.RepositoryIndex>
  <IliRepository09.RepositoryIndex.ModelMetadata TID="1">
    <Name>Roads&amp;Rails_V1</Name>
    <Publisher><Name>Not a model</Name></Publisher>
  </IliRepository09.RepositoryIndex.ModelMetadata>
  <IliRepository09.RepositoryIndex.Other TID="2">
    <Name>AlsoIgnored</Name>
  </IliRepository09.RepositoryIndex.Other>
</IliRepository09.RepositoryIndex>"#;
        assert_eq!(parse_model_index(xml), vec!["Roads&Rails_V1"]);
    }

    #[test]
    fn test_parse_model_index_keeps_names_before_malformed_tail() {
        let xml = "<Index><X.ModelMetadata><Name>Kept</Name></X.ModelMetadata><broken";
        assert_eq!(parse_model_index(xml), vec!["Kept"]);
    }

    #[test]
    fn test_scan_model_names() {
        let source = "INTERLIS 2.3;\n\nMODEL Alpha (de) =\nEND Alpha.\n\nTYPE MODEL Beta_1 =\nEND Beta_1.\n";
        assert_eq!(scan_model_names(source), vec!["Alpha", "Beta_1"]);
    }

    #[test]
    fn test_filter_models() {
        let names: Vec<String> = ["units", "Geometry", "GeometryCHLV95", "Base"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            filter_models(&names, " geo ", &set(&["GEOMETRYCHLV95"])),
            vec!["Geometry"]
        );
        assert_eq!(
            filter_models(&names, "", &HashSet::new()),
            vec!["Base", "Geometry", "GeometryCHLV95", "units"]
        );
    }

    #[test]
    fn test_refresh_scans_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ili"), "MODEL LocalA =\nEND LocalA.\n").unwrap();
        std::fs::write(dir.path().join("b.ILI"), "MODEL LocalB =\nEND LocalB.\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "MODEL Ignored =").unwrap();

        let settings = ClientSettings {
            model_repositories: format!("{};/does/not/exist", dir.path().display()),
            ..Default::default()
        };
        let discovery = RepositoryModelDiscovery::new();
        tokio_test::block_on(discovery.reload(&settings));

        assert_eq!(discovery.loaded_key(), Some(settings.repository_key()));
        assert_eq!(
            discovery.search_models("local", &HashSet::new()),
            vec!["LocalA", "LocalB"]
        );
        assert_eq!(
            discovery.search_models("", &set(&["LOCALA"])),
            vec!["LocalB"]
        );
    }

    #[test]
    fn test_refresh_skips_unchanged_configuration() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ili"), "MODEL First =\nEND First.\n").unwrap();
        let settings = ClientSettings {
            model_repositories: dir.path().display().to_string(),
            ..Default::default()
        };
        let discovery = RepositoryModelDiscovery::new();
        tokio_test::block_on(discovery.reload(&settings));

        std::fs::write(dir.path().join("b.ili"), "MODEL Second =\nEND Second.\n").unwrap();
        tokio_test::block_on(discovery.reload(&settings));
        assert_eq!(discovery.search_models("", &HashSet::new()), vec!["First"]);
    }

    fn models(names: &[&str]) -> BTreeMap<String, String> {
        names
            .iter()
            .map(|n| (n.to_uppercase(), n.to_string()))
            .collect()
    }

    #[test]
    fn test_overtaken_reload_is_discarded() {
        let discovery = RepositoryModelDiscovery::new();
        assert!(discovery.begin_reload("/a"));
        assert!(discovery.begin_reload("/b"));

        assert!(discovery.finish_reload("/b".into(), models(&["FromB"])));
        assert!(!discovery.finish_reload("/a".into(), models(&["FromA"])));

        assert_eq!(discovery.loaded_key().as_deref(), Some("/b"));
        assert_eq!(discovery.search_models("", &HashSet::new()), vec!["FromB"]);
    }

    #[test]
    fn test_reload_back_to_earlier_configuration() {
        let discovery = RepositoryModelDiscovery::new();
        assert!(discovery.begin_reload("/a"));
        assert!(discovery.finish_reload("/a".into(), models(&["FromA"])));
        assert!(!discovery.begin_reload("/a"));

        assert!(discovery.begin_reload("/b"));
        assert!(discovery.begin_reload("/a"));
        assert!(!discovery.begin_reload("/a"));
        assert!(!discovery.finish_reload("/b".into(), models(&["FromB"])));
        assert!(discovery.finish_reload("/a".into(), models(&["FromA2"])));
        assert_eq!(discovery.search_models("", &HashSet::new()), vec!["FromA2"]);
    }
}
