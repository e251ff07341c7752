//! Registered projects: local checkouts, remote identity and per-project
//! analysis preferences.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use ripple_graphs::{Algorithm, EntryPoint};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};
use crate::store::normalize_remote_url;

fn default_exclude() -> Vec<String> {
    vec!["vendor/".to_string(), "*_test.go".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub local_paths: Vec<PathBuf>,
    /// `file:function` or bare `function`.
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub algorithm: Algorithm,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            remote_url: None,
            local_paths: Vec::new(),
            entry_points: Vec::new(),
            exclude: default_exclude(),
            algorithm: Algorithm::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Parsed entry points; malformed entries are logged and dropped.
    pub fn parsed_entry_points(&self) -> Vec<EntryPoint> {
        self.entry_points
            .iter()
            .filter_map(|raw| match raw.parse::<EntryPoint>() {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(project = %self.id, entry = %raw, error = %e, "Ignoring malformed entry point");
                    None
                }
            })
            .collect()
    }
}

#[async_trait::async_trait]
pub trait ProjectRegistry: Send + Sync {
    /// The project whose local checkout contains `path`. Nested checkouts
    /// resolve to the most specific one.
    async fn find_by_path(&self, path: &Path) -> Result<Option<Project>>;

    /// Match on the normalized remote URL.
    async fn find_by_remote(&self, url: &str) -> Result<Option<Project>>;

    /// Insert or replace by id, keeping the original `created_at`.
    async fn upsert(&self, project: Project) -> Result<Project>;

    /// Returns whether a project was removed.
    async fn remove(&self, id: &str) -> Result<bool>;

    async fn list(&self) -> Result<Vec<Project>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    projects: Vec<Project>,
}

/// TOML-backed registry. Every mutation is written through under the
/// document lock, so there is a single writer per process.
#[derive(Debug)]
pub struct FileProjectRegistry {
    path: PathBuf,
    doc: Mutex<RegistryDocument>,
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

impl FileProjectRegistry {
    /// Load the registry at `path`; a missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        let doc = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?
        } else {
            RegistryDocument::default()
        };
        debug!(path = %path.display(), projects = doc.projects.len(), "Loaded project registry");
        Ok(Self {
            path: path.to_path_buf(),
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, doc: &RegistryDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let text = toml::to_string_pretty(doc).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, text).map_err(ConfigError::Io)?;
        std::fs::rename(&tmp, &self.path).map_err(ConfigError::Io)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProjectRegistry for FileProjectRegistry {
    async fn find_by_path(&self, path: &Path) -> Result<Option<Project>> {
        let path = canonical(path);
        let doc = self.doc.lock().expect("registry mutex poisoned");
        let best = doc
            .projects
            .iter()
            .filter_map(|p| {
                p.local_paths
                    .iter()
                    .map(|lp| canonical(lp))
                    .filter(|lp| path.starts_with(lp))
                    .map(|lp| lp.components().count())
                    .max()
                    .map(|depth| (depth, p))
            })
            .max_by_key(|(depth, _)| *depth)
            .map(|(_, p)| p.clone());
        Ok(best)
    }

    async fn find_by_remote(&self, url: &str) -> Result<Option<Project>> {
        let wanted = normalize_remote_url(url);
        let doc = self.doc.lock().expect("registry mutex poisoned");
        Ok(doc
            .projects
            .iter()
            .find(|p| {
                p.remote_url
                    .as_deref()
                    .is_some_and(|r| normalize_remote_url(r) == wanted)
            })
            .cloned())
    }

    async fn upsert(&self, mut project: Project) -> Result<Project> {
        let mut doc = self.doc.lock().expect("registry mutex poisoned");
        project.updated_at = Utc::now();
        match doc.projects.iter_mut().find(|p| p.id == project.id) {
            Some(existing) => {
                project.created_at = existing.created_at;
                *existing = project.clone();
            }
            None => doc.projects.push(project.clone()),
        }
        self.save(&doc)?;
        Ok(project)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut doc = self.doc.lock().expect("registry mutex poisoned");
        let before = doc.projects.len();
        doc.projects.retain(|p| p.id != id);
        let removed = doc.projects.len() != before;
        if removed {
            self.save(&doc)?;
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<Project>> {
        let doc = self.doc.lock().expect("registry mutex poisoned");
        Ok(doc.projects.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileProjectRegistry::load(&dir.path().join("projects.toml")).unwrap();
        assert!(registry.list().await.unwrap().is_empty());
        assert!(registry.find_by_path(dir.path()).await.unwrap().is_none());
        assert!(!registry.remove("nope").await.unwrap());
    }

    #[tokio::test]
    async fn persists_and_finds_projects() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("src/app");
        std::fs::create_dir_all(checkout.join("cmd/server")).unwrap();
        let path = dir.path().join("projects.toml");

        let registry = FileProjectRegistry::load(&path).unwrap();
        let mut project = Project::new("abc", "app");
        project.remote_url = Some("git@github.com:acme/app.git".into());
        project.local_paths = vec![checkout.clone()];
        project.entry_points = vec!["cmd/server/main.go:main".into(), "Run".into(), ":bad".into()];
        project.algorithm = Algorithm::Vta;
        let first = registry.upsert(project.clone()).await.unwrap();

        let reloaded = FileProjectRegistry::load(&path).unwrap();
        let found = reloaded
            .find_by_path(&checkout.join("cmd/server"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "abc");
        assert_eq!(found.algorithm, Algorithm::Vta);
        assert_eq!(found.parsed_entry_points().len(), 2);
        assert!(reloaded
            .find_by_remote("https://github.com/acme/app")
            .await
            .unwrap()
            .is_some());
        assert!(reloaded.find_by_path(dir.path()).await.unwrap().is_none());

        project.name = "renamed".into();
        let second = reloaded.upsert(project).await.unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(reloaded.list().await.unwrap().len(), 1);

        assert!(reloaded.remove("abc").await.unwrap());
        assert!(FileProjectRegistry::load(&path).unwrap().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn omitted_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.toml");
        std::fs::write(
            &path,
            r#"
[[projects]]
id = "p"
name = "p"
created_at = "2026-01-01T00:00:00Z"
updated_at = "2026-01-01T00:00:00Z"
"#,
        )
        .unwrap();
        let project = FileProjectRegistry::load(&path).unwrap().list().await.unwrap().remove(0);
        assert_eq!(project.exclude, ["vendor/", "*_test.go"]);
        assert_eq!(project.algorithm, Algorithm::Rta);
        assert!(project.remote_url.is_none());
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.toml");
        std::fs::write(&path, "projects = 3").unwrap();
        assert!(matches!(
            FileProjectRegistry::load(&path).unwrap_err(),
            crate::error::RippleError::Config(ConfigError::Parse(_))
        ));
    }
}
