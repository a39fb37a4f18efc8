use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::{HostFailure, SwitchProfile};

/// On-disk layout of `<artifact_dir>/<fabric>.yml`
#[derive(Debug, Default, Serialize, Deserialize)]
struct ArtifactFile {
    fabric: String,
    #[serde(default)]
    switches: BTreeMap<String, SwitchProfile>,
}

/// ArtifactStore owns the generated-artifact directory.
/// Everything in it is a cache: profiling rewrites it, policy stages read it.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn fabric_path(&self, fabric: &str) -> PathBuf {
        self.dir.join(format!("{}.yml", fabric.replace('/', "_")))
    }

    pub fn retry_path(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{}.retry", stage))
    }

    /// Read the cached profiles of one fabric; a missing file is an empty cache
    pub async fn read_fabric(&self, fabric: &str) -> Result<BTreeMap<String, SwitchProfile>> {
        let path = self.fabric_path(fabric);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("No profile artifact for fabric {} at {} - run the profile stage first", fabric, path.display());
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };

        let file: ArtifactFile =
            serde_yaml::from_str(&content).with_context(|| format!("Corrupt artifact {}", path.display()))?;
        Ok(file.switches)
    }

    /// Merge freshly collected profiles into the fabric's artifact.
    /// Switches not in `profiles` keep their cached entry.
    pub async fn write_fabric(&self, fabric: &str, profiles: &[SwitchProfile]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let mut switches = self.read_fabric_quiet(fabric).await?;
        for profile in profiles {
            switches.insert(profile.hostname.clone(), profile.clone());
        }

        let file = ArtifactFile {
            fabric: fabric.to_string(),
            switches,
        };
        let body = serde_yaml::to_string(&file)?;
        let content = format!(
            "# Generated by ndfc-migrate profile at {}\n# Cache only: regenerate instead of editing.\n{}",
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            body
        );

        let path = self.fabric_path(fabric);
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Wrote {} profiles to {}", file.switches.len(), path.display());
        Ok(path)
    }

    async fn read_fabric_quiet(&self, fabric: &str) -> Result<BTreeMap<String, SwitchProfile>> {
        if !Path::new(&self.fabric_path(fabric)).exists() {
            return Ok(BTreeMap::new());
        }
        self.read_fabric(fabric).await
    }

    /// Record the hosts that failed a stage. A clean run removes the file.
    pub async fn write_retry(&self, stage: &str, failed: &[HostFailure]) -> Result<()> {
        let path = self.retry_path(stage);
        if failed.is_empty() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_context(|| format!("Failed to remove {}", path.display())),
            }
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let mut hosts: Vec<&str> = failed.iter().map(|f| f.hostname.as_str()).collect();
        hosts.sort();
        hosts.dedup();
        let mut content = hosts.join("\n");
        content.push('\n');
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::warn!("{} failed hosts written to {}", hosts.len(), path.display());
        Ok(())
    }

    pub async fn read_retry(&self, stage: &str) -> Result<Vec<String>> {
        let path = self.retry_path(stage);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("No retry file for stage {} at {}", stage, path.display()))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}
