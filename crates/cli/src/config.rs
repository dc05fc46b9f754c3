//! Job configuration: one TOML file per scraped utility.
//!
//! Replaces per-utility subclassing with data. A job names the Kubra
//! deployment to walk, the repository document the snapshots land in,
//! and how the changelog is worded.

use std::path::Path;

use serde::Deserialize;

use gridwatch_core::ReportStyle;
use gridwatch_scraper::{KubraInstance, MAX_ZOOM, MIN_ZOOM};
use gridwatch_store::{Committer, RepoLocation};

/// Default vendor host; deployments on a different host set
/// `utility.base_url`.
const DEFAULT_BASE_URL: &str = "https://kubra.io/";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub utility: UtilitySection,
    pub store: StoreSection,
    #[serde(default)]
    pub report: ReportSection,
    #[serde(default)]
    pub committer: Option<CommitterSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UtilitySection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub instance_id: String,
    pub view_id: String,
    #[serde(default = "default_min_zoom")]
    pub min_zoom: u8,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Document path within the repository, e.g. "lgeku.json".
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportSection {
    /// Summary-line name; defaults to the document path minus ".json".
    pub display_name: Option<String>,
    #[serde(default = "default_noun")]
    pub noun: String,
    pub plural: Option<String>,
    #[serde(default = "default_show_changes")]
    pub show_changes: bool,
    pub source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitterSection {
    pub name: String,
    pub email: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_min_zoom() -> u8 {
    MIN_ZOOM
}

fn default_max_zoom() -> u8 {
    MAX_ZOOM
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_noun() -> String {
    "outage".to_string()
}

fn default_show_changes() -> bool {
    true
}

// An absent [report] section must behave like an empty one, so the
// hand-written Default mirrors the serde field defaults.
impl Default for ReportSection {
    fn default() -> ReportSection {
        ReportSection {
            display_name: None,
            noun: default_noun(),
            plural: None,
            show_changes: default_show_changes(),
            source_url: None,
        }
    }
}

impl JobConfig {
    pub fn load(path: &Path) -> Result<JobConfig, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("could not read config '{}': {}", path.display(), e))?;
        toml::from_str(&text)
            .map_err(|e| format!("could not parse config '{}': {}", path.display(), e))
    }

    pub fn instance(&self) -> KubraInstance {
        KubraInstance {
            base_url: self.utility.base_url.clone(),
            instance_id: self.utility.instance_id.clone(),
            view_id: self.utility.view_id.clone(),
        }
    }

    pub fn location(&self) -> RepoLocation {
        RepoLocation {
            owner: self.store.owner.clone(),
            repo: self.store.repo.clone(),
            branch: self.store.branch.clone(),
        }
    }

    pub fn style(&self) -> ReportStyle {
        let display_name = self
            .report
            .display_name
            .clone()
            .unwrap_or_else(|| self.store.path.trim_end_matches(".json").to_string());
        ReportStyle {
            display_name,
            noun: self.report.noun.clone(),
            plural: self.report.plural.clone(),
            show_changes: self.report.show_changes,
            source_url: self.report.source_url.clone(),
        }
    }

    pub fn committer(&self) -> Option<Committer> {
        self.committer.as_ref().map(|c| Committer {
            name: c.name.clone(),
            email: c.email.clone(),
        })
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
