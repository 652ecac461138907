use anyhow::{anyhow, Result};
use chrono::{Datelike, Utc};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Legacy environment variables, mapped onto config keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("EDITORS_STATS_PATH", "dump_path"),
    ("MDWIKI_USERNAME", "target_username"),
    ("MDWIKI_PASSWORD", "target_password"),
    ("BOTUSERNAME", "bot_username"),
    ("BOTPASSWORD", "bot_password"),
];

const ANONYMOUS_SITELINK_BATCH: usize = 50;
const BOT_SITELINK_BATCH: usize = 500;

/// Where a wiki's per-editor counts come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EditorSourceKind {
    /// Revision tables on the wiki's database replica
    #[default]
    Replica,
    /// The configured `primary_source_url` endpoint
    Api,
}

/// Per-wiki overrides, keyed by site code in [`AppConfig::sites`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct SiteOverride {
    pub source: Option<EditorSourceKind>,
    pub blocklist: Option<Vec<String>>,
    pub show_article_count: Option<bool>,
}

/// The effective policy for one wiki, after applying its override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePolicy {
    pub source: EditorSourceKind,
    pub blocklist: Vec<String>,
    pub show_article_count: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReplicaOverride {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub port_mapping: HashMap<String, u16>,
    pub credentials_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dump_path: PathBuf,
    pub target_api: String,
    pub target_username: String,
    pub target_password: String,
    pub wikidata_api: String,
    pub bot_username: String,
    pub bot_password: String,
    pub category: String,
    pub home_wiki: String,
    pub year: Option<i32>,
    pub http_timeout_secs: u64,
    pub sql_timeout_secs: u64,
    pub sitelink_batch_size: Option<usize>,
    pub sql_batch_size: usize,
    pub min_edits: u64,
    pub per_site_max_rows: usize,
    pub global_max_rows: Option<usize>,
    pub skip_sites: Vec<String>,
    pub blocklist: Vec<String>,
    pub shared_bot_accounts: Vec<String>,
    pub sites: HashMap<String, SiteOverride>,
    pub primary_source_url: Option<String>,
    pub report_title_prefix: String,
    pub edit_summary: String,
    pub cache_item_sitelinks: bool,
    pub replica: ReplicaOverride,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut sites = HashMap::new();
        sites.insert(
            "ar".to_string(),
            SiteOverride {
                source: Some(EditorSourceKind::Api),
                blocklist: Some(vec![]),
                show_article_count: Some(false),
            },
        );
        Self {
            dump_path: PathBuf::from("/tmp/editors_stats_dump"),
            target_api: "https://mdwiki.org/w/api.php".to_string(),
            target_username: String::new(),
            target_password: String::new(),
            wikidata_api: "https://www.wikidata.org/w/api.php".to_string(),
            bot_username: String::new(),
            bot_password: String::new(),
            category: "All_WikiProject_Medicine_pages".to_string(),
            home_wiki: "enwiki".to_string(),
            year: None,
            http_timeout_secs: 10,
            sql_timeout_secs: 600,
            sitelink_batch_size: None,
            sql_batch_size: 150,
            min_edits: 10,
            per_site_max_rows: 100,
            global_max_rows: None,
            skip_sites: ["enwiki", "wikidatawiki", "commonswiki", "specieswiki"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blocklist: vec!["Mr. Ibrahem".to_string()],
            shared_bot_accounts: vec!["CommonsDelinker".to_string()],
            sites,
            primary_source_url: None,
            report_title_prefix: "WikiProjectMed:WikiProject_Medicine/Stats/Top_medical_editors"
                .to_string(),
            edit_summary: "update".to_string(),
            cache_item_sitelinks: false,
            replica: ReplicaOverride::default(),
        }
    }
}

impl AppConfig {
    /// Loads `.env`, then layers `config.json` (optional), `EDITOR_STATS__*`
    /// variables and the legacy variables over the defaults.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut builder = Config::builder()
            .add_source(File::with_name("config.json").required(false))
            .add_source(Environment::with_prefix("EDITOR_STATS").separator("__"));
        for (var, key) in LEGACY_ENV {
            let value = std::env::var(var).ok().filter(|v| !v.is_empty());
            builder = builder
                .set_override_option(*key, value)
                .map_err(|e| anyhow!("Cannot apply ${var}: {e}"))?;
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("Cannot read configuration: {e}"))?;
        config
            .try_deserialize()
            .map_err(|e| anyhow!("Invalid configuration: {e}"))
    }

    /// The calendar year the reports cover; the previous year unless configured.
    pub fn report_year(&self) -> i32 {
        self.year.unwrap_or_else(|| Utc::now().year() - 1)
    }

    pub fn has_bot_credentials(&self) -> bool {
        !self.bot_username.is_empty() && !self.bot_password.is_empty()
    }

    pub fn has_target_credentials(&self) -> bool {
        !self.target_username.is_empty() && !self.target_password.is_empty()
    }

    /// `wbgetentities` accepts 500 IDs per call with bot rights, 50 without.
    pub fn sitelink_batch_size(&self) -> usize {
        match self.sitelink_batch_size {
            Some(size) if size > 0 => size,
            _ if self.has_bot_credentials() => BOT_SITELINK_BATCH,
            _ => ANONYMOUS_SITELINK_BATCH,
        }
    }

    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub const fn sql_timeout(&self) -> Duration {
        Duration::from_secs(self.sql_timeout_secs)
    }

    /// Skipped wikis are listed by site ID; accepts either `de` or `dewiki`.
    pub fn is_skipped(&self, site: &str) -> bool {
        let wiki = crate::wiki_site::wiki_id(site);
        self.skip_sites.iter().any(|s| *s == wiki)
    }

    pub fn site_policy(&self, site: &str) -> SitePolicy {
        let code = crate::wiki_site::site_code(site);
        let site_override = self.sites.get(&code).cloned().unwrap_or_default();
        SitePolicy {
            source: site_override.source.unwrap_or_default(),
            blocklist: site_override
                .blocklist
                .unwrap_or_else(|| self.blocklist.clone()),
            show_article_count: site_override.show_article_count.unwrap_or(true),
        }
    }

    pub fn global_report_title(&self) -> String {
        format!("{}_{}_(all)", self.report_title_prefix, self.report_year())
    }
}
