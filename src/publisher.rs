use crate::app_config::AppConfig;
use crate::render_wikitext::Report;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use wikimisc::mediawiki::api::Api;
use wikimisc::mediawiki::reqwest::ClientBuilder;

/// Read/write access to pages on the destination wiki.
#[async_trait]
pub trait PageStore: Send + Sync + fmt::Debug {
    /// Current wikitext; empty for a page that does not exist.
    async fn get_text(&self, title: &str) -> Result<String>;
    async fn save_text(&self, title: &str, text: &str, summary: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// WikiPageStore – MediaWiki API
// ---------------------------------------------------------------------------

pub struct WikiPageStore {
    api: Mutex<Api>,
}

impl fmt::Debug for WikiPageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WikiPageStore").finish_non_exhaustive()
    }
}

impl WikiPageStore {
    /// Connects to the destination wiki. A failed login is logged, not
    /// fatal; saves made afterwards will fail and be reported as such.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let builder = ClientBuilder::new().timeout(config.http_timeout());
        let mut api = Api::new_from_builder(&config.target_api, builder)
            .await
            .map_err(|e| anyhow!("Can't talk to {}: {e}", config.target_api))?;
        if config.has_target_credentials() {
            if let Err(e) = api
                .login(
                    config.target_username.to_owned(),
                    config.target_password.to_owned(),
                )
                .await
            {
                error!("Error logging in to {}: {e}", config.target_api);
            }
        } else {
            warn!("No credentials for {}, edits will be anonymous", config.target_api);
        }
        Ok(Self {
            api: Mutex::new(api),
        })
    }

    fn text_from_query(json: &Value) -> Result<String> {
        let page = &json["query"]["pages"][0];
        if page.is_null() {
            return Err(anyhow!("No page in query result: {json}"));
        }
        if page.get("missing").is_some() {
            return Ok(String::new());
        }
        page["revisions"][0]["slots"]["main"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("No revision content in query result"))
    }

    fn check_edit_result(json: &Value) -> Result<()> {
        if let Some(err) = json.get("error") {
            return Err(anyhow!("Edit failed: {err}"));
        }
        match json["edit"]["result"].as_str() {
            Some("Success") => Ok(()),
            _ => Err(anyhow!("Edit not successful: {json}")),
        }
    }
}

#[async_trait]
impl PageStore for WikiPageStore {
    async fn get_text(&self, title: &str) -> Result<String> {
        let api = self.api.lock().await;
        let params = api.params_into(&[
            ("action", "query"),
            ("prop", "revisions"),
            ("rvprop", "content"),
            ("rvslots", "main"),
            ("titles", title),
            ("formatversion", "2"),
        ]);
        let json = api
            .get_query_api_json(&params)
            .await
            .map_err(|e| anyhow!("Cannot load [[{title}]]: {e}"))?;
        Self::text_from_query(&json)
    }

    async fn save_text(&self, title: &str, text: &str, summary: &str) -> Result<()> {
        let mut api = self.api.lock().await;
        let token = api
            .get_edit_token()
            .await
            .map_err(|e| anyhow!("Cannot get edit token: {e}"))?;
        let params = api.params_into(&[
            ("action", "edit"),
            ("title", title),
            ("text", text),
            ("summary", summary),
            ("token", token.as_str()),
        ]);
        let json = api
            .post_query_api_json_mut(&params)
            .await
            .map_err(|e| anyhow!("Cannot save [[{title}]]: {e}"))?;
        Self::check_edit_result(&json)
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Unchanged,
    Saved,
    Failed(String),
}

/// Writes reports, skipping pages whose text is already identical.
#[derive(Debug, Clone)]
pub struct Publisher {
    pages: Arc<dyn PageStore>,
    summary: String,
}

impl Publisher {
    pub fn new(pages: Arc<dyn PageStore>, summary: &str) -> Self {
        Self {
            pages,
            summary: summary.to_string(),
        }
    }

    #[instrument(skip_all, fields(title = %report.title))]
    pub async fn publish(&self, report: &Report) -> PublishOutcome {
        let current = match self.pages.get_text(&report.title).await {
            Ok(text) => text,
            Err(e) => {
                error!("{e}");
                return PublishOutcome::Failed(e.to_string());
            }
        };
        if current == report.text {
            info!("no changes");
            return PublishOutcome::Unchanged;
        }
        match self
            .pages
            .save_text(&report.title, &report.text, &self.summary)
            .await
        {
            Ok(()) => {
                info!("Saved page {}", report.title);
                PublishOutcome::Saved
            }
            Err(e) => {
                error!("{e}");
                PublishOutcome::Failed(e.to_string())
            }
        }
    }
}
