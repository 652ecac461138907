use crate::database_manager::DatabaseManager;
use crate::sql_utils::{self, SQLtuple};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mysql_async::Value as MyValue;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{instrument, warn};
use url::Url;

/// Username => number of qualifying edits on one wiki
pub type EditorCounts = BTreeMap<String, u64>;

/// Bot accounts are recognised by name alone.
pub fn is_bot_name(user: &str) -> bool {
    user.to_lowercase().contains("bot")
}

/// Adds `counts` onto `total`, summing editors present in both.
pub fn accumulate(total: &mut EditorCounts, counts: EditorCounts) {
    for (user, count) in counts {
        *total.entry(user).or_insert(0) += count;
    }
}

/// Counts edits per editor to a set of articles on one wiki, within one year.
#[async_trait]
pub trait EditorSource: Send + Sync + fmt::Debug {
    async fn count_editors(&self, site: &str, titles: &[String]) -> Result<EditorCounts>;
}

// ---------------------------------------------------------------------------
// ReplicaEditorSource – revision/actor tables on the wiki replicas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReplicaEditorSource {
    db: DatabaseManager,
    year: i32,
}

impl ReplicaEditorSource {
    pub const fn new(db: DatabaseManager, year: i32) -> Self {
        Self { db, year }
    }

    fn generate_sql_query(&self, titles: &[String]) -> SQLtuple {
        let titles: Vec<String> = titles
            .iter()
            .map(|t| sql_utils::title_to_db_key(t))
            .collect();
        let mut sql: SQLtuple = (
            "SELECT actor_name, count(*) AS count FROM revision
            JOIN actor ON rev_actor = actor_id
            JOIN page ON rev_page = page_id
            WHERE LOWER(CAST(actor_name AS CHAR)) NOT LIKE '%bot%'
            AND page_namespace = 0
            AND rev_timestamp BETWEEN ? AND ?
            AND page_title IN ("
                .to_string(),
            vec![
                MyValue::Bytes(format!("{}0101000000", self.year).into()),
                MyValue::Bytes(format!("{}1231235959", self.year).into()),
            ],
        );
        sql_utils::append_sql(&mut sql, sql_utils::prep_quote(&titles));
        sql.0 += ") GROUP BY actor_id ORDER BY count(*) DESC";
        sql
    }
}

#[async_trait]
impl EditorSource for ReplicaEditorSource {
    #[instrument(skip(self, titles), fields(titles = titles.len()), err)]
    async fn count_editors(&self, site: &str, titles: &[String]) -> Result<EditorCounts> {
        if titles.is_empty() {
            return Ok(EditorCounts::new());
        }
        let rows = self
            .db
            .query_wiki::<(Vec<u8>, u64)>(site, self.generate_sql_query(titles))
            .await?;
        let mut ret = EditorCounts::new();
        for (actor_name, count) in rows {
            let actor_name = String::from_utf8_lossy(&actor_name).into_owned();
            *ret.entry(actor_name).or_insert(0) += count;
        }
        Ok(ret)
    }
}

// ---------------------------------------------------------------------------
// ApiEditorSource – precomputed counts from an HTTP endpoint
// ---------------------------------------------------------------------------

/// Fetches a whole wiki's counts from one JSON endpoint returning
/// `{"username": count, ...}`. The URL template may contain `{site}` and
/// `{year}`.
#[derive(Clone)]
pub struct ApiEditorSource {
    url_template: Option<String>,
    year: i32,
    client: reqwest::Client,
}

impl fmt::Debug for ApiEditorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiEditorSource")
            .field("url_template", &self.url_template)
            .field("year", &self.year)
            .finish()
    }
}

impl ApiEditorSource {
    pub fn new(url_template: Option<String>, year: i32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("editor_stats/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            url_template,
            year,
            client,
        })
    }

    fn url_for(&self, site: &str) -> Result<Url> {
        let template = self
            .url_template
            .as_ref()
            .ok_or_else(|| anyhow!("No primary_source_url configured for {site}"))?;
        let url = template
            .replace("{site}", site)
            .replace("{year}", &self.year.to_string());
        Url::parse(&url).map_err(|e| anyhow!("Invalid primary_source_url '{url}': {e}"))
    }

    /// Non-numeric values and bot-named accounts are dropped.
    pub fn parse_counts(json: &Value) -> Result<EditorCounts> {
        let map = json
            .as_object()
            .ok_or_else(|| anyhow!("Editor counts are not a JSON object"))?;
        let ret = map
            .iter()
            .filter(|(user, _)| !is_bot_name(user))
            .filter_map(|(user, count)| Some((user.to_owned(), count.as_u64()?)))
            .collect();
        Ok(ret)
    }
}

#[async_trait]
impl EditorSource for ApiEditorSource {
    #[instrument(skip(self, _titles), err)]
    async fn count_editors(&self, site: &str, _titles: &[String]) -> Result<EditorCounts> {
        let url = self.url_for(site)?;
        let json: Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let ret = Self::parse_counts(&json)?;
        if ret.is_empty() {
            warn!("Primary source returned no editors for {site}");
        }
        Ok(ret)
    }
}
