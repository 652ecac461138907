use crate::app_config::AppConfig;
use crate::kv_store::{self, KeyValueStore, ITEM_SITELINKS_NS, SITES_NS};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use wikimisc::mediawiki::api::Api;
use wikimisc::mediawiki::reqwest::ClientBuilder;

/// Wikidata site ID => local article titles
pub type SitelinkSet = BTreeMap<String, Vec<String>>;

/// Batch lookup of Wikidata entities. `None` means the batch could not be
/// fetched; callers skip it.
#[async_trait]
pub trait EntityLookup: Send + Sync + fmt::Debug {
    async fn get_entities(&self, ids: &[String]) -> Option<Value>;
}

// ---------------------------------------------------------------------------
// WikidataEntityLookup – wbgetentities via the MediaWiki API
// ---------------------------------------------------------------------------

pub struct WikidataEntityLookup {
    api: Api,
}

impl fmt::Debug for WikidataEntityLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WikidataEntityLookup").finish_non_exhaustive()
    }
}

impl WikidataEntityLookup {
    /// Connects to the Wikidata API. Bot credentials, when configured, raise
    /// the per-request ID limit; a failed login falls back to anonymous use.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let builder = ClientBuilder::new().timeout(config.http_timeout());
        let mut api = Api::new_from_builder(&config.wikidata_api, builder)
            .await
            .map_err(|e| anyhow!("Can't talk to Wikidata API: {e}"))?;
        if config.has_bot_credentials() {
            info!("Logging in to Wikidata as {}...", config.bot_username);
            match api
                .login(config.bot_username.to_owned(), config.bot_password.to_owned())
                .await
            {
                Ok(_) => info!("Login successful"),
                Err(e) => error!("Wikidata login failed, continuing anonymously: {e}"),
            }
        } else {
            warn!("No bot credentials provided, running without authentication");
        }
        Ok(Self { api })
    }
}

#[async_trait]
impl EntityLookup for WikidataEntityLookup {
    async fn get_entities(&self, ids: &[String]) -> Option<Value> {
        let ids = ids.join("|");
        let params = self.api.params_into(&[
            ("action", "wbgetentities"),
            ("format", "json"),
            ("ids", ids.as_str()),
            ("redirects", "yes"),
            ("props", "sitelinks"),
            ("utf8", "1"),
        ]);
        match self.api.post_query_api_json(&params).await {
            Ok(json) if json.get("error").is_some() => {
                warn!("wbgetentities returned an error: {}", json["error"]);
                None
            }
            Ok(json) => Some(json),
            Err(e) => {
                warn!("wbgetentities failed: {e}");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SitelinkResolver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SitelinkResolver {
    lookup: Arc<dyn EntityLookup>,
    store: Arc<dyn KeyValueStore>,
    batch_size: usize,
    cache_items: bool,
}

impl SitelinkResolver {
    pub fn new(
        lookup: Arc<dyn EntityLookup>,
        store: Arc<dyn KeyValueStore>,
        batch_size: usize,
        cache_items: bool,
    ) -> Self {
        Self {
            lookup,
            store,
            batch_size: batch_size.max(1),
            cache_items,
        }
    }

    /// Loads the per-item sitelinks already in the store; returns the IDs
    /// that still need fetching.
    async fn load_cached_items(
        &self,
        qids: &[String],
        all_sitelinks: &mut BTreeMap<String, Value>,
    ) -> Result<Vec<String>> {
        if !self.cache_items {
            return Ok(qids.to_vec());
        }
        let mut missing = vec![];
        for qid in qids {
            let key = kv_store::key(ITEM_SITELINKS_NS, qid);
            match self.store.get(&key).await? {
                Some(sitelinks) => {
                    all_sitelinks.insert(qid.to_owned(), sitelinks);
                }
                None => missing.push(qid.to_owned()),
            }
        }
        info!(
            "{} of {} items loaded from cache",
            qids.len() - missing.len(),
            qids.len()
        );
        Ok(missing)
    }

    /// Resolves items to their sitelinks, in batches. Failed batches are
    /// logged and skipped.
    #[instrument(skip_all, fields(items = qids.len()))]
    pub async fn resolve(&self, qids: &[String]) -> Result<SitelinkSet> {
        let mut all_sitelinks: BTreeMap<String, Value> = BTreeMap::new();
        let to_fetch = self.load_cached_items(qids, &mut all_sitelinks).await?;

        for batch in to_fetch.chunks(self.batch_size) {
            info!(
                "done:{} from {}, get sitelinks for {} qids.",
                all_sitelinks.len(),
                qids.len(),
                batch.len()
            );
            let json = match self.lookup.get_entities(batch).await {
                Some(json) => json,
                None => {
                    warn!("No entities returned for batch starting at {}; skipping", batch[0]);
                    continue;
                }
            };
            let entities = match json["entities"].as_object() {
                Some(entities) => entities,
                None => {
                    warn!("Response without entities for batch starting at {}; skipping", batch[0]);
                    continue;
                }
            };
            for (qid, entity) in entities {
                let sitelinks = entity
                    .get("sitelinks")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Default::default()));
                if self.cache_items {
                    let key = kv_store::key(ITEM_SITELINKS_NS, qid);
                    self.store.put(&key, &sitelinks).await?;
                    // A redirected ID comes back under its target
                    if let Some(from) = entity["redirects"]["from"].as_str() {
                        if from != qid {
                            let key = kv_store::key(ITEM_SITELINKS_NS, from);
                            self.store.put(&key, &sitelinks).await?;
                        }
                    }
                }
                all_sitelinks.insert(qid.to_owned(), sitelinks);
            }
        }

        Ok(Self::group_by_site(&all_sitelinks))
    }

    /// `{"Q1": {"dewiki": {"site": "dewiki", "title": "Herz"}}}` => `{"dewiki": ["Herz"]}`
    fn group_by_site(all_sitelinks: &BTreeMap<String, Value>) -> SitelinkSet {
        let mut ret = SitelinkSet::new();
        for sitelinks in all_sitelinks.values() {
            let sitelinks = match sitelinks.as_object() {
                Some(s) => s,
                None => continue,
            };
            for (key, link) in sitelinks {
                let site = link["site"].as_str().unwrap_or(key);
                let title = match link["title"].as_str() {
                    Some(title) => title,
                    None => continue,
                };
                ret.entry(site.to_string())
                    .or_default()
                    .push(title.to_string());
            }
        }
        ret
    }

    /// Writes one title list per site, replacing the previous one. Empty
    /// lists are not written.
    pub async fn save(&self, sitelinks: &SitelinkSet) -> Result<()> {
        info!("save sitelink data, len sites: {}", sitelinks.len());
        if sitelinks.is_empty() {
            warn!("no sitelink data to save");
            return Ok(());
        }
        for (site, links) in sitelinks {
            if links.is_empty() {
                info!("no links for {site}");
                continue;
            }
            kv_store::save(self.store.as_ref(), &kv_store::key(SITES_NS, site), links).await?;
            info!("dump {site} of {}", links.len());
        }
        Ok(())
    }

    pub async fn resolve_and_save(&self, qids: &[String]) -> Result<SitelinkSet> {
        let sitelinks = self.resolve(qids).await?;
        self.save(&sitelinks).await?;
        Ok(sitelinks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::MemoryStore;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakeLookup {
        entities: HashMap<String, Value>,
        fail_containing: Option<String>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakeLookup {
        fn with(entities: Vec<(&str, Value)>) -> Self {
            Self {
                entities: entities
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EntityLookup for FakeLookup {
        async fn get_entities(&self, ids: &[String]) -> Option<Value> {
            self.calls.lock().unwrap().push(ids.to_vec());
            if let Some(bad) = &self.fail_containing {
                if ids.contains(bad) {
                    return None;
                }
            }
            let entities: serde_json::Map<String, Value> = ids
                .iter()
                .filter_map(|id| {
                    let entity = self.entities.get(id)?;
                    let key = entity["id"].as_str().unwrap_or(id);
                    Some((key.to_string(), entity.to_owned()))
                })
                .collect();
            Some(json!({ "entities": entities }))
        }
    }

    fn entity(links: &[(&str, &str)]) -> Value {
        let sitelinks: serde_json::Map<String, Value> = links
            .iter()
            .map(|(site, title)| {
                (
                    site.to_string(),
                    json!({"site": site, "title": title, "badges": []}),
                )
            })
            .collect();
        json!({ "sitelinks": sitelinks })
    }

    fn qids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_resolve_groups_titles_by_site() {
        let lookup = Arc::new(FakeLookup::with(vec![
            ("Q1", entity(&[("dewiki", "Herz"), ("frwiki", "Cœur")])),
            ("Q2", entity(&[("dewiki", "Lunge")])),
        ]));
        let resolver = SitelinkResolver::new(lookup.clone(), Arc::new(MemoryStore::new()), 1, false);
        let ret = resolver.resolve(&qids(&["Q1", "Q2"])).await.unwrap();
        assert_eq!(ret["dewiki"], vec!["Herz", "Lunge"]);
        assert_eq!(ret["frwiki"], vec!["Cœur"]);
        assert_eq!(lookup.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_skips_failed_batch() {
        let mut lookup = FakeLookup::with(vec![
            ("Q1", entity(&[("dewiki", "Herz")])),
            ("Q2", entity(&[("dewiki", "Lunge")])),
            ("Q3", entity(&[("dewiki", "Niere")])),
        ]);
        lookup.fail_containing = Some("Q2".to_string());
        let lookup = Arc::new(lookup);
        let resolver = SitelinkResolver::new(lookup.clone(), Arc::new(MemoryStore::new()), 2, false);
        let ret = resolver.resolve(&qids(&["Q1", "Q2", "Q3"])).await.unwrap();
        assert_eq!(ret["dewiki"], vec!["Niere"]);
        assert_eq!(lookup.calls(), vec![qids(&["Q1", "Q2"]), qids(&["Q3"])]);
    }

    #[tokio::test]
    async fn test_item_cache_skips_known_items() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store
            .put(
                "sitelinks/Q1",
                &json!({"dewiki": {"site": "dewiki", "title": "Herz"}}),
            )
            .await
            .unwrap();
        let lookup = Arc::new(FakeLookup::with(vec![(
            "Q2",
            entity(&[("frwiki", "Poumon")]),
        )]));
        let resolver = SitelinkResolver::new(lookup.clone(), store.clone(), 50, true);
        let ret = resolver.resolve(&qids(&["Q1", "Q2"])).await.unwrap();
        assert_eq!(lookup.calls(), vec![qids(&["Q2"])]);
        assert_eq!(ret["dewiki"], vec!["Herz"]);
        assert_eq!(ret["frwiki"], vec!["Poumon"]);
        assert!(store.exists("sitelinks/Q2").await.unwrap());
    }

    #[tokio::test]
    async fn test_item_cache_stores_redirected_ids() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut redirected = entity(&[("dewiki", "Herz")]);
        redirected["id"] = json!("Q3");
        redirected["redirects"] = json!({"from": "Q2", "to": "Q3"});
        let lookup = Arc::new(FakeLookup::with(vec![("Q2", redirected)]));
        let resolver = SitelinkResolver::new(lookup.clone(), store.clone(), 50, true);
        let ret = resolver.resolve(&qids(&["Q2"])).await.unwrap();
        assert_eq!(ret["dewiki"], vec!["Herz"]);
        assert!(store.exists("sitelinks/Q3").await.unwrap());
        assert!(store.exists("sitelinks/Q2").await.unwrap());

        // The next run finds Q2 in the cache
        let ret = resolver.resolve(&qids(&["Q2"])).await.unwrap();
        assert_eq!(ret["dewiki"], vec!["Herz"]);
        assert_eq!(lookup.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_save_writes_one_entry_per_site() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let resolver = SitelinkResolver::new(
            Arc::new(FakeLookup::default()),
            store.clone(),
            50,
            false,
        );
        let mut set = SitelinkSet::new();
        set.insert("dewiki".to_string(), vec!["Herz".to_string()]);
        set.insert("frwiki".to_string(), vec![]);
        resolver.save(&set).await.unwrap();
        assert_eq!(
            store.get("sites/dewiki").await.unwrap(),
            Some(json!(["Herz"]))
        );
        assert!(!store.exists("sites/frwiki").await.unwrap());
    }
}
