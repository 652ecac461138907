use crate::aggregator::{CrossWikiAggregator, GlobalEditor};
use crate::app_config::AppConfig;
use crate::editor_counter::EditorCounter;
use crate::editor_filter::{EditorFilter, RankedEditor};
use crate::editor_source::EditorCounts;
use crate::kv_store::{self, KeyValueStore, EDITORS_NS, SITES_NS};
use crate::publisher::{PublishOutcome, Publisher};
use crate::render_wikitext::RenderWiki;
use crate::wiki_site;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Reports on wikis with fewer articles are still produced, but noted.
const FEW_ARTICLES: usize = 100;

/// What happened to one leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// No editors left after filtering; nothing rendered
    NoEditors,
    /// `dump` mode: data printed instead of published
    Dumped,
    Published(PublishOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteResult {
    pub site: String,
    pub editors: Vec<RankedEditor>,
    pub outcome: ReportOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnosis {
    /// (site ID, number of articles)
    pub sites: Vec<(String, usize)>,
    /// (site code, number of editors)
    pub editors: Vec<(String, usize)>,
    /// Site IDs with articles but no cached editor counts
    pub missing_editors: Vec<String>,
}

/// Per-wiki leaderboards and the all-wikis leaderboard, from the cached
/// sitelinks onwards.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<AppConfig>,
    store: Arc<dyn KeyValueStore>,
    counter: EditorCounter,
    filter: EditorFilter,
    renderer: RenderWiki,
    publisher: Option<Publisher>,
}

impl Pipeline {
    /// Without a publisher, computed leaderboards are printed as JSON.
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn KeyValueStore>,
        counter: EditorCounter,
        publisher: Option<Publisher>,
    ) -> Self {
        Self {
            filter: EditorFilter::from_config(&config),
            renderer: RenderWiki::new(&config),
            config,
            store,
            counter,
            publisher,
        }
    }

    /// Cached title lists, largest first, minus skipped wikis and anything
    /// that is not a `*wiki` site. `only` restricts to one site code.
    pub async fn sites_by_size(&self, only: Option<&str>) -> Result<Vec<(String, Vec<String>)>> {
        let mut ret = vec![];
        for entry in self.store.list(SITES_NS).await? {
            let wiki = entry.name;
            if !wiki.ends_with("wiki") || self.config.is_skipped(&wiki) {
                continue;
            }
            if let Some(only) = only {
                if wiki_site::wiki_id(only) != wiki {
                    continue;
                }
            }
            let key = kv_store::key(SITES_NS, &wiki);
            let links: Vec<String> = kv_store::load(self.store.as_ref(), &key)
                .await?
                .unwrap_or_default();
            ret.push((wiki, links));
        }
        Ok(ret)
    }

    fn dump<T: Serialize + ?Sized>(data: &T) {
        match serde_json::to_string_pretty(data) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("Cannot serialise data: {e}"),
        }
    }

    async fn publish_or_dump<T: Serialize + ?Sized>(
        &self,
        data: &T,
        report: impl FnOnce() -> crate::render_wikitext::Report,
    ) -> ReportOutcome {
        match &self.publisher {
            Some(publisher) => ReportOutcome::Published(publisher.publish(&report()).await),
            None => {
                Self::dump(data);
                ReportOutcome::Dumped
            }
        }
    }

    #[instrument(skip(self, links), fields(links = links.len()))]
    pub async fn work_in_one_site(&self, wiki: &str, links: &[String]) -> Result<SiteResult> {
        let site = wiki_site::site_code(wiki);
        info!("site:{site} links: {}", links.len());
        if links.len() < FEW_ARTICLES {
            info!("less than {FEW_ARTICLES} articles");
        }

        let counts = self.counter.get_editors(&site, links).await?;
        let policy = self.config.site_policy(&site);
        let editors = self.filter.filter_site(&counts, &policy);
        if editors.is_empty() {
            info!("no editors");
            return Ok(SiteResult {
                site,
                editors,
                outcome: ReportOutcome::NoEditors,
            });
        }

        let outcome = self
            .publish_or_dump(&editors, || {
                self.renderer
                    .render_site(&site, links.len(), &editors, policy.show_article_count)
            })
            .await;
        Ok(SiteResult {
            site,
            editors,
            outcome,
        })
    }

    /// One wiki after another, largest first. A failing wiki is logged and
    /// the run continues with the next.
    pub async fn work_in_all_sites(&self, only: Option<&str>) -> Result<Vec<SiteResult>> {
        let sites = self.sites_by_size(only).await?;
        let mut ret = vec![];
        for (num, (wiki, links)) in sites.iter().enumerate() {
            info!("n: {} site: {wiki}", num + 1);
            match self.work_in_one_site(wiki, links).await {
                Ok(result) => ret.push(result),
                Err(e) => warn!("site {wiki} failed: {e}"),
            }
        }
        Ok(ret)
    }

    /// Merges every cached editor map, largest file first.
    pub async fn get_all_editors(&self) -> Result<Vec<GlobalEditor>> {
        let mut aggregator = CrossWikiAggregator::new(&self.config.skip_sites);
        for entry in self.store.list(EDITORS_NS).await? {
            if aggregator.is_skipped(&entry.name) {
                continue;
            }
            let key = kv_store::key(EDITORS_NS, &entry.name);
            let counts: EditorCounts = kv_store::load(self.store.as_ref(), &key)
                .await?
                .unwrap_or_default();
            info!("file: {} editors: {}", entry.name, counts.len());
            aggregator.add(&entry.name, &counts);
        }
        info!("len all_editors: {}", aggregator.len());
        Ok(aggregator.finish(&self.filter))
    }

    pub async fn work_all_editors(&self, editors: &[GlobalEditor]) -> ReportOutcome {
        if editors.is_empty() {
            info!("no editors");
            return ReportOutcome::NoEditors;
        }
        self.publish_or_dump(editors, || self.renderer.render_global(editors))
            .await
    }

    pub async fn run_all_editors(&self) -> Result<ReportOutcome> {
        let editors = self.get_all_editors().await?;
        Ok(self.work_all_editors(&editors).await)
    }

    /// Which wikis have articles, which have editor counts, and which have
    /// the former but not the latter.
    pub async fn diagnose(&self) -> Result<Diagnosis> {
        let mut ret = Diagnosis::default();
        for entry in self.store.list(SITES_NS).await? {
            let key = kv_store::key(SITES_NS, &entry.name);
            let links: Vec<String> = kv_store::load(self.store.as_ref(), &key)
                .await?
                .unwrap_or_default();
            ret.sites.push((entry.name, links.len()));
        }
        for entry in self.store.list(EDITORS_NS).await? {
            let key = kv_store::key(EDITORS_NS, &entry.name);
            let counts: EditorCounts = kv_store::load(self.store.as_ref(), &key)
                .await?
                .unwrap_or_default();
            ret.editors.push((entry.name, counts.len()));
        }
        let with_editors: BTreeSet<String> = ret
            .editors
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(site, _)| wiki_site::wiki_id(site))
            .collect();
        ret.missing_editors = ret
            .sites
            .iter()
            .map(|(wiki, _)| wiki)
            .filter(|wiki| wiki.ends_with("wiki"))
            .filter(|wiki| !self.config.is_skipped(wiki) && !wiki_site::is_non_language_wiki(wiki))
            .filter(|wiki| !with_editors.contains(*wiki))
            .cloned()
            .collect();

        info!(
            "{} site files, {} editor files",
            ret.sites.len(),
            ret.editors.len()
        );
        for (wiki, count) in &ret.sites {
            info!("site {wiki}: {count} articles");
        }
        for (site, count) in &ret.editors {
            info!("editors {site}: {count} editors");
        }
        for wiki in &ret.missing_editors {
            warn!("{wiki} has articles but no editor data");
        }
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor_source::EditorSource;
    use crate::kv_store::MemoryStore;
    use crate::publisher::tests::FakePages;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct NoSource;

    #[async_trait]
    impl EditorSource for NoSource {
        async fn count_editors(&self, site: &str, _titles: &[String]) -> Result<EditorCounts> {
            Err(anyhow!("no replica for {site} in tests"))
        }
    }

    fn config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            year: Some(2024),
            ..Default::default()
        })
    }

    fn pipeline(store: Arc<dyn KeyValueStore>, pages: Option<Arc<FakePages>>) -> Pipeline {
        let config = config();
        let counter = EditorCounter::new(
            config.clone(),
            store.clone(),
            Arc::new(NoSource),
            Arc::new(NoSource),
        );
        let publisher = pages.map(|p| Publisher::new(p, "update"));
        Pipeline::new(config, store, counter, publisher)
    }

    async fn scenario_store() -> Arc<dyn KeyValueStore> {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store
            .put("sites/dewiki", &json!(["Herz", "Lunge"]))
            .await
            .unwrap();
        store.put("sites/frwiki", &json!(["Cœur"])).await.unwrap();
        store
            .put("editors/de", &json!({"Alice": 50, "192.168.0.1": 999}))
            .await
            .unwrap();
        store.put("editors/fr", &json!({"Bob": 5})).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_per_site_reports() {
        let pages = Arc::new(FakePages::default());
        let p = pipeline(scenario_store().await, Some(pages.clone()));
        let results = p.work_in_all_sites(None).await.unwrap();
        assert_eq!(results.len(), 2);

        let de = results.iter().find(|r| r.site == "de").unwrap();
        assert_eq!(
            de.editors,
            vec![RankedEditor {
                user: "Alice".to_string(),
                count: 50
            }]
        );
        assert_eq!(de.outcome, ReportOutcome::Published(PublishOutcome::Saved));

        let fr = results.iter().find(|r| r.site == "fr").unwrap();
        assert!(fr.editors.is_empty());
        assert_eq!(fr.outcome, ReportOutcome::NoEditors);

        assert_eq!(
            *pages.saves.lock().unwrap(),
            vec!["WikiProjectMed:WikiProject_Medicine/Stats/Top_medical_editors_2024/de"]
        );
        let text = pages.pages.lock().unwrap()
            ["WikiProjectMed:WikiProject_Medicine/Stats/Top_medical_editors_2024/de"]
            .clone();
        assert!(text.contains("[[:w:de:user:Alice|Alice]]\n|50"));
        assert!(!text.contains("192.168.0.1"));
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let pages = Arc::new(FakePages::default());
        let p = pipeline(scenario_store().await, Some(pages.clone()));
        p.work_in_all_sites(Some("de")).await.unwrap();
        let results = p.work_in_all_sites(Some("de")).await.unwrap();
        assert_eq!(
            results[0].outcome,
            ReportOutcome::Published(PublishOutcome::Unchanged)
        );
        assert_eq!(pages.save_count(), 1);
    }

    #[tokio::test]
    async fn test_site_restriction_and_skips() {
        let store = scenario_store().await;
        store.put("sites/enwiki", &json!(["Heart", "Lung"])).await.unwrap();
        store.put("sites/enwikiquote", &json!(["Heart"])).await.unwrap();
        let p = pipeline(store, None);
        let all: Vec<String> = p
            .sites_by_size(None)
            .await
            .unwrap()
            .into_iter()
            .map(|(wiki, _)| wiki)
            .collect();
        assert_eq!(all, vec!["dewiki", "frwiki"]);
        let only = p.sites_by_size(Some("fr")).await.unwrap();
        assert_eq!(only, vec![("frwiki".to_string(), vec!["Cœur".to_string()])]);
    }

    #[tokio::test]
    async fn test_dump_mode_does_not_publish() {
        let p = pipeline(scenario_store().await, None);
        let results = p.work_in_all_sites(Some("de")).await.unwrap();
        assert_eq!(results[0].outcome, ReportOutcome::Dumped);
    }

    #[tokio::test]
    async fn test_all_editors_best_site() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store
            .put("editors/de", &json!({"Alice": 50, "Bob": 30}))
            .await
            .unwrap();
        store.put("editors/fr", &json!({"Alice": 80})).await.unwrap();
        store.put("editors/en", &json!({"Alice": 900})).await.unwrap();
        let pages = Arc::new(FakePages::default());
        let p = pipeline(store, Some(pages.clone()));
        let editors = p.get_all_editors().await.unwrap();
        assert_eq!(
            editors[0],
            GlobalEditor {
                user: "Alice".to_string(),
                count: 80,
                site: "fr".to_string()
            }
        );
        assert_eq!(editors[1].site, "de");
        assert_eq!(
            p.work_all_editors(&editors).await,
            ReportOutcome::Published(PublishOutcome::Saved)
        );
        assert_eq!(pages.save_count(), 1);
    }

    #[tokio::test]
    async fn test_all_editors_empty() {
        let p = pipeline(Arc::new(MemoryStore::new()), None);
        assert_eq!(p.run_all_editors().await.unwrap(), ReportOutcome::NoEditors);
    }

    #[tokio::test]
    async fn test_diagnose() {
        let store = scenario_store().await;
        store.put("sites/eswiki", &json!(["Corazón"])).await.unwrap();
        store.put("sites/commonswiki", &json!(["Heart"])).await.unwrap();
        let p = pipeline(store, None);
        let d = p.diagnose().await.unwrap();
        assert_eq!(d.sites.len(), 4);
        assert_eq!(d.editors.len(), 2);
        assert_eq!(d.missing_editors, vec!["eswiki"]);
    }
}
