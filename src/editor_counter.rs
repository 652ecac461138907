use crate::app_config::{AppConfig, EditorSourceKind};
use crate::editor_source::{accumulate, EditorCounts, EditorSource};
use crate::kv_store::{self, KeyValueStore, EDITORS_NS};
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Per-wiki editor counts, with the store as a read-through cache.
#[derive(Debug, Clone)]
pub struct EditorCounter {
    config: Arc<AppConfig>,
    store: Arc<dyn KeyValueStore>,
    replica: Arc<dyn EditorSource>,
    primary: Arc<dyn EditorSource>,
    bypass_cache: bool,
}

impl EditorCounter {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn KeyValueStore>,
        replica: Arc<dyn EditorSource>,
        primary: Arc<dyn EditorSource>,
    ) -> Self {
        Self {
            config,
            store,
            replica,
            primary,
            bypass_cache: false,
        }
    }

    /// Ignore cached counts and always query (`nolocal`).
    pub fn set_bypass_cache(&mut self, bypass_cache: bool) {
        self.bypass_cache = bypass_cache;
    }

    async fn cached(&self, site: &str) -> Result<Option<EditorCounts>> {
        if self.bypass_cache {
            return Ok(None);
        }
        let counts: Option<EditorCounts> =
            kv_store::load(self.store.as_ref(), &kv_store::key(EDITORS_NS, site)).await?;
        Ok(counts.filter(|c| !c.is_empty()))
    }

    /// Queries `titles` in chunks, summing counts of editors that appear in
    /// several chunks. A failed chunk is logged and skipped.
    pub async fn count_in_batches(
        &self,
        source: &dyn EditorSource,
        site: &str,
        titles: &[String],
    ) -> EditorCounts {
        let batch_size = self.config.sql_batch_size.max(1);
        let batches = titles.len().div_ceil(batch_size);
        let mut ret = EditorCounts::new();
        for (num, batch) in titles.chunks(batch_size).enumerate() {
            info!("site:{site} batch {}/{batches}", num + 1);
            match source.count_editors(site, batch).await {
                Ok(counts) => accumulate(&mut ret, counts),
                Err(e) => warn!("site:{site} batch {} failed, skipping: {e}", num + 1),
            }
        }
        ret
    }

    async fn fresh(&self, site: &str, titles: &[String]) -> EditorCounts {
        match self.config.site_policy(site).source {
            EditorSourceKind::Replica => {
                self.count_in_batches(self.replica.as_ref(), site, titles)
                    .await
            }
            EditorSourceKind::Api => match self.primary.count_editors(site, titles).await {
                Ok(counts) => counts,
                Err(e) => {
                    error!("site:{site} primary source failed: {e}");
                    EditorCounts::new()
                }
            },
        }
    }

    /// Counts for `site`. A non-empty cached result is returned as-is;
    /// otherwise the wiki is queried and a non-empty result is cached.
    #[instrument(skip(self, titles), fields(titles = titles.len()))]
    pub async fn get_editors(&self, site: &str, titles: &[String]) -> Result<EditorCounts> {
        if let Some(counts) = self.cached(site).await? {
            info!("site:{site} using {} cached editors", counts.len());
            return Ok(counts);
        }
        let counts = self.fresh(site, titles).await;
        if counts.is_empty() {
            error!("no editors for {site} to dump");
        } else {
            kv_store::save(
                self.store.as_ref(),
                &kv_store::key(EDITORS_NS, site),
                &counts,
            )
            .await?;
        }
        Ok(counts)
    }
}
