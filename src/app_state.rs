use crate::app_config::AppConfig;
use crate::database_manager::DatabaseManager;
use crate::editor_counter::EditorCounter;
use crate::editor_source::{ApiEditorSource, ReplicaEditorSource};
use crate::identifier_source::IdentifierSource;
use crate::kv_store::{FileStore, KeyValueStore};
use crate::publisher::{Publisher, WikiPageStore};
use crate::sitelinks::{SitelinkResolver, WikidataEntityLookup};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;

// ---------------------------------------------------------------------------
// AppState – wires config, cache store and external services together
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    store: Arc<dyn KeyValueStore>,
    db_manager: DatabaseManager,
}

impl AppState {
    pub fn new_from_config(config: AppConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.dump_path).map_err(|e| {
            anyhow!(
                "Cannot create cache directory {}: {e}",
                config.dump_path.display()
            )
        })?;
        info!("Cache directory: {}", config.dump_path.display());
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.dump_path));
        let db_manager = DatabaseManager::new(&config.replica, config.sql_timeout());
        Ok(Self {
            config: Arc::new(config),
            store,
            db_manager,
        })
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        self.store.clone()
    }

    pub fn identifier_source(&self) -> IdentifierSource {
        IdentifierSource::new(
            self.db_manager.clone(),
            self.store(),
            &self.config.home_wiki,
            &self.config.category,
        )
    }

    /// Connects to Wikidata.
    pub async fn sitelink_resolver(&self) -> Result<SitelinkResolver> {
        let lookup = WikidataEntityLookup::connect(&self.config).await?;
        Ok(SitelinkResolver::new(
            Arc::new(lookup),
            self.store(),
            self.config.sitelink_batch_size(),
            self.config.cache_item_sitelinks,
        ))
    }

    pub fn editor_counter(&self, bypass_cache: bool) -> Result<EditorCounter> {
        let year = self.config.report_year();
        let replica = ReplicaEditorSource::new(self.db_manager.clone(), year);
        let primary = ApiEditorSource::new(
            self.config.primary_source_url.clone(),
            year,
            self.config.http_timeout(),
        )?;
        let mut counter = EditorCounter::new(
            self.config(),
            self.store(),
            Arc::new(replica),
            Arc::new(primary),
        );
        counter.set_bypass_cache(bypass_cache);
        Ok(counter)
    }

    /// Connects and logs in to the destination wiki.
    pub async fn publisher(&self) -> Result<Publisher> {
        let pages = WikiPageStore::connect(&self.config).await?;
        Ok(Publisher::new(Arc::new(pages), &self.config.edit_summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_from_config_creates_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("editors_stats_dump");
        let state = AppState::new_from_config(AppConfig {
            dump_path: root.clone(),
            ..Default::default()
        })
        .unwrap();
        assert!(root.is_dir());
        assert_eq!(state.config().home_wiki, "enwiki");
        assert!(state.editor_counter(true).is_ok());
    }

    #[tokio::test]
    async fn test_store_is_file_backed() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new_from_config(AppConfig {
            dump_path: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        state
            .store()
            .put("qids", &serde_json::json!(["Q1"]))
            .await
            .unwrap();
        assert!(dir.path().join("qids.json").is_file());
        assert_eq!(state.identifier_source().load().await.unwrap(), vec!["Q1"]);
    }
}
