use crate::database_manager::DatabaseManager;
use crate::kv_store::{self, KeyValueStore, QIDS_KEY};
use crate::sql_utils::SQLtuple;
use anyhow::Result;
use mysql_async::Value as MyValue;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};

/// Article talk pages tagged with the category, joined to the article's Wikidata item.
const ARTICLES_SQL: &str = "SELECT p.page_title, pp_value
    FROM page p, categorylinks, page_props, page p2
    WHERE p.page_id = cl_from
    AND cl_to = ?
    AND p.page_namespace = 1
    AND p2.page_namespace = 0
    AND pp_propname = 'wikibase_item'
    AND p.page_title = p2.page_title
    AND pp_page = p2.page_id";

/// Keeps well-formed item IDs, first occurrence only.
pub fn clean_item_ids<I: IntoIterator<Item = String>>(ids: I) -> Vec<String> {
    lazy_static! {
        static ref RE_QID: Regex = Regex::new(r"^Q\d+$").expect("RE_QID does not parse");
    }
    let mut seen = HashSet::new();
    ids.into_iter()
        .map(|id| id.trim().to_uppercase())
        .filter(|id| RE_QID.is_match(id))
        .filter(|id| seen.insert(id.to_owned()))
        .collect()
}

/// Supplies the Wikidata items of in-scope articles.
#[derive(Debug, Clone)]
pub struct IdentifierSource {
    db: DatabaseManager,
    store: Arc<dyn KeyValueStore>,
    home_wiki: String,
    category: String,
}

impl IdentifierSource {
    pub fn new(
        db: DatabaseManager,
        store: Arc<dyn KeyValueStore>,
        home_wiki: &str,
        category: &str,
    ) -> Self {
        Self {
            db,
            store,
            home_wiki: home_wiki.to_string(),
            category: category.to_string(),
        }
    }

    fn generate_sql_query(&self) -> SQLtuple {
        (
            ARTICLES_SQL.to_string(),
            vec![MyValue::Bytes(self.category.replace(' ', "_").into())],
        )
    }

    /// Queries the home wiki and persists the result.
    #[instrument(skip(self), fields(wiki = %self.home_wiki))]
    pub async fn fetch(&self) -> Result<Vec<String>> {
        let rows = self
            .db
            .query_wiki::<(Vec<u8>, Vec<u8>)>(&self.home_wiki, self.generate_sql_query())
            .await?;
        info!("len articles: {}", rows.len());
        let qids = clean_item_ids(
            rows.into_iter()
                .map(|(_title, qid)| String::from_utf8_lossy(&qid).into_owned()),
        );
        kv_store::save(self.store.as_ref(), QIDS_KEY, &qids).await?;
        info!("dumped {} qids", qids.len());
        Ok(qids)
    }

    /// The list persisted by the last [`Self::fetch`]; empty if there is none.
    pub async fn load(&self) -> Result<Vec<String>> {
        let qids: Option<Vec<String>> = kv_store::load(self.store.as_ref(), QIDS_KEY).await?;
        Ok(qids.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::MemoryStore;
    use std::time::Duration;

    fn source(store: Arc<dyn KeyValueStore>) -> IdentifierSource {
        let db = DatabaseManager::new(&Default::default(), Duration::from_secs(1));
        IdentifierSource::new(db, store, "enwiki", "All WikiProject Medicine pages")
    }

    #[test]
    fn test_clean_item_ids() {
        let ids = vec![
            "Q12".to_string(),
            "q7".to_string(),
            "P31".to_string(),
            "Q12".to_string(),
            " Q99 ".to_string(),
            "".to_string(),
        ];
        assert_eq!(clean_item_ids(ids), vec!["Q12", "Q7", "Q99"]);
    }

    #[test]
    fn test_generate_sql_query_uses_db_key() {
        let sql = source(Arc::new(MemoryStore::new())).generate_sql_query();
        assert!(sql.0.contains("cl_to = ?"));
        assert_eq!(
            sql.1,
            vec![MyValue::Bytes("All_WikiProject_Medicine_pages".into())]
        );
    }

    #[tokio::test]
    async fn test_load_persisted_qids() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let src = source(store.clone());
        assert!(src.load().await.unwrap().is_empty());
        kv_store::save(store.as_ref(), QIDS_KEY, &vec!["Q1", "Q2"])
            .await
            .unwrap();
        assert_eq!(src.load().await.unwrap(), vec!["Q1", "Q2"]);
    }
}
