use crate::editor_filter::EditorFilter;
use crate::editor_source::EditorCounts;
use crate::wiki_site;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// An editor's best single-wiki count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalEditor {
    pub user: String,
    pub count: u64,
    pub site: String,
}

/// Merges per-wiki counts, keeping each editor's highest count and the wiki
/// it came from. Sources must be added largest-first: on a tie the earlier
/// site is kept.
#[derive(Debug, Clone, Default)]
pub struct CrossWikiAggregator {
    skip_sites: Vec<String>,
    best: HashMap<String, GlobalEditor>,
    first_seen: Vec<String>,
}

impl CrossWikiAggregator {
    pub fn new(skip_sites: &[String]) -> Self {
        Self {
            skip_sites: skip_sites.to_vec(),
            ..Default::default()
        }
    }

    pub fn is_skipped(&self, site: &str) -> bool {
        let wiki = wiki_site::wiki_id(site);
        self.skip_sites.iter().any(|s| *s == wiki)
    }

    /// Returns false if the site is excluded from aggregation.
    pub fn add(&mut self, site: &str, counts: &EditorCounts) -> bool {
        if self.is_skipped(site) {
            debug!("skipping {site}");
            return false;
        }
        for (user, count) in counts {
            match self.best.get_mut(user) {
                Some(best) => {
                    if *count > best.count {
                        best.count = *count;
                        best.site = site.to_string();
                    }
                }
                None => {
                    self.first_seen.push(user.to_owned());
                    self.best.insert(
                        user.to_owned(),
                        GlobalEditor {
                            user: user.to_owned(),
                            count: *count,
                            site: site.to_string(),
                        },
                    );
                }
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.best.len()
    }

    pub fn is_empty(&self) -> bool {
        self.best.is_empty()
    }

    /// Drops IP editors and shared bots, then ranks by count. Ties keep the
    /// order in which editors were first seen.
    pub fn finish(mut self, filter: &EditorFilter) -> Vec<GlobalEditor> {
        let mut ret: Vec<GlobalEditor> = self
            .first_seen
            .iter()
            .filter(|user| !filter.is_ip_or_shared_bot(user))
            .filter_map(|user| self.best.remove(user))
            .collect();
        ret.sort_by(|a, b| b.count.cmp(&a.count));
        ret
    }
}
