use crate::app_config::{AppConfig, SitePolicy};
use crate::editor_source::EditorCounts;
use serde::Serialize;
use std::net::IpAddr;

/// One row of a per-wiki leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEditor {
    pub user: String,
    pub count: u64,
}

/// Account names compare equal regardless of underscores vs spaces.
fn normalize_user(user: &str) -> String {
    user.replace('_', " ")
}

/// Drops IP editors, shared bots, low-activity and blocklisted accounts.
#[derive(Debug, Clone)]
pub struct EditorFilter {
    min_edits: u64,
    shared_bot_accounts: Vec<String>,
}

impl EditorFilter {
    pub fn new(min_edits: u64, shared_bot_accounts: &[String]) -> Self {
        Self {
            min_edits,
            shared_bot_accounts: shared_bot_accounts.to_vec(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.min_edits, &config.shared_bot_accounts)
    }

    /// True for IPv4/IPv6 literals and the shared-bot accounts.
    pub fn is_ip_or_shared_bot(&self, user: &str) -> bool {
        self.shared_bot_accounts.iter().any(|b| b == user) || user.parse::<IpAddr>().is_ok()
    }

    fn is_blocklisted(user: &str, blocklist: &[String]) -> bool {
        let user = normalize_user(user);
        blocklist.iter().any(|b| normalize_user(b) == user)
    }

    /// Descending by count; ties keep the input order.
    fn rank<I: IntoIterator<Item = RankedEditor>>(editors: I) -> Vec<RankedEditor> {
        let mut ret: Vec<RankedEditor> = editors.into_iter().collect();
        ret.sort_by(|a, b| b.count.cmp(&a.count));
        ret
    }

    /// The full per-wiki filter: IPs and shared bots, then the threshold, then
    /// the site's blocklist.
    pub fn filter_site(&self, counts: &EditorCounts, policy: &SitePolicy) -> Vec<RankedEditor> {
        Self::rank(
            counts
                .iter()
                .filter(|(user, _)| !self.is_ip_or_shared_bot(user))
                .filter(|(_, count)| **count >= self.min_edits)
                .filter(|(user, _)| !Self::is_blocklisted(user, &policy.blocklist))
                .map(|(user, count)| RankedEditor {
                    user: user.to_owned(),
                    count: *count,
                }),
        )
    }
}
