use crate::aggregator::GlobalEditor;
use crate::app_config::AppConfig;
use crate::editor_filter::RankedEditor;
use crate::wiki_site;
use num_format::{Locale, ToFormattedString};

const TOTALS_TEMPLATE: &str = "{{:WPM:WikiProject Medicine/Total medical articles}}";

/// A rendered page, ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub title: String,
    pub text: String,
}

/// Renders leaderboards as wiki text
#[derive(Debug, Clone)]
pub struct RenderWiki {
    year: i32,
    site_title_prefix: String,
    global_title: String,
    per_site_max_rows: usize,
    global_max_rows: Option<usize>,
    min_edits: u64,
}

impl RenderWiki {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            year: config.report_year(),
            site_title_prefix: format!("{}_{}", config.report_title_prefix, config.report_year()),
            global_title: config.global_report_title(),
            per_site_max_rows: config.per_site_max_rows,
            global_max_rows: config.global_max_rows,
            min_edits: config.min_edits,
        }
    }

    fn header(&self) -> String {
        format!(
            "{TOTALS_TEMPLATE}\n{{{{Top medical editors by lang|{}}}}}\n",
            self.year
        )
    }

    fn user_link(site: &str, user: &str) -> String {
        format!("[[:w:{site}:user:{user}|{user}]]")
    }

    /// The per-wiki leaderboard, capped at the per-site row limit.
    pub fn render_site(
        &self,
        site: &str,
        article_count: usize,
        editors: &[RankedEditor],
        show_article_count: bool,
    ) -> Report {
        let site = wiki_site::site_code(site);
        let prefix = wiki_site::interwiki_prefix(&site);
        let mut text = self.header();
        if show_article_count {
            text += &format!(
                "Numbers of {}. There are {} articles in {site}\n",
                self.year,
                article_count.to_formatted_string(&Locale::en)
            );
        }
        text += "{| class=\"sortable wikitable\"\n!#\n!User\n!Count\n|-";
        for (i, editor) in editors.iter().take(self.per_site_max_rows).enumerate() {
            let user = editor.user.replace('_', " ");
            text += &format!(
                "\n|-\n!{}\n|{}\n|{}",
                i + 1,
                Self::user_link(&prefix, &user),
                editor.count.to_formatted_string(&Locale::en)
            );
        }
        text += "\n|}";
        Report {
            title: format!("{}/{site}", self.site_title_prefix),
            text,
        }
    }

    /// Preformatted `#target` lines, consumed by a template on the wiki.
    fn targets_block(targets: &str) -> String {
        let mut ret = "{| class=\"sortable wikitable floatright\"\n|\n".to_string();
        ret += "<div style=\"max-height:250px; overflow: auto;vertical-align:top;font-size:90%;max-width:400px\">\n";
        ret += "<pre>\n";
        ret += targets;
        ret += "\n</pre>";
        ret += "\n</div>";
        ret += "\n|-\n|}";
        ret
    }

    /// The all-wikis leaderboard. Rows stop at the first editor below the
    /// edit threshold, or at the global row cap.
    pub fn render_global(&self, editors: &[GlobalEditor]) -> Report {
        let mut text = self.header();
        text += &format!("Numbers of {}.\n", self.year);

        let mut table = "{| class=\"sortable wikitable\"\n!#\n!User\n!Count\n!Wiki\n".to_string();
        let mut targets = String::new();
        let max_rows = self.global_max_rows.unwrap_or(usize::MAX);
        for (i, editor) in editors
            .iter()
            .take_while(|e| e.count >= self.min_edits)
            .take(max_rows)
            .enumerate()
        {
            let user = editor.user.replace('_', " ");
            let wiki = wiki_site::interwiki_prefix(&editor.site);
            targets += &format!("#{{{{#target:User:{user}|{wiki}.wikipedia.org}}}}\n");
            table += &format!(
                "|-\n!{}\n|{}\n|{}\n|{wiki}\n",
                i + 1,
                Self::user_link(&wiki, &user),
                editor.count.to_formatted_string(&Locale::en)
            );
        }
        table += "\n|}";

        text += &Self::targets_block(&targets);
        text += &format!("\n==users==\n{table}");
        Report {
            title: self.global_title.to_owned(),
            text,
        }
    }
}
