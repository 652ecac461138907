//! Conversions between the different ways a wiki is named: Wikidata site IDs
//! (`dewiki`), short site codes (`de`), replica database names (`dewiki`,
//! `be_x_oldwiki`) and interwiki prefixes (`de`, `zh-min-nan`).

/// Wikis whose site ID is not `<language>wiki`.
const NON_LANGUAGE_WIKIS: &[&str] = &["wikidata", "commons", "species", "meta", "incubator"];

/// Strips a trailing `wiki` from a Wikidata site ID: `dewiki` => `de`.
pub fn site_code(wiki_id: &str) -> String {
    wiki_id.strip_suffix("wiki").unwrap_or(wiki_id).to_string()
}

/// The Wikidata site ID for a short site code: `de` => `dewiki`.
pub fn wiki_id(site: &str) -> String {
    if site.ends_with("wiki") {
        site.to_string()
    } else {
        format!("{site}wiki")
    }
}

/// Replica database name (without the `_p` suffix) for a site code or site ID.
pub fn db_name(site: &str) -> String {
    let code = site_code(site);
    let code = match code.as_str() {
        "be-tarask" | "be_tarask" | "be-x-old" | "be_x_old" => "be_x_old",
        other => other,
    };
    format!("{}wiki", code.replace('-', "_"))
}

/// Interwiki prefix used in wikilinks and `*.wikipedia.org` hostnames.
pub fn interwiki_prefix(site: &str) -> String {
    site_code(site).replace('_', "-")
}

pub fn is_non_language_wiki(site: &str) -> bool {
    NON_LANGUAGE_WIKIS.contains(&site_code(site).as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_code() {
        assert_eq!(site_code("dewiki"), "de");
        assert_eq!(site_code("zh_min_nanwiki"), "zh_min_nan");
        assert_eq!(site_code("de"), "de");
    }

    #[test]
    fn test_wiki_id() {
        assert_eq!(wiki_id("fr"), "frwiki");
        assert_eq!(wiki_id("frwiki"), "frwiki");
        assert_eq!(wiki_id("wikidata"), "wikidatawiki");
    }

    #[test]
    fn test_db_name_regular_languages() {
        for (input, expected) in [("de", "dewiki"), ("fr", "frwiki"), ("ar", "arwiki"), ("nlwiki", "nlwiki")] {
            assert_eq!(db_name(input), expected);
        }
    }

    #[test]
    fn test_db_name_hyphenated() {
        assert_eq!(db_name("zh-min-nan"), "zh_min_nanwiki");
        assert_eq!(db_name("zh-yue"), "zh_yuewiki");
        assert_eq!(db_name("roa-rup"), "roa_rupwiki");
        assert_eq!(db_name("roa_tarawiki"), "roa_tarawiki");
    }

    #[test]
    fn test_db_name_be_tarask() {
        assert_eq!(db_name("be-tarask"), "be_x_oldwiki");
        assert_eq!(db_name("be-x-old"), "be_x_oldwiki");
        assert_eq!(db_name("be_x_oldwiki"), "be_x_oldwiki");
    }

    #[test]
    fn test_db_name_special_wikis() {
        assert_eq!(db_name("wikidata"), "wikidatawiki");
        assert_eq!(db_name("commons"), "commonswiki");
        assert_eq!(db_name("specieswiki"), "specieswiki");
        assert!(is_non_language_wiki("commonswiki"));
        assert!(!is_non_language_wiki("dewiki"));
    }

    #[test]
    fn test_interwiki_prefix() {
        assert_eq!(interwiki_prefix("zh_min_nanwiki"), "zh-min-nan");
        assert_eq!(interwiki_prefix("de"), "de");
    }
}
