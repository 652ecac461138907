use mysql_async::Value as MyValue;

pub type SQLtuple = (String, Vec<MyValue>);

/// Returns a tuple with a string containing comma-separated question marks, and the (non-empty) Vec elements
pub fn prep_quote(strings: &[String]) -> SQLtuple {
    let escaped: Vec<MyValue> = strings
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| MyValue::Bytes(s.into()))
        .collect();
    (get_placeholders(escaped.len()), escaped)
}

/// Generates a string with `len` comma-separated question marks
pub fn get_placeholders(len: usize) -> String {
    let mut questionmarks: Vec<String> = Vec::new();
    questionmarks.resize(len, "?".to_string());
    questionmarks.join(",")
}

/// Appends `sub` (both SQL string and parameters) onto `sql`
pub fn append_sql(sql: &mut SQLtuple, mut sub: SQLtuple) {
    sql.0 += &sub.0;
    sql.1.append(&mut sub.1);
}

/// Page titles are stored with underscores on the replicas
pub fn title_to_db_key(title: &str) -> String {
    title.trim().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(t: &[&str]) -> Vec<String> {
        t.iter().map(|s| title_to_db_key(s)).collect()
    }

    #[test]
    fn test_prep_quote_titles() {
        let (placeholders, values) = prep_quote(&titles(&["Herz", "Diabetes mellitus"]));
        assert_eq!(placeholders, "?,?");
        assert_eq!(
            values,
            vec![
                MyValue::Bytes("Herz".into()),
                MyValue::Bytes("Diabetes_mellitus".into())
            ]
        );
    }

    #[test]
    fn test_prep_quote_skips_blank_titles() {
        let (placeholders, values) = prep_quote(&titles(&["Cœur", " ", "Poumon"]));
        assert_eq!(placeholders, "?,?");
        assert_eq!(values[0], MyValue::Bytes("Cœur".into()));
        let (placeholders, values) = prep_quote(&[]);
        assert_eq!(placeholders, "");
        assert!(values.is_empty());
    }

    #[test]
    fn test_placeholders_for_a_title_batch() {
        let batch = get_placeholders(150);
        assert_eq!(batch.matches('?').count(), 150);
        assert!(!batch.ends_with(','));
        assert_eq!(get_placeholders(1), "?");
    }

    #[test]
    fn test_append_page_title_list() {
        let mut sql: SQLtuple = (
            "SELECT page_id FROM page WHERE rev_timestamp > ? AND page_title IN (".to_string(),
            vec![MyValue::Bytes("20240101000000".into())],
        );
        append_sql(&mut sql, prep_quote(&titles(&["Niere", "Lunge"])));
        sql.0 += ")";
        assert!(sql.0.ends_with("page_title IN (?,?)"));
        assert_eq!(sql.1.len(), 3);
        assert_eq!(sql.1[2], MyValue::Bytes("Lunge".into()));
    }

    #[test]
    fn test_title_to_db_key() {
        assert_eq!(title_to_db_key("Diabetes mellitus"), "Diabetes_mellitus");
        assert_eq!(title_to_db_key(" Cœur "), "Cœur");
    }
}
