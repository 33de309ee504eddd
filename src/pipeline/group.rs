//! Grouping: partition a [`Dataset`] into per-key groups.
//!
//! Rows are bucketed by the trimmed display value of the serial column.
//! Rows whose key is empty, whitespace-only, or the literal `"undefined"`
//! are skipped and counted. Groups are then ordered dataset-wide: numeric
//! ascending when every key is an integer, case-insensitive text otherwise.

use crate::dataset::{CellValue, Dataset, RowRecord};
use crate::error::SplitError;
use crate::output::KeyRange;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Ordered rows sharing one serial key.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: String,
    pub rows: Vec<RowRecord>,
}

impl Group {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// How the groups of a dataset were ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOrdering {
    /// Every key parsed as an integer; ascending numeric order.
    Numeric,
    /// Case-insensitive ascending text order.
    Lexicographic,
}

/// Output of [`group_rows`].
#[derive(Debug, Clone)]
pub struct Grouping {
    pub groups: Vec<Group>,
    pub skipped: usize,
    pub ordering: GroupOrdering,
}

impl Grouping {
    /// Rows placed into some group.
    pub fn grouped_rows(&self) -> usize {
        self.groups.iter().map(Group::row_count).sum()
    }
}

/// Normalise a serial-column value into a group key.
///
/// Returns `None` for values that do not identify a group.
pub fn group_key(value: Option<&CellValue>) -> Option<String> {
    let raw = value.map(CellValue::to_display).unwrap_or_default();
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "undefined" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Partition the dataset by `serial_column` and order the groups.
///
/// # Errors
/// [`SplitError::MissingColumn`] when no row carries a usable key.
pub fn group_rows(dataset: &Dataset, serial_column: &str) -> Result<Grouping, SplitError> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;

    for row in dataset.rows() {
        let Some(key) = group_key(row.get(serial_column)) else {
            skipped += 1;
            let first_columns: Vec<&str> = row.columns().take(3).collect();
            debug!(
                "Skipping row without '{}' (columns: {:?})",
                serial_column, first_columns
            );
            continue;
        };

        match index.get(&key) {
            Some(&i) => groups[i].rows.push(row.clone()),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    rows: vec![row.clone()],
                });
            }
        }
    }

    if groups.is_empty() {
        return Err(SplitError::MissingColumn {
            column: serial_column.to_string(),
        });
    }

    let ordering = sort_groups(&mut groups);
    debug!(
        "Grouped {} rows into {} groups ({:?}), {} skipped",
        dataset.len() - skipped,
        groups.len(),
        ordering,
        skipped
    );

    Ok(Grouping {
        groups,
        skipped,
        ordering,
    })
}

/// Sort groups in place and report which ordering applied.
pub fn sort_groups(groups: &mut [Group]) -> GroupOrdering {
    let all_numeric = groups.iter().all(|g| parse_key(&g.key).is_some());
    if all_numeric {
        groups.sort_by_key(|g| parse_key(&g.key).unwrap_or_default());
        GroupOrdering::Numeric
    } else {
        groups.sort_by(|a, b| compare_text_keys(&a.key, &b.key));
        GroupOrdering::Lexicographic
    }
}

/// Case-insensitive comparison; keys equal ignoring case put lowercase first.
pub fn compare_text_keys(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

/// Min and max over the keys that are integers; `None` when none are.
pub fn key_range<'a>(keys: impl IntoIterator<Item = &'a str>) -> Option<KeyRange> {
    keys.into_iter()
        .filter_map(parse_key)
        .fold(None, |acc: Option<KeyRange>, n| match acc {
            None => Some(KeyRange { min: n, max: n }),
            Some(r) => Some(KeyRange {
                min: r.min.min(n),
                max: r.max.max(n),
            }),
        })
}

fn parse_key(key: &str) -> Option<i64> {
    key.trim().parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(rows: &[(CellValue, &str)]) -> Dataset {
        let headers = vec!["Del.Challan".to_string(), "Item".to_string()];
        let records = rows
            .iter()
            .map(|(k, item)| {
                RowRecord::from_pairs([
                    ("Del.Challan", k.clone()),
                    ("Item", CellValue::Text(item.to_string())),
                ])
            })
            .collect();
        Dataset::new(headers, records)
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn keys(g: &Grouping) -> Vec<&str> {
        g.groups.iter().map(|g| g.key.as_str()).collect()
    }

    #[test]
    fn every_valid_row_lands_in_exactly_one_group() {
        let ds = dataset(&[
            (text("A"), "1"),
            (text("B"), "2"),
            (CellValue::Null, "3"),
            (text("A"), "4"),
            (text("   "), "5"),
        ]);
        let g = group_rows(&ds, "Del.Challan").unwrap();
        assert_eq!(g.grouped_rows() + g.skipped, ds.len());
        assert_eq!(g.skipped, 2);
        assert_eq!(g.groups.len(), 2);
    }

    #[test]
    fn invalid_keys_are_skipped() {
        assert_eq!(group_key(None), None);
        assert_eq!(group_key(Some(&CellValue::Null)), None);
        assert_eq!(group_key(Some(&text(""))), None);
        assert_eq!(group_key(Some(&text(" \t "))), None);
        assert_eq!(group_key(Some(&text("undefined"))), None);
        assert_eq!(group_key(Some(&text("  undefined "))), None);
        assert_eq!(group_key(Some(&text(" 42 "))), Some("42".to_string()));
        assert_eq!(group_key(Some(&CellValue::Number(101.0))), Some("101".to_string()));
    }

    #[test]
    fn trimmed_keys_share_a_group() {
        let ds = dataset(&[(text("A"), "1"), (text(" A "), "2")]);
        let g = group_rows(&ds, "Del.Challan").unwrap();
        assert_eq!(g.groups.len(), 1);
        assert_eq!(g.groups[0].row_count(), 2);
    }

    #[test]
    fn rows_keep_their_original_order_within_a_group() {
        let ds = dataset(&[
            (text("X"), "first"),
            (text("Y"), "other"),
            (text("X"), "second"),
            (text("X"), "third"),
        ]);
        let g = group_rows(&ds, "Del.Challan").unwrap();
        let x = g.groups.iter().find(|g| g.key == "X").unwrap();
        let items: Vec<String> = x.rows.iter().map(|r| r.display("Item")).collect();
        assert_eq!(items, vec!["first", "second", "third"]);
    }

    #[test]
    fn integer_keys_sort_numerically() {
        let ds = dataset(&[
            (CellValue::Number(10.0), "a"),
            (text("9"), "b"),
            (CellValue::Number(100.0), "c"),
            (text("-3"), "d"),
        ]);
        let g = group_rows(&ds, "Del.Challan").unwrap();
        assert_eq!(g.ordering, GroupOrdering::Numeric);
        assert_eq!(keys(&g), vec!["-3", "9", "10", "100"]);
    }

    #[test]
    fn one_non_integer_key_switches_to_text_order() {
        let ds = dataset(&[
            (text("10"), "a"),
            (text("9"), "b"),
            (text("A7"), "c"),
        ]);
        let g = group_rows(&ds, "Del.Challan").unwrap();
        assert_eq!(g.ordering, GroupOrdering::Lexicographic);
        assert_eq!(keys(&g), vec!["10", "9", "A7"]);
    }

    #[test]
    fn text_order_ignores_case() {
        let ds = dataset(&[(text("b"), "1"), (text("a"), "2"), (text("A"), "3"), (text("C"), "4")]);
        let g = group_rows(&ds, "Del.Challan").unwrap();
        assert_eq!(keys(&g), vec!["a", "A", "b", "C"]);
    }

    #[test]
    fn case_variants_put_lowercase_first() {
        assert_eq!(compare_text_keys("a", "A"), Ordering::Less);
        assert_eq!(compare_text_keys("aB", "Ab"), Ordering::Less);
        assert_eq!(compare_text_keys("B", "a"), Ordering::Greater);
        assert_eq!(compare_text_keys("x", "x"), Ordering::Equal);
    }

    #[test]
    fn fractional_keys_are_not_integers() {
        let ds = dataset(&[(CellValue::Number(2.5), "1"), (CellValue::Number(1.0), "2")]);
        let g = group_rows(&ds, "Del.Challan").unwrap();
        assert_eq!(g.ordering, GroupOrdering::Lexicographic);
        assert_eq!(keys(&g), vec!["1", "2.5"]);
    }

    #[test]
    fn ordering_is_deterministic() {
        let ds = dataset(&[(text("k2"), "1"), (text("K1"), "2"), (text("k1"), "3")]);
        let a = group_rows(&ds, "Del.Challan").unwrap();
        let b = group_rows(&ds, "Del.Challan").unwrap();
        assert_eq!(a.groups, b.groups);
    }

    #[test]
    fn missing_column_is_fatal() {
        let ds = dataset(&[(text("A"), "1")]);
        match group_rows(&ds, "Serial") {
            Err(SplitError::MissingColumn { column }) => assert_eq!(column, "Serial"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn all_rows_invalid_is_fatal() {
        let ds = dataset(&[(CellValue::Null, "1"), (text("undefined"), "2")]);
        assert!(matches!(
            group_rows(&ds, "Del.Challan"),
            Err(SplitError::MissingColumn { .. })
        ));
    }

    #[test]
    fn key_range_covers_integer_keys_only() {
        assert_eq!(
            key_range(["12", "abc", "3", " 40 "]),
            Some(KeyRange { min: 3, max: 40 })
        );
        assert_eq!(key_range(["x", "y"]), None);
        assert_eq!(key_range(Vec::<&str>::new()), None);
    }
}
