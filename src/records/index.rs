use std::{
    collections::{BTreeMap, BTreeSet},
    sync::LazyLock,
};

use regex::Regex;

use super::filter::cell_text;
use crate::domain::{Record, record_key};

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("token pattern is valid"));

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    TOKEN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
}

/// Token index over a fetched record set for incremental search.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    postings: BTreeMap<String, BTreeSet<usize>>,
    keys: Vec<Option<String>>,
}

impl SearchIndex {
    pub fn build(records: &[Record], columns: &[String], id_field: &str) -> Self {
        let mut postings: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
        for (row, record) in records.iter().enumerate() {
            let cells: Vec<String> = if columns.is_empty() {
                record.values().filter_map(cell_text).collect()
            } else {
                columns
                    .iter()
                    .filter_map(|column| record.get(column).and_then(cell_text))
                    .collect()
            };
            for cell in &cells {
                for token in tokens(cell) {
                    postings.entry(token).or_default().insert(row);
                }
            }
        }
        Self {
            postings,
            keys: records
                .iter()
                .map(|record| record_key(record, id_field))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Row positions where every query token prefixes some indexed token.
    pub fn search_rows(&self, query: &str) -> Vec<usize> {
        let mut result: Option<BTreeSet<usize>> = None;
        for token in tokens(query) {
            let matched: BTreeSet<usize> = self
                .postings
                .range(token.clone()..)
                .take_while(|(indexed, _)| indexed.starts_with(&token))
                .flat_map(|(_, rows)| rows.iter().copied())
                .collect();
            result = Some(match result {
                Some(previous) => previous.intersection(&matched).copied().collect(),
                None => matched,
            });
        }
        match result {
            Some(rows) => rows.into_iter().collect(),
            None => (0..self.keys.len()).collect(),
        }
    }

    /// Row keys of the matches, in record order. Rows without an id are skipped.
    pub fn search(&self, query: &str) -> Vec<String> {
        self.search_rows(query)
            .into_iter()
            .filter_map(|row| self.keys.get(row).cloned().flatten())
            .collect()
    }
}
