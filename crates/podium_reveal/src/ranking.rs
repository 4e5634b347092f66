//! Ranking data
//!
//! Monthly rankings are stored as `{data_dir}/{month}-ranking.json`:
//!
//! ```json
//! [{ "rank": 1, "name": "Ada", "coins": 128000 }]
//! ```
//!
//! The podium shows the top three entries; the gold entry also feeds the
//! expansion.

use crate::error::{PodiumError, Result};
use crate::expansion::{format_thousands, ExpansionData};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One row of a monthly ranking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: u32,
    pub name: String,
    pub coins: u64,
}

/// Display data of one podium card
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardGiftValue {
    pub name: String,
    /// Formatted coin count
    pub value: String,
    pub avatar: String,
}

/// The three podium cards plus the gold expansion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodiumData {
    pub gold: CardGiftValue,
    pub silver: CardGiftValue,
    pub bronze: CardGiftValue,
    pub expansion: ExpansionData,
}

struct Placeholder {
    name: &'static str,
    avatar: &'static str,
}

const PLACEHOLDERS: [Placeholder; 3] = [
    Placeholder {
        name: "Gold Winner",
        avatar: "/avatars/gold.jpg",
    },
    Placeholder {
        name: "Silver Winner",
        avatar: "/avatars/silver.jpg",
    },
    Placeholder {
        name: "Bronze Winner",
        avatar: "/avatars/bronze.jpg",
    },
];

impl PodiumData {
    /// Build the podium from ranking rows
    ///
    /// Rows are ordered by rank; missing places and blank names fall back to
    /// placeholders so every card always renders.
    pub fn from_entries(entries: &[RankingEntry]) -> Self {
        let mut top: Vec<&RankingEntry> = entries.iter().collect();
        top.sort_by_key(|entry| entry.rank);

        let card = |place: usize| -> CardGiftValue {
            let placeholder = &PLACEHOLDERS[place];
            match top.get(place) {
                Some(entry) => CardGiftValue {
                    name: non_blank(&entry.name).unwrap_or(placeholder.name).to_string(),
                    value: format_thousands(entry.coins),
                    avatar: placeholder.avatar.to_string(),
                },
                None => CardGiftValue {
                    name: placeholder.name.to_string(),
                    value: "0".to_string(),
                    avatar: placeholder.avatar.to_string(),
                },
            }
        };

        let gold = card(0);
        let expansion = ExpansionData {
            name: gold.name.clone(),
            score: top.first().map_or(0, |entry| entry.coins),
            rank: top.first().map_or(1, |entry| entry.rank),
            avatar: gold.avatar.clone(),
        };
        Self {
            gold,
            silver: card(1),
            bronze: card(2),
            expansion,
        }
    }
}

fn non_blank(name: &str) -> Option<&str> {
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

/// Path of the ranking file for `month`
pub fn ranking_path(data_dir: impl AsRef<Path>, month: &str) -> PathBuf {
    data_dir.as_ref().join(format!("{}-ranking.json", month))
}

/// Parse a ranking file
pub fn load_ranking_file(path: impl AsRef<Path>) -> Result<Vec<RankingEntry>> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| PodiumError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<RankingEntry> = serde_json::from_str(&source)?;
    tracing::debug!("Loaded {} ranking entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Load the ranking for `month` from `data_dir`
pub fn load_ranking(data_dir: impl AsRef<Path>, month: &str) -> Result<Vec<RankingEntry>> {
    load_ranking_file(ranking_path(data_dir, month))
}

/// Load the ranking for `month`, logging failures and returning no rows
pub fn load_ranking_or_empty(data_dir: impl AsRef<Path>, month: &str) -> Vec<RankingEntry> {
    load_ranking(data_dir, month).unwrap_or_else(|err| {
        tracing::error!("Error loading {} ranking data: {}", month, err);
        Vec::new()
    })
}

pub fn total_coins(entries: &[RankingEntry]) -> u64 {
    entries.iter().map(|entry| entry.coins).sum()
}

pub fn total_count(entries: &[RankingEntry]) -> usize {
    entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(rank: u32, name: &str, coins: u64) -> RankingEntry {
        RankingEntry {
            rank,
            name: name.to_string(),
            coins,
        }
    }

    #[test]
    fn test_podium_orders_by_rank() {
        let entries = vec![
            entry(3, "Carol", 900),
            entry(1, "Alice", 1_250_000),
            entry(2, "Bob", 48_000),
            entry(4, "Dan", 10),
        ];
        let podium = PodiumData::from_entries(&entries);
        assert_eq!(podium.gold.name, "Alice");
        assert_eq!(podium.gold.value, "1,250,000");
        assert_eq!(podium.silver.name, "Bob");
        assert_eq!(podium.bronze.value, "900");
        assert_eq!(podium.expansion.score, 1_250_000);
        assert_eq!(podium.expansion.rank, 1);
    }

    #[test]
    fn test_missing_places_use_placeholders() {
        let podium = PodiumData::from_entries(&[entry(1, "  ", 5)]);
        assert_eq!(podium.gold.name, "Gold Winner");
        assert_eq!(podium.gold.value, "5");
        assert_eq!(podium.silver.name, "Silver Winner");
        assert_eq!(podium.bronze.value, "0");

        let empty = PodiumData::from_entries(&[]);
        assert_eq!(empty.expansion.score, 0);
        assert_eq!(empty.expansion.avatar, "/avatars/gold.jpg");
    }

    #[test]
    fn test_load_ranking_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            ranking_path(dir.path(), "july"),
            r#"[{"rank":1,"name":"Alice","coins":300},{"rank":2,"name":"Bob","coins":200}]"#,
        )
        .unwrap();

        let entries = load_ranking(dir.path(), "july").unwrap();
        assert_eq!(total_count(&entries), 2);
        assert_eq!(total_coins(&entries), 500);
    }

    #[test]
    fn test_load_failures_yield_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_ranking_or_empty(dir.path(), "june").is_empty());

        fs::write(ranking_path(dir.path(), "june"), "{ not json").unwrap();
        assert!(matches!(
            load_ranking(dir.path(), "june"),
            Err(PodiumError::Ranking(_))
        ));
        assert!(load_ranking_or_empty(dir.path(), "june").is_empty());
    }
}
