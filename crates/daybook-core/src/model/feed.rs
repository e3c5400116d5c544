//! Feed query and page types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{EntryId, JournalEntry, UserId};
use crate::error::ValidationError;

/// Retrieval strategy for the feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedFilter {
    #[default]
    Discover,
    SimilarGoals,
    Friends,
    Nearby,
    Saved,
    All,
}

impl FeedFilter {
    pub const ALL_FILTERS: [FeedFilter; 6] = [
        FeedFilter::Discover,
        FeedFilter::SimilarGoals,
        FeedFilter::Friends,
        FeedFilter::Nearby,
        FeedFilter::Saved,
        FeedFilter::All,
    ];

    /// Ranked filters keep the store's ordering; the rest are newest-first.
    pub fn is_ranked(self) -> bool {
        matches!(self, FeedFilter::Discover)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedFilter::Discover => "discover",
            FeedFilter::SimilarGoals => "similar_goals",
            FeedFilter::Friends => "friends",
            FeedFilter::Nearby => "nearby",
            FeedFilter::Saved => "saved",
            FeedFilter::All => "all",
        }
    }
}

impl std::str::FromStr for FeedFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeedFilter::ALL_FILTERS
            .into_iter()
            .find(|f| f.as_str() == s || f.as_str().replace('_', "-") == s)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "filter".into(),
                message: format!("unknown feed filter '{s}'"),
            })
    }
}

/// Opaque position marker: the `created_at` of the last entry returned.
pub type FeedCursor = DateTime<Utc>;

/// Parameters of one page retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedQuery {
    pub viewer_id: UserId,
    pub filter: FeedFilter,
    pub local_date: String,
    pub page_size: usize,
    pub cursor: Option<FeedCursor>,
}

/// One page of feed results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub entries: Vec<JournalEntry>,
    /// Whether another page may exist (`entries.len() == page_size`).
    pub has_more: bool,
}

impl Page {
    pub fn new(entries: Vec<JournalEntry>, page_size: usize) -> Self {
        let has_more = page_size > 0 && entries.len() == page_size;
        Self { entries, has_more }
    }

    /// Cursor for the page that follows this one.
    pub fn next_cursor(&self) -> Option<FeedCursor> {
        self.entries.last().map(|e| e.created_at)
    }
}

/// "Viewer saw entry X on local date D."
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Impression {
    pub viewer_id: UserId,
    pub entry_id: EntryId,
    pub author_id: UserId,
    pub local_date: String,
}
