//! Data model shared by the engine and its storage backends.

mod entry;
mod feed;

pub use entry::{ChipKind, EntryFields, EntryId, JournalEntry, NewEntry, ProofChip, UserId, Visibility};
pub use feed::{FeedCursor, FeedFilter, FeedQuery, Impression, Page};
