//! Journal entry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::limits::{MAX_BULLETS, MAX_BULLET_CHARS, MAX_CHIPS};

/// Unique identifier for a journal entry.
pub type EntryId = String;

/// Stable identifier for a user, as yielded by the identity provider.
pub type UserId = String;

/// Who may see an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Everyone,
    Friends,
    OnlyMe,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Everyone => "everyone",
            Visibility::Friends => "friends",
            Visibility::OnlyMe => "only_me",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "everyone" => Ok(Visibility::Everyone),
            "friends" => Ok(Visibility::Friends),
            "only_me" | "only-me" => Ok(Visibility::OnlyMe),
            other => Err(ValidationError::InvalidValue {
                field: "visibility".into(),
                message: format!("unknown visibility '{other}'"),
            }),
        }
    }
}

/// Kind of evidence a proof chip carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipKind {
    Steps,
    Minutes,
    Pages,
    Reps,
    Distance,
    Custom,
}

impl ChipKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChipKind::Steps => "steps",
            ChipKind::Minutes => "minutes",
            ChipKind::Pages => "pages",
            ChipKind::Reps => "reps",
            ChipKind::Distance => "distance",
            ChipKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "steps" => ChipKind::Steps,
            "minutes" => ChipKind::Minutes,
            "pages" => ChipKind::Pages,
            "reps" => ChipKind::Reps,
            "distance" => ChipKind::Distance,
            _ => ChipKind::Custom,
        }
    }
}

/// A typed key/value "proof" attached to an entry, e.g. `steps: 10432`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofChip {
    pub kind: ChipKind,
    pub label: String,
    pub value: String,
}

impl ProofChip {
    pub fn new(kind: ChipKind, label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            value: value.into(),
        }
    }
}

/// The mutable payload of an entry save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFields {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub reflection: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub chips: Vec<ProofChip>,
    #[serde(default)]
    pub visibility: Visibility,
}

impl EntryFields {
    /// Trim text, drop blank bullets and check list bounds.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] if bullets or chips exceed their limits.
    pub fn normalized(mut self) -> Result<Self, ValidationError> {
        self.title = trim_opt(self.title);
        self.reflection = trim_opt(self.reflection);
        self.goal = trim_opt(self.goal);
        self.bullets = self
            .bullets
            .into_iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();

        if self.bullets.len() > MAX_BULLETS {
            return Err(ValidationError::TooMany {
                collection: "bullets",
                len: self.bullets.len(),
                max: MAX_BULLETS,
            });
        }
        if let Some(long) = self.bullets.iter().find(|b| b.chars().count() > MAX_BULLET_CHARS) {
            return Err(ValidationError::InvalidValue {
                field: "bullets".into(),
                message: format!(
                    "bullet of {} chars exceeds {MAX_BULLET_CHARS}",
                    long.chars().count()
                ),
            });
        }
        if self.chips.len() > MAX_CHIPS {
            return Err(ValidationError::TooMany {
                collection: "chips",
                len: self.chips.len(),
                max: MAX_CHIPS,
            });
        }
        if self.chips.iter().any(|c| c.value.trim().is_empty()) {
            return Err(ValidationError::InvalidValue {
                field: "chips".into(),
                message: "chip value must not be empty".into(),
            });
        }
        Ok(self)
    }

    /// True when `self` and `other` match in every field except visibility.
    pub fn same_content(&self, other: &EntryFields) -> bool {
        self.title == other.title
            && self.reflection == other.reflection
            && self.goal == other.goal
            && self.bullets == other.bullets
            && self.chips == other.chips
    }
}

fn trim_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// One viewer's entry for one local day.
///
/// `kudos_count`, `has_kudos` and `has_saved` are hydrated relative to the
/// viewer that issued the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub local_date: String,
    /// Server-assigned creation instant; the edit window is measured from here.
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub reflection: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub chips: Vec<ProofChip>,
    pub visibility: Visibility,
    #[serde(default)]
    pub kudos_count: u32,
    #[serde(default)]
    pub has_kudos: bool,
    #[serde(default)]
    pub has_saved: bool,
}

impl JournalEntry {
    /// Current mutable payload.
    pub fn fields(&self) -> EntryFields {
        EntryFields {
            title: self.title.clone(),
            reflection: self.reflection.clone(),
            goal: self.goal.clone(),
            bullets: self.bullets.clone(),
            chips: self.chips.clone(),
            visibility: self.visibility,
        }
    }

    /// Replace the mutable payload in place.
    pub fn apply_fields(&mut self, fields: EntryFields) {
        self.title = fields.title;
        self.reflection = fields.reflection;
        self.goal = fields.goal;
        self.bullets = fields.bullets;
        self.chips = fields.chips;
        self.visibility = fields.visibility;
    }
}

/// Insert payload for the first post of a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub user_id: UserId,
    pub local_date: String,
    pub fields: EntryFields,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_trims_and_drops_blank_bullets() {
        let fields = EntryFields {
            title: Some("  Morning run ".into()),
            reflection: Some("   ".into()),
            bullets: vec![" 5k ".into(), "".into(), "  ".into(), "stretch".into()],
            ..Default::default()
        }
        .normalized()
        .unwrap();

        assert_eq!(fields.title.as_deref(), Some("Morning run"));
        assert_eq!(fields.reflection, None);
        assert_eq!(fields.bullets, vec!["5k", "stretch"]);
    }

    #[test]
    fn too_many_bullets_rejected() {
        let fields = EntryFields {
            bullets: (0..6).map(|i| format!("b{i}")).collect(),
            ..Default::default()
        };
        assert_eq!(
            fields.normalized().unwrap_err(),
            ValidationError::TooMany { collection: "bullets", len: 6, max: 5 }
        );
    }

    #[test]
    fn too_many_chips_rejected() {
        let fields = EntryFields {
            chips: (0..5).map(|i| ProofChip::new(ChipKind::Reps, "reps", i.to_string())).collect(),
            ..Default::default()
        };
        assert!(matches!(
            fields.normalized(),
            Err(ValidationError::TooMany { collection: "chips", .. })
        ));
    }

    #[test]
    fn same_content_ignores_visibility() {
        let a = EntryFields {
            title: Some("t".into()),
            visibility: Visibility::Everyone,
            ..Default::default()
        };
        let mut b = a.clone();
        b.visibility = Visibility::OnlyMe;
        assert!(a.same_content(&b));
        b.goal = Some("read".into());
        assert!(!a.same_content(&b));
    }

    #[test]
    fn visibility_parses_both_spellings() {
        assert_eq!("only_me".parse::<Visibility>().unwrap(), Visibility::OnlyMe);
        assert_eq!("only-me".parse::<Visibility>().unwrap(), Visibility::OnlyMe);
        assert!("public".parse::<Visibility>().is_err());
    }
}
