//! The subject of a reveal: which card, which way up, where in the spread,
//! and what was asked.
//!
//! A [`Subject`] is owned by the caller. Its [`identity_key`](Subject::identity_key)
//! is what decides whether two submissions describe the same logical job.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::CoreError;

/// Highest accepted rank value. Keep in sync with the `range` rule on
/// [`Card::rank_value`]; some decks number The Fool 22.
pub const MAX_RANK_VALUE: u32 = 22;

/// Card orientation as drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Upright,
    Reversed,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Upright => "upright",
            Orientation::Reversed => "reversed",
        }
    }

    pub fn is_reversed(&self) -> bool {
        matches!(self, Orientation::Reversed)
    }
}

/// Identity and description of a single tarot card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Card {
    /// Display name, e.g. `"The Tower"` or `"Three of Cups"`.
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub name: String,
    /// Card number within its arcana, if the deck numbers it.
    pub number: Option<u32>,
    /// Minor arcana suit; `None` for the major arcana.
    pub suit: Option<String>,
    /// Rank label, e.g. `"Queen"`.
    pub rank: Option<String>,
    #[validate(range(max = 22))]
    pub rank_value: Option<u32>,
    /// Short interpretive text passed to the generator as visual guidance.
    #[validate(length(max = 2000))]
    pub meaning: Option<String>,
}

impl Card {
    /// A card with only a name; every optional attribute left empty.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number: None,
            suit: None,
            rank: None,
            rank_value: None,
            meaning: None,
        }
    }
}

/// One logical unit of generation work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Subject {
    #[validate(nested)]
    pub card: Card,
    pub orientation: Orientation,
    /// Spread position label, e.g. `"past"` or `"outcome"`.
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub position: String,
    #[validate(length(min = 1, max = 1000), custom(function = "not_blank"))]
    pub question: String,
}

impl Subject {
    pub fn new(
        card: Card,
        orientation: Orientation,
        position: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            card,
            orientation,
            position: position.into(),
            question: question.into(),
        }
    }

    /// Opaque key identifying the logical job this subject describes.
    ///
    /// Whitespace around each component is ignored so that re-typing the
    /// same question does not count as a new subject.
    pub fn identity_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.card.name.trim(),
            self.orientation.as_str(),
            self.position.trim(),
            self.question.trim(),
        )
    }

    /// Check every required field, mapping failures to [`CoreError::Validation`].
    pub fn ensure_valid(&self) -> Result<(), CoreError> {
        self.validate()?;
        Ok(())
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
