//! Per-sheet projections of a card batch

use crate::config::SheetProfile;
use crate::sheets::CellValue;

use super::card::{NewItemCard, collapse_on};

/// Rows for one sheet plus the key of each row, same order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub rows: Vec<Vec<CellValue>>,
    pub identifiers: Vec<String>,
}

impl Projection {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Project `cards` onto `profile`, one row per distinct key (first card wins)
pub fn project(profile: &SheetProfile, cards: &[NewItemCard]) -> Projection {
    let values = profile.values();
    let unique = collapse_on(cards, profile.key_field);

    Projection {
        rows: unique
            .iter()
            .map(|card| values.iter().map(|spec| spec.resolve(card)).collect())
            .collect(),
        identifiers: unique
            .iter()
            .map(|card| card.get(profile.key_field).to_string())
            .collect(),
    }
}
