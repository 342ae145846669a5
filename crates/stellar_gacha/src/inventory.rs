//! # Inventory
//!
//! Owned items per player and the rank rules derived from copy counts.
//!
//! A player holds at most one entry per item. Duplicates raise the entry's
//! copy count until the category cap; past the cap the inventory is left
//! alone and the engine converts the duplicate into currency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::{ItemCategory, ItemId};

/// How copies map to a displayed rank for one category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRule {
    /// Rank of a freshly acquired item.
    pub base: u32,
    /// Highest reachable rank.
    pub max: u32,
}

impl RankRule {
    /// Rank for a copy count: `base + copies - 1`, clamped to `base..=max`.
    #[inline]
    #[must_use]
    pub fn rank(self, copies: u32) -> u32 {
        self.base
            .saturating_add(copies.saturating_sub(1))
            .min(self.max)
            .max(self.base)
    }

    /// Whether another copy would exceed the cap.
    #[inline]
    #[must_use]
    pub fn is_capped(self, copies: u32) -> bool {
        self.rank(copies) >= self.max
    }

    /// Copy count at which the cap is reached.
    #[must_use]
    pub fn max_copies(self) -> u32 {
        self.max.saturating_sub(self.base).saturating_add(1)
    }
}

/// Rank rules for both item categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankRules {
    /// Eidolon rule (E0 to E6 by default).
    pub character: RankRule,
    /// Superimposition rule (S1 to S5 by default).
    pub light_cone: RankRule,
}

impl RankRules {
    /// Rule for the given category.
    #[must_use]
    pub const fn for_category(&self, category: ItemCategory) -> RankRule {
        match category {
            ItemCategory::Character => self.character,
            ItemCategory::LightCone => self.light_cone,
        }
    }
}

impl Default for RankRules {
    fn default() -> Self {
        Self {
            character: RankRule { base: 0, max: 6 },
            light_cone: RankRule { base: 1, max: 5 },
        }
    }
}

/// One owned item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// Item category, copied from the catalog at acquisition.
    pub category: ItemCategory,
    /// Number of copies held. Never decreases.
    pub copies: u32,
    /// When the first copy was obtained.
    pub obtained_at: DateTime<Utc>,
}

/// Result of adding one copy to an inventory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquisition {
    /// First copy of the item.
    New,
    /// Copy count went up; carries the new rank.
    RankUp {
        /// Rank after the duplicate.
        rank: u32,
    },
    /// Already at cap; nothing changed.
    AtCap,
}

/// A player's owned items, keyed by item id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inventory {
    entries: BTreeMap<ItemId, InventoryEntry>,
}

impl Inventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, item_id: &str) -> Option<&InventoryEntry> {
        self.entries.get(item_id)
    }

    /// Copies held of an item, zero when not owned.
    #[must_use]
    pub fn copies(&self, item_id: &str) -> u32 {
        self.entries.get(item_id).map_or(0, |e| e.copies)
    }

    /// Number of distinct items owned.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is owned.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by item id.
    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &InventoryEntry)> {
        self.entries.iter()
    }

    /// Adds one copy of an item, respecting the category cap.
    pub fn acquire(
        &mut self,
        item_id: &str,
        category: ItemCategory,
        rule: RankRule,
        now: DateTime<Utc>,
    ) -> Acquisition {
        match self.entries.get_mut(item_id) {
            None => {
                self.entries.insert(
                    item_id.to_string(),
                    InventoryEntry {
                        category,
                        copies: 1,
                        obtained_at: now,
                    },
                );
                Acquisition::New
            }
            Some(entry) if rule.is_capped(entry.copies) => Acquisition::AtCap,
            Some(entry) => {
                entry.copies += 1;
                Acquisition::RankUp {
                    rank: rule.rank(entry.copies),
                }
            }
        }
    }

    /// Installs an entry as-is. Used when replaying stored changes.
    pub(crate) fn put(&mut self, item_id: ItemId, entry: InventoryEntry) {
        self.entries.insert(item_id, entry);
    }
}
