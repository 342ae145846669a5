//! # Player State Store
//!
//! The persistence boundary of the engine.
//!
//! Every mutation reaches a store as one [`ChangeSet`]: a list of
//! [`StateChange`]s for a single player that must apply completely or not at
//! all. Both stores here stage the set on a copy of the player's row and only
//! install it once every change has been accepted.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::{CurrencyKind, ItemId, Rarity};
use crate::error::{GachaError, GachaResult};
use crate::inventory::{Inventory, InventoryEntry};
use crate::player::{DrawHistoryRecord, PityState, PlayerRecord, Wallet};

/// One mutation of a player's persistent state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateChange {
    /// Creates the player row. Must be the first change for a new player.
    Register {
        /// Display name.
        name: String,
        /// Opening balances.
        wallet: Wallet,
        /// Opening pity state.
        pity: PityState,
    },
    /// Signed balance adjustment. Rejected if it would go negative.
    AdjustCurrency {
        /// Currency to adjust.
        kind: CurrencyKind,
        /// Signed amount.
        delta: i64,
    },
    /// Writes the final state of one inventory entry.
    PutItem {
        /// Item id.
        item_id: ItemId,
        /// New entry. Copies may not go down.
        entry: InventoryEntry,
    },
    /// Replaces pity counters and active banner.
    SetPity(PityState),
    /// Appends one history row.
    AppendHistory(DrawHistoryRecord),
    /// Records when the daily reward was last claimed.
    SetDailyClaim(DateTime<Utc>),
}

/// Atomic unit of persistence for one player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeSet {
    /// Player the changes belong to.
    pub player_id: String,
    /// Ordered changes.
    pub changes: Vec<StateChange>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            changes: Vec::new(),
        }
    }

    /// Appends a change.
    pub fn push(&mut self, change: StateChange) {
        self.changes.push(change);
    }

    /// Number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Per-player draw totals used by stats queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerSummary {
    /// Player identifier.
    pub player_id: String,
    /// Display name.
    pub name: String,
    /// Committed draws.
    pub total_draws: u64,
    /// 5★ draws.
    pub five_star: u64,
    /// 4★ draws.
    pub four_star: u64,
}

/// Storage backend for player state.
///
/// Implementations must make [`PlayerStore::commit`] atomic: after an error
/// the stored state is exactly what it was before the call.
pub trait PlayerStore: Send + Sync {
    /// Loads a player's row, or `None` if unregistered.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn load(&self, player_id: &str) -> GachaResult<Option<PlayerRecord>>;

    /// Applies a change set atomically.
    ///
    /// # Errors
    ///
    /// Validation errors from the changes themselves, or
    /// `StoreCommitFailed` when the backend cannot persist them.
    fn commit(&self, changes: ChangeSet) -> GachaResult<()>;

    /// Newest-first history rows, at most `limit`.
    ///
    /// # Errors
    ///
    /// `NotRegistered` for unknown players, or backend failures.
    fn history(&self, player_id: &str, limit: usize) -> GachaResult<Vec<DrawHistoryRecord>>;

    /// Draw totals for every registered player.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn summaries(&self) -> GachaResult<Vec<PlayerSummary>>;
}

impl<S: PlayerStore + ?Sized> PlayerStore for Arc<S> {
    fn load(&self, player_id: &str) -> GachaResult<Option<PlayerRecord>> {
        (**self).load(player_id)
    }

    fn commit(&self, changes: ChangeSet) -> GachaResult<()> {
        (**self).commit(changes)
    }

    fn history(&self, player_id: &str, limit: usize) -> GachaResult<Vec<DrawHistoryRecord>> {
        (**self).history(player_id, limit)
    }

    fn summaries(&self) -> GachaResult<Vec<PlayerSummary>> {
        (**self).summaries()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PlayerEntry {
    record: PlayerRecord,
    history: Vec<DrawHistoryRecord>,
}

/// A change set that passed validation, ready to install.
#[derive(Debug)]
pub(crate) struct Staged {
    record: PlayerRecord,
    appended: Vec<DrawHistoryRecord>,
}

/// In-memory state shared by both store implementations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreState {
    players: BTreeMap<String, PlayerEntry>,
}

impl StoreState {
    /// Number of registered players.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Validates a change set against a copy of the player's row.
    pub(crate) fn stage(&self, set: &ChangeSet) -> GachaResult<Staged> {
        let mut record = self.players.get(&set.player_id).map(|e| e.record.clone());
        let mut appended = Vec::new();

        for change in &set.changes {
            if let StateChange::Register { name, wallet, pity } = change {
                if record.is_some() {
                    return Err(GachaError::AlreadyRegistered(set.player_id.clone()));
                }
                record = Some(PlayerRecord {
                    player_id: set.player_id.clone(),
                    name: name.clone(),
                    wallet: *wallet,
                    pity: pity.clone(),
                    inventory: Inventory::new(),
                    total_draws: 0,
                    last_daily_at: None,
                });
                continue;
            }

            let rec = record
                .as_mut()
                .ok_or_else(|| GachaError::NotRegistered(set.player_id.clone()))?;
            match change {
                StateChange::AdjustCurrency { kind, delta } => rec.wallet.apply_delta(*kind, *delta)?,
                StateChange::PutItem { item_id, entry } => {
                    let held = rec.inventory.copies(item_id);
                    if entry.copies < held {
                        return Err(GachaError::InvalidChangeSet(format!(
                            "copies of {item_id} would drop from {held} to {}",
                            entry.copies
                        )));
                    }
                    rec.inventory.put(item_id.clone(), entry.clone());
                }
                StateChange::SetPity(pity) => rec.pity = pity.clone(),
                StateChange::SetDailyClaim(at) => rec.last_daily_at = Some(*at),
                StateChange::AppendHistory(row) => {
                    rec.total_draws += 1;
                    appended.push(row.clone());
                }
                StateChange::Register { .. } => {}
            }
        }

        let record = record.ok_or_else(|| GachaError::NotRegistered(set.player_id.clone()))?;
        Ok(Staged { record, appended })
    }

    /// Installs a staged change set.
    pub(crate) fn install(&mut self, staged: Staged) {
        let Staged { record, appended } = staged;
        match self.players.get_mut(&record.player_id) {
            Some(entry) => {
                entry.record = record;
                entry.history.extend(appended);
            }
            None => {
                self.players.insert(
                    record.player_id.clone(),
                    PlayerEntry {
                        record,
                        history: appended,
                    },
                );
            }
        }
    }

    /// Stages and installs in one step.
    pub(crate) fn apply(&mut self, set: &ChangeSet) -> GachaResult<()> {
        let staged = self.stage(set)?;
        self.install(staged);
        Ok(())
    }

    pub(crate) fn load(&self, player_id: &str) -> Option<PlayerRecord> {
        self.players.get(player_id).map(|e| e.record.clone())
    }

    pub(crate) fn history(&self, player_id: &str, limit: usize) -> GachaResult<Vec<DrawHistoryRecord>> {
        let entry = self
            .players
            .get(player_id)
            .ok_or_else(|| GachaError::NotRegistered(player_id.to_string()))?;
        Ok(entry.history.iter().rev().take(limit).cloned().collect())
    }

    pub(crate) fn summaries(&self) -> Vec<PlayerSummary> {
        self.players
            .values()
            .map(|entry| {
                let count = |rarity: Rarity| {
                    entry.history.iter().filter(|row| row.rarity == rarity).count() as u64
                };
                PlayerSummary {
                    player_id: entry.record.player_id.clone(),
                    name: entry.record.name.clone(),
                    total_draws: entry.record.total_draws,
                    five_star: count(Rarity::Five),
                    four_star: count(Rarity::Four),
                }
            })
            .collect()
    }

    /// Change sets that rebuild this state from nothing, one per player.
    pub(crate) fn rebuild_sets(&self) -> Vec<ChangeSet> {
        self.players
            .values()
            .map(|entry| {
                let rec = &entry.record;
                let mut set = ChangeSet::new(rec.player_id.clone());
                set.push(StateChange::Register {
                    name: rec.name.clone(),
                    wallet: rec.wallet,
                    pity: rec.pity.clone(),
                });
                for (item_id, item) in rec.inventory.iter() {
                    set.push(StateChange::PutItem {
                        item_id: item_id.clone(),
                        entry: item.clone(),
                    });
                }
                for row in &entry.history {
                    set.push(StateChange::AppendHistory(row.clone()));
                }
                if let Some(at) = rec.last_daily_at {
                    set.push(StateChange::SetDailyClaim(at));
                }
                set
            })
            .collect()
    }
}

/// Volatile store behind a single `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the whole state, for comparisons.
    #[must_use]
    pub fn snapshot(&self) -> StoreState {
        self.state.read().clone()
    }
}

impl PlayerStore for MemoryStore {
    fn load(&self, player_id: &str) -> GachaResult<Option<PlayerRecord>> {
        Ok(self.state.read().load(player_id))
    }

    fn commit(&self, changes: ChangeSet) -> GachaResult<()> {
        self.state.write().apply(&changes)
    }

    fn history(&self, player_id: &str, limit: usize) -> GachaResult<Vec<DrawHistoryRecord>> {
        self.state.read().history(player_id, limit)
    }

    fn summaries(&self) -> GachaResult<Vec<PlayerSummary>> {
        Ok(self.state.read().summaries())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ItemCategory;
    use chrono::Utc;

    fn register(id: &str) -> ChangeSet {
        let mut set = ChangeSet::new(id);
        set.push(StateChange::Register {
            name: id.to_uppercase(),
            wallet: Wallet::new(10, 0, 1000),
            pity: PityState::new("stellar_warp", true),
        });
        set
    }

    fn row(player: &str, rarity: Rarity) -> DrawHistoryRecord {
        DrawHistoryRecord {
            player_id: player.into(),
            banner_id: "stellar_warp".into(),
            rarity,
            item_id: "arrows".into(),
            category: ItemCategory::LightCone,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_register_and_load() {
        let store = MemoryStore::new();
        store.commit(register("kafka")).unwrap();
        let rec = store.load("kafka").unwrap().unwrap();
        assert_eq!(rec.wallet, Wallet::new(10, 0, 1000));
        assert_eq!(rec.total_draws, 0);
        assert!(store.load("ghost").unwrap().is_none());

        let err = store.commit(register("kafka")).unwrap_err();
        assert_eq!(err, GachaError::AlreadyRegistered("kafka".into()));
    }

    #[test]
    fn test_rejected_set_leaves_state_untouched() {
        let store = MemoryStore::new();
        store.commit(register("kafka")).unwrap();
        let before = store.snapshot();

        let mut set = ChangeSet::new("kafka");
        set.push(StateChange::AppendHistory(row("kafka", Rarity::Three)));
        set.push(StateChange::AdjustCurrency {
            kind: CurrencyKind::Standard,
            delta: -11,
        });
        assert!(matches!(
            store.commit(set),
            Err(GachaError::InsufficientCurrency { .. })
        ));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_unregistered_player_is_rejected() {
        let store = MemoryStore::new();
        let mut set = ChangeSet::new("ghost");
        set.push(StateChange::AdjustCurrency {
            kind: CurrencyKind::Credits,
            delta: 5,
        });
        assert_eq!(store.commit(set), Err(GachaError::NotRegistered("ghost".into())));
        assert_eq!(store.snapshot().player_count(), 0);
    }

    #[test]
    fn test_copies_never_decrease() {
        let store = MemoryStore::new();
        let entry = |copies| InventoryEntry {
            category: ItemCategory::LightCone,
            copies,
            obtained_at: Utc::now(),
        };
        let mut set = register("kafka");
        set.push(StateChange::PutItem { item_id: "arrows".into(), entry: entry(3) });
        store.commit(set).unwrap();

        let mut set = ChangeSet::new("kafka");
        set.push(StateChange::PutItem { item_id: "arrows".into(), entry: entry(2) });
        let err = store.commit(set).unwrap_err();
        assert!(matches!(err, GachaError::InvalidChangeSet(ref msg) if msg.contains("arrows")));
        assert!(!err.is_retryable());
        assert_eq!(store.load("kafka").unwrap().unwrap().inventory.copies("arrows"), 3);
    }

    #[test]
    fn test_daily_claim_is_recorded() {
        let store = MemoryStore::new();
        store.commit(register("kafka")).unwrap();
        assert_eq!(store.load("kafka").unwrap().unwrap().last_daily_at, None);

        let at = Utc::now();
        let mut set = ChangeSet::new("kafka");
        set.push(StateChange::AdjustCurrency { kind: CurrencyKind::Standard, delta: 2 });
        set.push(StateChange::SetDailyClaim(at));
        store.commit(set).unwrap();

        let rec = store.load("kafka").unwrap().unwrap();
        assert_eq!(rec.last_daily_at, Some(at));
        assert_eq!(rec.wallet.standard, 12);
    }

    #[test]
    fn test_history_newest_first_and_summaries() {
        let store = MemoryStore::new();
        let mut set = register("kafka");
        for rarity in [Rarity::Three, Rarity::Four, Rarity::Five] {
            set.push(StateChange::AppendHistory(row("kafka", rarity)));
        }
        store.commit(set).unwrap();

        let rows = store.history("kafka", 2).unwrap();
        assert_eq!(rows.iter().map(|r| r.rarity).collect::<Vec<_>>(), vec![Rarity::Five, Rarity::Four]);
        assert!(store.history("ghost", 5).is_err());

        let summaries = store.summaries().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(
            (summaries[0].total_draws, summaries[0].five_star, summaries[0].four_star),
            (3, 1, 1)
        );
    }

    #[test]
    fn test_rebuild_sets_reproduce_state() {
        let store = MemoryStore::new();
        let mut set = register("kafka");
        set.push(StateChange::AppendHistory(row("kafka", Rarity::Four)));
        set.push(StateChange::PutItem {
            item_id: "asta".into(),
            entry: InventoryEntry {
                category: ItemCategory::Character,
                copies: 2,
                obtained_at: Utc::now(),
            },
        });
        set.push(StateChange::SetDailyClaim(Utc::now()));
        store.commit(set).unwrap();
        store.commit(register("blade")).unwrap();

        let original = store.snapshot();
        let mut rebuilt = StoreState::default();
        for set in original.rebuild_sets() {
            rebuilt.apply(&set).unwrap();
        }
        assert_eq!(rebuilt, original);
    }
}
