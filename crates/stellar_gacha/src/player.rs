//! # Player State
//!
//! Wallet, pity counters and history records kept per player.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{BannerId, CurrencyKind, ItemCategory, ItemId, Rarity};
use crate::error::{GachaError, GachaResult};
use crate::inventory::Inventory;

/// Currency balances. Every counter is unsigned and never goes negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Standard draw passes.
    pub standard: u64,
    /// Special draw passes.
    pub special: u64,
    /// Credits.
    pub credits: u64,
}

impl Wallet {
    /// Creates a wallet with the given balances.
    #[must_use]
    pub const fn new(standard: u64, special: u64, credits: u64) -> Self {
        Self {
            standard,
            special,
            credits,
        }
    }

    /// Balance of one currency.
    #[inline]
    #[must_use]
    pub const fn get(&self, kind: CurrencyKind) -> u64 {
        match kind {
            CurrencyKind::Standard => self.standard,
            CurrencyKind::Special => self.special,
            CurrencyKind::Credits => self.credits,
        }
    }

    fn slot_mut(&mut self, kind: CurrencyKind) -> &mut u64 {
        match kind {
            CurrencyKind::Standard => &mut self.standard,
            CurrencyKind::Special => &mut self.special,
            CurrencyKind::Credits => &mut self.credits,
        }
    }

    /// Adds to a balance, saturating at `u64::MAX`.
    pub fn credit(&mut self, kind: CurrencyKind, amount: u64) {
        let slot = self.slot_mut(kind);
        *slot = slot.saturating_add(amount);
    }

    /// Removes from a balance.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientCurrency` and leaves the wallet unchanged when the
    /// balance is too low.
    pub fn debit(&mut self, kind: CurrencyKind, amount: u64) -> GachaResult<()> {
        let slot = self.slot_mut(kind);
        if *slot < amount {
            return Err(GachaError::InsufficientCurrency {
                currency: kind,
                required: amount,
                available: *slot,
            });
        }
        *slot -= amount;
        Ok(())
    }

    /// Applies a signed adjustment.
    ///
    /// # Errors
    ///
    /// Same as [`Wallet::debit`] for negative deltas.
    pub fn apply_delta(&mut self, kind: CurrencyKind, delta: i64) -> GachaResult<()> {
        if delta >= 0 {
            self.credit(kind, delta.unsigned_abs());
            Ok(())
        } else {
            self.debit(kind, delta.unsigned_abs())
        }
    }
}

/// Pity counters and banner choice of a player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PityState {
    /// Draws since the last 4★ or better.
    pub pity4: u32,
    /// Draws since the last 5★.
    pub pity5: u32,
    /// Whether the last 5★ was featured. Starts true so the first 5★ is a
    /// plain 50/50.
    pub last_top_was_featured: bool,
    /// Banner the next batch draws on.
    pub active_banner: BannerId,
}

impl PityState {
    /// Fresh counters on the given banner.
    #[must_use]
    pub fn new(active_banner: impl Into<BannerId>, last_top_was_featured: bool) -> Self {
        Self {
            pity4: 0,
            pity5: 0,
            last_top_was_featured,
            active_banner: active_banner.into(),
        }
    }

    /// Advances the counters after a draw of the given rarity.
    pub fn record(&mut self, rarity: Rarity, is_featured: bool) {
        self.pity4 = if rarity >= Rarity::Four { 0 } else { self.pity4 + 1 };
        if rarity == Rarity::Five {
            self.pity5 = 0;
            self.last_top_was_featured = is_featured;
        } else {
            self.pity5 += 1;
        }
    }
}

/// One committed draw. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawHistoryRecord {
    /// Drawing player.
    pub player_id: String,
    /// Banner drawn on.
    pub banner_id: BannerId,
    /// Resolved rarity.
    pub rarity: Rarity,
    /// Item obtained.
    pub item_id: ItemId,
    /// Item category.
    pub category: ItemCategory,
    /// Draw time.
    pub timestamp: DateTime<Utc>,
}

/// Everything the store holds for a player, minus the history rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerRecord {
    /// Player identifier.
    pub player_id: String,
    /// Display name.
    pub name: String,
    /// Balances.
    pub wallet: Wallet,
    /// Pity counters and active banner.
    pub pity: PityState,
    /// Owned items.
    pub inventory: Inventory,
    /// Number of history rows, equal to committed draws.
    pub total_draws: u64,
    /// Last daily reward claim, if any.
    pub last_daily_at: Option<DateTime<Utc>>,
}
