//! # Draw Engine
//!
//! The transaction orchestrator. Every public mutation goes through here and
//! reaches the store as one atomic change set.
//!
//! ## The Draw Pipeline
//!
//! ```text
//! run_draws(player, n) ──> lock player ──> load record
//!   1. Validate (count, registration, banner, balance)
//!   2. Debit n on the working copy
//!   3. Loop n times: resolve rarity -> select item -> apply to working copy
//!   4. Commit one change set
//!   5. Return ordered outcomes
//! ```
//!
//! Nothing is visible to the store until step 4 succeeds. Any error before
//! or during it leaves the player exactly as they were.
//!
//! ## Thread Safety
//!
//! `DrawEngine` is `Send + Sync` when its store is. Calls for the same player
//! are serialized by a per-player lock; different players run in parallel.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::catalog::{BannerId, Catalog, CurrencyKind, ItemCategory, ItemId, Rarity};
use crate::config::EngineConfig;
use crate::error::{GachaError, GachaResult};
use crate::inventory::Acquisition;
use crate::player::{DrawHistoryRecord, PityState, PlayerRecord, Wallet};
use crate::rarity::{effective_odds, resolve_rarity, RarityOdds, RollSource, SeededRolls};
use crate::selector::select_item;
use crate::stats::{self, DrawStats, LeaderboardEntry};
use crate::store::{ChangeSet, PlayerStore, StateChange};

// ============================================================================
// Public Result Types
// ============================================================================

/// What a draw did to the player's collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeTag {
    /// First copy of the item.
    NewAcquisition,
    /// Duplicate below cap.
    RankUp {
        /// Rank after the duplicate.
        rank: u32,
    },
    /// Duplicate at cap, converted into currency.
    ConvertedCurrency {
        /// Currency credited.
        currency: CurrencyKind,
        /// Amount credited.
        amount: u64,
    },
    /// Duplicate at cap with no conversion for its tier.
    AtCapNoReward,
}

/// Result of one draw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DrawOutcome {
    /// Resolved rarity.
    pub rarity: Rarity,
    /// Item obtained.
    pub item_id: ItemId,
    /// Item category.
    pub category: ItemCategory,
    /// Whether the draw counted as featured.
    pub is_featured: bool,
    /// Effect on the collection.
    pub tag: OutcomeTag,
}

/// Read-only view of a player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlayerProfile {
    /// Player identifier.
    pub player_id: String,
    /// Display name.
    pub name: String,
    /// Balances.
    pub wallet: Wallet,
    /// Pity counters and active banner.
    pub pity: PityState,
    /// Committed draws.
    pub total_draws: u64,
    /// Distinct items owned.
    pub owned_items: usize,
}

impl From<&PlayerRecord> for PlayerProfile {
    fn from(record: &PlayerRecord) -> Self {
        Self {
            player_id: record.player_id.clone(),
            name: record.name.clone(),
            wallet: record.wallet,
            pity: record.pity.clone(),
            total_draws: record.total_draws,
            owned_items: record.inventory.len(),
        }
    }
}

/// One owned item with its catalog data and rank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OwnedItem {
    /// Item id.
    pub item_id: ItemId,
    /// Display name, or the id if the item left the catalog.
    pub name: String,
    /// Catalog rarity, if still listed.
    pub rarity: Option<Rarity>,
    /// Category.
    pub category: ItemCategory,
    /// Copies held.
    pub copies: u32,
    /// Eidolon or superimposition level.
    pub rank: u32,
    /// First acquisition.
    pub obtained_at: DateTime<Utc>,
}

/// Odds for a player's next draw on their active banner.
#[derive(Clone, Debug, PartialEq)]
pub struct BannerOdds {
    /// Active banner.
    pub banner_id: BannerId,
    /// Effective probabilities at current pity.
    pub odds: RarityOdds,
    /// Draws since the last 4★ or better.
    pub pity4: u32,
    /// Draws since the last 5★.
    pub pity5: u32,
    /// Whether the next 5★ is guaranteed featured.
    pub featured_guaranteed: bool,
}

// ============================================================================
// The Engine
// ============================================================================

/// Gacha draw engine.
///
/// ```rust,ignore
/// let engine = DrawEngine::new(Arc::new(catalog), MemoryStore::new(), EngineConfig::default())?;
/// engine.register_player("42", "Trailblazer")?;
/// let outcomes = engine.run_draws("42", 10)?;
/// ```
pub struct DrawEngine<S: PlayerStore> {
    catalog: Arc<Catalog>,
    store: S,
    config: EngineConfig,
    /// Per-player batch locks.
    player_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Master stream; locked only to fork a per-batch stream.
    rolls: Mutex<SeededRolls>,
}

impl<S: PlayerStore> DrawEngine<S> {
    /// Creates an engine with an entropy-seeded roll stream.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the config fails validation, or
    /// `UnknownBanner` if the registration banner is not in the catalog.
    pub fn new(catalog: Arc<Catalog>, store: S, config: EngineConfig) -> GachaResult<Self> {
        config.validate()?;
        let default_banner = &config.registration.default_banner;
        if catalog.banner(default_banner).is_none() {
            return Err(GachaError::UnknownBanner(default_banner.clone()));
        }
        Ok(Self {
            catalog,
            store,
            config,
            player_locks: Mutex::new(HashMap::new()),
            rolls: Mutex::new(SeededRolls::from_entropy()),
        })
    }

    /// Replaces the master roll stream with a seeded one.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rolls.lock() = SeededRolls::new(seed);
        self
    }

    /// The catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs `f` holding the player's lock. The lock entry is dropped once
    /// no other call holds or waits on it.
    fn with_player_lock<T>(&self, player_id: &str, f: impl FnOnce() -> GachaResult<T>) -> GachaResult<T> {
        let lock = self
            .player_locks
            .lock()
            .entry(player_id.to_string())
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock();
            f()
        };

        // Clones are only taken under the map lock, so a count of two (map
        // plus ours) means nobody else is waiting.
        let mut locks = self.player_locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(player_id);
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn lock_count(&self) -> usize {
        self.player_locks.lock().len()
    }

    fn load_registered(&self, player_id: &str) -> GachaResult<PlayerRecord> {
        self.store
            .load(player_id)?
            .ok_or_else(|| GachaError::NotRegistered(player_id.to_string()))
    }

    fn commit(&self, set: ChangeSet) -> GachaResult<()> {
        let player_id = set.player_id.clone();
        self.store.commit(set).map_err(|e| {
            if e.is_retryable() {
                tracing::error!(player = %player_id, error = %e, "store commit failed");
            }
            e
        })
    }

    // ========================================================================
    // Draws
    // ========================================================================

    /// Runs a batch of draws on the player's active banner.
    ///
    /// # Errors
    ///
    /// In check order: `InvalidDrawCount`, `NotRegistered`, `UnknownBanner`,
    /// `BannerInactive`, `InsufficientCurrency`. Then `MisconfiguredBanner`
    /// or `StoreCommitFailed` from the batch itself. No state changes on any
    /// error.
    pub fn run_draws(&self, player_id: &str, count: u32) -> GachaResult<Vec<DrawOutcome>> {
        let mut rolls = self.rolls.lock().fork();
        self.run_draws_with(player_id, count, &mut rolls)
    }

    /// Runs a batch of draws with caller-supplied randomness.
    ///
    /// # Errors
    ///
    /// Same as [`DrawEngine::run_draws`].
    pub fn run_draws_with(
        &self,
        player_id: &str,
        count: u32,
        rolls: &mut dyn RollSource,
    ) -> GachaResult<Vec<DrawOutcome>> {
        if count == 0 {
            return Err(GachaError::InvalidDrawCount);
        }

        self.with_player_lock(player_id, || self.draw_locked(player_id, count, rolls))
    }

    fn draw_locked(&self, player_id: &str, count: u32, rolls: &mut dyn RollSource) -> GachaResult<Vec<DrawOutcome>> {
        // Step 1: Validate
        let mut record = self.load_registered(player_id)?;
        let banner_id = record.pity.active_banner.clone();
        let banner = self
            .catalog
            .banner(&banner_id)
            .ok_or_else(|| GachaError::UnknownBanner(banner_id.clone()))?;
        if !banner.active {
            return Err(GachaError::BannerInactive(banner_id));
        }

        // Step 2: Debit
        record.wallet.debit(banner.currency, u64::from(count))?;
        let mut set = ChangeSet::new(player_id);
        set.push(StateChange::AdjustCurrency {
            kind: banner.currency,
            delta: -i64::from(count),
        });

        // Step 3: Draw loop on the working copy
        let now = Utc::now();
        let mut pity = record.pity.clone();
        let mut converted = Wallet::default();
        let mut touched = BTreeSet::new();
        let mut outcomes = Vec::new();

        for _ in 0..count {
            let rarity = resolve_rarity(pity.pity4, pity.pity5, &banner.rates, rolls);
            let selection = select_item(&self.catalog, banner, rarity, pity.last_top_was_featured, rolls)?;

            let rule = self.config.ranks.for_category(selection.category);
            let tag = match record.inventory.acquire(&selection.item_id, selection.category, rule, now) {
                Acquisition::New => {
                    touched.insert(selection.item_id.clone());
                    OutcomeTag::NewAcquisition
                }
                Acquisition::RankUp { rank } => {
                    touched.insert(selection.item_id.clone());
                    OutcomeTag::RankUp { rank }
                }
                Acquisition::AtCap => match self.config.conversion.for_rarity(rarity) {
                    Some(reward) if reward.amount > 0 => {
                        converted.credit(reward.currency, reward.amount);
                        OutcomeTag::ConvertedCurrency {
                            currency: reward.currency,
                            amount: reward.amount,
                        }
                    }
                    _ => OutcomeTag::AtCapNoReward,
                },
            };

            pity.record(rarity, selection.is_featured);
            tracing::debug!(
                player = %player_id,
                banner = %banner_id,
                %rarity,
                item = %selection.item_id,
                featured = selection.is_featured,
                pity4 = pity.pity4,
                pity5 = pity.pity5,
                "draw resolved"
            );

            set.push(StateChange::AppendHistory(DrawHistoryRecord {
                player_id: player_id.to_string(),
                banner_id: banner_id.clone(),
                rarity,
                item_id: selection.item_id.clone(),
                category: selection.category,
                timestamp: now,
            }));
            outcomes.push(DrawOutcome {
                rarity,
                item_id: selection.item_id,
                category: selection.category,
                is_featured: selection.is_featured,
                tag,
            });
        }

        for kind in CurrencyKind::ALL {
            let amount = converted.get(kind);
            if amount > 0 {
                set.push(StateChange::AdjustCurrency {
                    kind,
                    delta: i64::try_from(amount).unwrap_or(i64::MAX),
                });
            }
        }
        for item_id in touched {
            if let Some(entry) = record.inventory.get(&item_id) {
                let entry = entry.clone();
                set.push(StateChange::PutItem { item_id, entry });
            }
        }
        set.push(StateChange::SetPity(pity));

        // Step 4: Commit
        self.commit(set)?;

        tracing::info!(
            player = %player_id,
            banner = %banner_id,
            draws = count,
            five_star = outcomes.iter().filter(|o| o.rarity == Rarity::Five).count(),
            four_star = outcomes.iter().filter(|o| o.rarity == Rarity::Four).count(),
            "draw batch committed"
        );
        Ok(outcomes)
    }

    // ========================================================================
    // Player Management
    // ========================================================================

    /// Registers a player with the configured welcome state.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` for a known id, or store failures.
    pub fn register_player(&self, player_id: &str, name: &str) -> GachaResult<PlayerProfile> {
        self.with_player_lock(player_id, || {
            let registration = &self.config.registration;
            let mut set = ChangeSet::new(player_id);
            set.push(StateChange::Register {
                name: name.to_string(),
                wallet: registration.wallet(),
                pity: registration.pity(),
            });
            self.commit(set)?;

            tracing::info!(player = %player_id, %name, banner = %registration.default_banner, "player registered");
            Ok(PlayerProfile::from(&self.load_registered(player_id)?))
        })
    }

    /// Switches the banner the player's next batch draws on.
    ///
    /// Inactive banners may be selected; drawing on them fails until they
    /// reopen.
    ///
    /// # Errors
    ///
    /// `UnknownBanner` if the catalog has no such banner, `NotRegistered`
    /// for unknown players.
    pub fn set_active_banner(&self, player_id: &str, banner_id: &str) -> GachaResult<()> {
        if self.catalog.banner(banner_id).is_none() {
            return Err(GachaError::UnknownBanner(banner_id.to_string()));
        }

        self.with_player_lock(player_id, || {
            let record = self.load_registered(player_id)?;
            let mut pity = record.pity;
            pity.active_banner = banner_id.to_string();
            let mut set = ChangeSet::new(player_id);
            set.push(StateChange::SetPity(pity));
            self.commit(set)?;

            tracing::info!(player = %player_id, banner = %banner_id, "active banner changed");
            Ok(())
        })
    }

    /// Credits currency to a player (admin grants, event rewards).
    ///
    /// # Errors
    ///
    /// `NotRegistered`, `InvalidConfig` for amounts beyond `i64::MAX`, or
    /// store failures.
    pub fn grant_currency(&self, player_id: &str, kind: CurrencyKind, amount: u64) -> GachaResult<Wallet> {
        let delta = i64::try_from(amount)
            .map_err(|_| GachaError::InvalidConfig(format!("grant of {amount} {kind} is too large")))?;

        self.with_player_lock(player_id, || {
            let mut record = self.load_registered(player_id)?;
            let mut set = ChangeSet::new(player_id);
            set.push(StateChange::AdjustCurrency { kind, delta });
            self.commit(set)?;

            record.wallet.credit(kind, amount);
            tracing::info!(player = %player_id, currency = %kind, amount, "currency granted");
            Ok(record.wallet)
        })
    }

    /// Credits the daily reward if the cooldown since the last claim has
    /// passed.
    ///
    /// # Errors
    ///
    /// `NotRegistered`, `DailyCooldown` with the time left, or store
    /// failures. No state changes on any error.
    pub fn claim_daily(&self, player_id: &str, now: DateTime<Utc>) -> GachaResult<Wallet> {
        let daily = self.config.daily;
        let delta = i64::try_from(daily.amount)
            .map_err(|_| GachaError::InvalidConfig(format!("daily.amount {} is out of range", daily.amount)))?;

        self.with_player_lock(player_id, || {
            let mut record = self.load_registered(player_id)?;
            if let Some(last) = record.last_daily_at {
                let ready_at = last + daily.cooldown();
                if now < ready_at {
                    return Err(GachaError::DailyCooldown {
                        remaining: ready_at - now,
                    });
                }
            }

            let mut set = ChangeSet::new(player_id);
            set.push(StateChange::AdjustCurrency {
                kind: daily.currency,
                delta,
            });
            set.push(StateChange::SetDailyClaim(now));
            self.commit(set)?;

            record.wallet.credit(daily.currency, daily.amount);
            tracing::info!(player = %player_id, currency = %daily.currency, amount = daily.amount, "daily reward claimed");
            Ok(record.wallet)
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Profile of a player.
    ///
    /// # Errors
    ///
    /// `NotRegistered` for unknown players.
    pub fn profile(&self, player_id: &str) -> GachaResult<PlayerProfile> {
        Ok(PlayerProfile::from(&self.load_registered(player_id)?))
    }

    /// Owned items, highest rarity first, then by name.
    ///
    /// # Errors
    ///
    /// `NotRegistered` for unknown players.
    pub fn inventory(&self, player_id: &str) -> GachaResult<Vec<OwnedItem>> {
        let record = self.load_registered(player_id)?;
        let mut items: Vec<OwnedItem> = record
            .inventory
            .iter()
            .map(|(item_id, entry)| {
                let meta = self.catalog.item(item_id);
                OwnedItem {
                    item_id: item_id.clone(),
                    name: meta.map_or_else(|| item_id.clone(), |m| m.name.clone()),
                    rarity: meta.map(|m| m.rarity),
                    category: entry.category,
                    copies: entry.copies,
                    rank: self.config.ranks.for_category(entry.category).rank(entry.copies),
                    obtained_at: entry.obtained_at,
                }
            })
            .collect();
        items.sort_by(|a, b| b.rarity.cmp(&a.rarity).then_with(|| a.name.cmp(&b.name)));
        Ok(items)
    }

    /// Newest-first draw history. `None` uses the configured default page.
    ///
    /// # Errors
    ///
    /// `NotRegistered` for unknown players.
    pub fn history(&self, player_id: &str, limit: Option<usize>) -> GachaResult<Vec<DrawHistoryRecord>> {
        self.store.history(player_id, self.config.history_limit(limit))
    }

    /// Odds of the player's next draw on their active banner.
    ///
    /// # Errors
    ///
    /// `NotRegistered`, or `UnknownBanner` if the active banner left the
    /// catalog.
    pub fn odds(&self, player_id: &str) -> GachaResult<BannerOdds> {
        let record = self.load_registered(player_id)?;
        let pity = record.pity;
        let banner = self
            .catalog
            .banner(&pity.active_banner)
            .ok_or_else(|| GachaError::UnknownBanner(pity.active_banner.clone()))?;
        Ok(BannerOdds {
            banner_id: banner.id.clone(),
            odds: effective_odds(pity.pity4, pity.pity5, &banner.rates),
            pity4: pity.pity4,
            pity5: pity.pity5,
            featured_guaranteed: !banner.is_standard()
                && !pity.last_top_was_featured
                && banner.guarantees_after_loss(),
        })
    }

    /// Totals across all players.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn global_stats(&self) -> GachaResult<DrawStats> {
        Ok(DrawStats::aggregate(&self.store.summaries()?))
    }

    /// Players ordered by draw count. `None` uses the configured default.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn leaderboard(&self, top: Option<usize>) -> GachaResult<Vec<LeaderboardEntry>> {
        let size = self.config.leaderboard_size(top);
        Ok(stats::leaderboard(self.store.summaries()?, size))
    }
}
