//! # STELLAR Gacha Engine
//!
//! Loot-draw engine: resolves the rarity of each draw from pity counters,
//! picks an item under the featured 50/50 rules and applies the batch to the
//! player's state in one atomic commit.
//!
//! ## Design Principles
//!
//! 1. **All-or-nothing batches** - a failed batch leaves no trace
//! 2. **Pure draw logic** - resolver and selector only see values and a roll source
//! 3. **Read-only catalog** - built once, shared as `Arc<Catalog>`
//! 4. **Pluggable persistence** - anything implementing [`PlayerStore`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use stellar_gacha::{DrawEngine, EngineConfig, WalStore};
//!
//! let store = WalStore::open("data/players.wal")?;
//! let engine = DrawEngine::new(Arc::new(catalog), store, EngineConfig::default())?;
//!
//! engine.register_player("1001", "Stelle")?;
//! for outcome in engine.run_draws("1001", 10)? {
//!     println!("{} {} {:?}", outcome.rarity, outcome.item_id, outcome.tag);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod player;
pub mod rarity;
pub mod selector;
pub mod stats;
pub mod store;
pub mod wal;

pub use catalog::{
    Banner, BannerId, BannerPool, BannerRates, BaseRates, Catalog, CurrencyKind, FeaturedRule,
    HardPity, ItemCategory, ItemId, ItemMeta, Rarity, SoftPity,
};
pub use config::{ConversionConfig, ConversionRule, DailyConfig, EngineConfig, RegistrationConfig};
pub use engine::{BannerOdds, DrawEngine, DrawOutcome, OutcomeTag, OwnedItem, PlayerProfile};
pub use error::{GachaError, GachaResult};
pub use inventory::{Inventory, InventoryEntry, RankRule, RankRules};
pub use player::{DrawHistoryRecord, PityState, PlayerRecord, Wallet};
pub use rarity::{effective_odds, resolve_rarity, RarityOdds, RollSource, SeededRolls};
pub use selector::{select_item, Selection};
pub use stats::{DrawStats, LeaderboardEntry};
pub use store::{ChangeSet, MemoryStore, PlayerStore, PlayerSummary, StateChange, StoreState};
pub use wal::WalStore;
