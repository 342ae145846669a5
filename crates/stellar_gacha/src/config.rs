//! # Engine Configuration
//!
//! Tunables loaded once at startup from TOML. Every section is optional and
//! falls back to the defaults below.
//!
//! ```toml
//! [registration]
//! default_banner = "stellar_warp"
//! standard = 10
//! special = 0
//! credits = 1000
//! last_top_was_featured = true
//!
//! [ranks.character]
//! base = 0
//! max = 6
//!
//! [ranks.light_cone]
//! base = 1
//! max = 5
//!
//! [conversion.five_star]
//! currency = "special"
//! amount = 5
//!
//! [conversion.four_star]
//! currency = "standard"
//! amount = 2
//!
//! [history]
//! default_limit = 10
//! max_limit = 50
//!
//! [daily]
//! currency = "standard"
//! amount = 2
//! cooldown_hours = 24
//!
//! [leaderboard]
//! default_size = 20
//! max_size = 100
//! ```

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::catalog::{BannerId, CurrencyKind, Rarity};
use crate::error::{GachaError, GachaResult};
use crate::inventory::RankRules;
use crate::player::{PityState, Wallet};

/// Starting state for newly registered players.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Banner a new player starts on.
    pub default_banner: BannerId,
    /// Welcome standard passes.
    pub standard: u64,
    /// Welcome special passes.
    pub special: u64,
    /// Welcome credits.
    pub credits: u64,
    /// Initial featured flag. True makes the first limited 5★ a plain 50/50.
    pub last_top_was_featured: bool,
}

impl RegistrationConfig {
    /// Opening wallet.
    #[must_use]
    pub const fn wallet(&self) -> Wallet {
        Wallet::new(self.standard, self.special, self.credits)
    }

    /// Opening pity state.
    #[must_use]
    pub fn pity(&self) -> PityState {
        PityState::new(self.default_banner.clone(), self.last_top_was_featured)
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            default_banner: "stellar_warp".to_string(),
            standard: 10,
            special: 0,
            credits: 1000,
            last_top_was_featured: true,
        }
    }
}

/// Currency granted for a duplicate past the cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRule {
    /// Currency credited.
    pub currency: CurrencyKind,
    /// Amount credited.
    pub amount: u64,
}

/// At-cap conversion per tier. 3★ duplicates convert to nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// 5★ duplicate reward.
    pub five_star: ConversionRule,
    /// 4★ duplicate reward.
    pub four_star: ConversionRule,
}

impl ConversionConfig {
    /// Reward for an at-cap duplicate of the given tier.
    #[must_use]
    pub const fn for_rarity(&self, rarity: Rarity) -> Option<ConversionRule> {
        match rarity {
            Rarity::Five => Some(self.five_star),
            Rarity::Four => Some(self.four_star),
            Rarity::Three => None,
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            five_star: ConversionRule {
                currency: CurrencyKind::Special,
                amount: 5,
            },
            four_star: ConversionRule {
                currency: CurrencyKind::Standard,
                amount: 2,
            },
        }
    }
}

/// History page sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Rows returned when the caller does not say.
    pub default_limit: usize,
    /// Upper clamp on requested rows.
    pub max_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
        }
    }
}

/// Daily login reward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyConfig {
    /// Currency credited per claim.
    pub currency: CurrencyKind,
    /// Amount credited per claim.
    pub amount: u64,
    /// Hours between claims.
    pub cooldown_hours: u32,
}

impl DailyConfig {
    /// Minimum gap between two claims.
    #[must_use]
    pub fn cooldown(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.cooldown_hours))
    }
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            currency: CurrencyKind::Standard,
            amount: 2,
            cooldown_hours: 24,
        }
    }
}

/// Leaderboard sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    /// Entries returned when the caller does not say.
    pub default_size: usize,
    /// Upper clamp on requested entries.
    pub max_size: usize,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            default_size: 20,
            max_size: 100,
        }
    }
}

/// All engine tunables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// New player defaults.
    pub registration: RegistrationConfig,
    /// Rank caps per category.
    pub ranks: RankRules,
    /// At-cap currency conversion.
    pub conversion: ConversionConfig,
    /// History paging.
    pub history: HistoryConfig,
    /// Daily reward.
    pub daily: DailyConfig,
    /// Leaderboard sizing.
    pub leaderboard: LeaderboardConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on malformed TOML or values that fail
    /// [`EngineConfig::validate`].
    pub fn from_toml_str(text: &str) -> GachaResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| GachaError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> GachaResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GachaError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Serializes back to TOML.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if serialization fails.
    pub fn to_toml(&self) -> GachaResult<String> {
        toml::to_string_pretty(self).map_err(|e| GachaError::InvalidConfig(e.to_string()))
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> GachaResult<()> {
        for (name, rule) in [("character", self.ranks.character), ("light_cone", self.ranks.light_cone)] {
            if rule.max < rule.base {
                return Err(GachaError::InvalidConfig(format!(
                    "ranks.{name}: max {} is below base {}",
                    rule.max, rule.base
                )));
            }
        }
        if self.history.default_limit == 0 || self.history.max_limit == 0 {
            return Err(GachaError::InvalidConfig("history limits must be positive".into()));
        }
        if self.leaderboard.default_size == 0 || self.leaderboard.max_size == 0 {
            return Err(GachaError::InvalidConfig("leaderboard sizes must be positive".into()));
        }
        if self.daily.cooldown_hours == 0 {
            return Err(GachaError::InvalidConfig("daily.cooldown_hours must be positive".into()));
        }
        if i64::try_from(self.daily.amount).is_err() {
            return Err(GachaError::InvalidConfig(format!(
                "daily.amount {} is out of range",
                self.daily.amount
            )));
        }
        if self.registration.default_banner.is_empty() {
            return Err(GachaError::InvalidConfig("registration.default_banner is empty".into()));
        }
        Ok(())
    }

    /// Clamps a requested history page size. `None` means the default.
    #[must_use]
    pub fn history_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.history.default_limit)
            .clamp(1, self.history.max_limit.max(1))
    }

    /// Clamps a requested leaderboard size. `None` means the default.
    #[must_use]
    pub fn leaderboard_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.leaderboard.default_size)
            .clamp(1, self.leaderboard.max_size.max(1))
    }
}
