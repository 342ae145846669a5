//! # Gacha Error Types
//!
//! Every failure the draw engine can report. Errors are returned before any
//! state mutation becomes visible, so callers never observe partial batches.

use chrono::TimeDelta;
use thiserror::Error;

use crate::catalog::{CurrencyKind, Rarity};

/// Errors that can occur in the gacha engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GachaError {
    /// The player has no state row.
    #[error("player not registered: {0}")]
    NotRegistered(String),

    /// The player already has a state row.
    #[error("player already registered: {0}")]
    AlreadyRegistered(String),

    /// Banner id is not present in the catalog.
    #[error("unknown banner: {0}")]
    UnknownBanner(String),

    /// The player's active banner is currently disabled.
    #[error("banner inactive: {0}")]
    BannerInactive(String),

    /// The batch would overdraw a balance.
    #[error("insufficient {currency}: need {required}, have {available}")]
    InsufficientCurrency {
        /// Currency the banner draws with.
        currency: CurrencyKind,
        /// Amount the batch needs.
        required: u64,
        /// Amount the player holds.
        available: u64,
    },

    /// Draw count must be at least one.
    #[error("draw count must be positive")]
    InvalidDrawCount,

    /// Every pool in the fallback chain for a tier is empty.
    #[error("banner {banner_id} has no items for rarity {rarity} even after fallback")]
    MisconfiguredBanner {
        /// Banner being drawn on.
        banner_id: String,
        /// Tier that could not be served.
        rarity: Rarity,
    },

    /// Persistence failed; the batch was rolled back.
    #[error("store commit failed: {reason}")]
    StoreCommitFailed {
        /// Underlying cause.
        reason: String,
    },

    /// A change set breaks a store invariant. Retrying the same set fails
    /// the same way.
    #[error("invalid change set: {0}")]
    InvalidChangeSet(String),

    /// The backing storage could not be opened or read.
    #[error("store unavailable: {reason}")]
    StoreUnavailable {
        /// Underlying cause.
        reason: String,
    },

    /// The daily reward was already claimed within the cooldown.
    #[error("daily reward on cooldown, {}h {}m left", .remaining.num_hours(), .remaining.num_minutes() % 60)]
    DailyCooldown {
        /// Time until the next claim is allowed.
        remaining: TimeDelta,
    },

    /// Invalid configuration or catalog data.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GachaError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreCommitFailed { .. })
    }

    /// Missing amount for an `InsufficientCurrency` error.
    #[must_use]
    pub const fn shortfall(&self) -> Option<u64> {
        match self {
            Self::InsufficientCurrency {
                required,
                available,
                ..
            } => Some(required.saturating_sub(*available)),
            _ => None,
        }
    }

    pub(crate) fn commit_failed(reason: impl std::fmt::Display) -> Self {
        Self::StoreCommitFailed {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unavailable(reason: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable {
            reason: reason.to_string(),
        }
    }
}

/// Result type for gacha operations.
pub type GachaResult<T> = Result<T, GachaError>;
