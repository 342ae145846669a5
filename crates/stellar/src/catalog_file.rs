//! On-disk catalog format.
//!
//! ```toml
//! standard_banner = "stellar_warp"
//!
//! [[items]]
//! id = "bronya"
//! name = "Bronya"
//! rarity = 5
//! category = "character"
//!
//! [[banners]]
//! id = "stellar_warp"
//! name = "Stellar Warp"
//! currency = "standard"
//! pool.five_star_characters = ["bronya"]
//! rates.base = { five = 0.006, four = 0.051 }
//! rates.hard_pity = { four_at = 10, five_at = 90 }
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use stellar_gacha::{Banner, Catalog, ItemMeta};

/// Raw catalog file, validated by [`Catalog::new`].
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    /// Banner that registration and 5★ fallbacks use.
    pub standard_banner: String,
    /// Every drawable item.
    #[serde(default)]
    pub items: Vec<ItemMeta>,
    /// Every banner, active or not.
    #[serde(default)]
    pub banners: Vec<Banner>,
}

impl CatalogFile {
    /// Parses catalog TOML.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("catalog is not valid TOML")
    }

    /// Validates and builds the engine catalog.
    pub fn into_catalog(self) -> anyhow::Result<Catalog> {
        Catalog::new(self.items, self.banners, self.standard_banner).context("catalog failed validation")
    }
}

/// Reads, parses and validates a catalog file.
pub fn load(path: &Path) -> anyhow::Result<Catalog> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading catalog {}", path.display()))?;
    CatalogFile::from_toml_str(&text)
        .and_then(CatalogFile::into_catalog)
        .with_context(|| format!("loading catalog {}", path.display()))
}
