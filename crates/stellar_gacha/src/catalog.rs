//! # Catalog
//!
//! Immutable item and banner definitions shared by every draw.
//!
//! The catalog is built once at startup from already-parsed values and then
//! shared read-only (`Arc<Catalog>`). Building it checks the cross references
//! between banners and items so the draw loop can rely on them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{GachaError, GachaResult};

/// Unique identifier for an item (character or light cone).
pub type ItemId = String;

/// Unique identifier for a banner.
pub type BannerId = String;

/// Rarity tier of a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Rarity {
    /// 3★, filler light cones.
    Three = 3,
    /// 4★.
    Four = 4,
    /// 5★, the top tier.
    Five = 5,
}

impl Rarity {
    /// Star count of this tier.
    #[inline]
    #[must_use]
    pub const fn stars(self) -> u8 {
        self as u8
    }

    /// Converts a star count into a tier.
    #[inline]
    #[must_use]
    pub const fn from_stars(stars: u8) -> Option<Self> {
        match stars {
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            5 => Some(Self::Five),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Rarity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_stars(value).ok_or_else(|| format!("rarity must be 3, 4 or 5, got {value}"))
    }
}

impl From<Rarity> for u8 {
    fn from(rarity: Rarity) -> Self {
        rarity.stars()
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}★", self.stars())
    }
}

/// Category of a drawable item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    /// Character; duplicates raise its eidolon.
    Character,
    /// Light cone; duplicates raise its superimposition.
    LightCone,
}

impl ItemCategory {
    /// Stable tag used in logs and on disk.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::LightCone => "light_cone",
        }
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of currency a player holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyKind {
    /// Standard draw pass, spent on the standard banner.
    Standard,
    /// Special draw pass, spent on limited banners.
    Special,
    /// Non-draw credits.
    Credits,
}

impl CurrencyKind {
    /// All currency kinds in storage order.
    pub const ALL: [Self; 3] = [Self::Standard, Self::Special, Self::Credits];

    /// Stable tag used in logs and on disk.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Special => "special",
            Self::Credits => "credits",
        }
    }
}

impl fmt::Display for CurrencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for one drawable item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Unique identifier.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Rarity tier.
    pub rarity: Rarity,
    /// Item category.
    pub category: ItemCategory,
}

/// Item pools of a banner, partitioned by rarity and category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerPool {
    /// 5★ characters.
    pub five_star_characters: Vec<ItemId>,
    /// 4★ characters.
    pub four_star_characters: Vec<ItemId>,
    /// 5★ light cones.
    pub five_star_light_cones: Vec<ItemId>,
    /// 4★ light cones.
    pub four_star_light_cones: Vec<ItemId>,
    /// 3★ light cones.
    pub three_star_light_cones: Vec<ItemId>,
}

impl BannerPool {
    /// All item ids configured for a tier, characters first.
    #[must_use]
    pub fn tier(&self, rarity: Rarity) -> Vec<&ItemId> {
        match rarity {
            Rarity::Five => self
                .five_star_characters
                .iter()
                .chain(&self.five_star_light_cones)
                .collect(),
            Rarity::Four => self
                .four_star_characters
                .iter()
                .chain(&self.four_star_light_cones)
                .collect(),
            Rarity::Three => self.three_star_light_cones.iter().collect(),
        }
    }

    /// Every slot with its expected rarity and category.
    fn slots(&self) -> [(&'static str, &[ItemId], Rarity, ItemCategory); 5] {
        [
            ("five_star_characters", self.five_star_characters.as_slice(), Rarity::Five, ItemCategory::Character),
            ("four_star_characters", self.four_star_characters.as_slice(), Rarity::Four, ItemCategory::Character),
            ("five_star_light_cones", self.five_star_light_cones.as_slice(), Rarity::Five, ItemCategory::LightCone),
            ("four_star_light_cones", self.four_star_light_cones.as_slice(), Rarity::Four, ItemCategory::LightCone),
            ("three_star_light_cones", self.three_star_light_cones.as_slice(), Rarity::Three, ItemCategory::LightCone),
        ]
    }
}

/// Base draw probabilities. Tier 3 takes the remainder.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaseRates {
    /// Probability of a 5★.
    pub five: f64,
    /// Probability of a 4★.
    pub four: f64,
}

/// Draw counts at which a tier becomes guaranteed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardPity {
    /// Guarantee point for 4★ or better.
    pub four_at: u32,
    /// Guarantee point for 5★.
    pub five_at: u32,
}

/// Linear probability ramp applied before hard pity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoftPity {
    /// Draw number (pity + 1) where the 4★ ramp starts.
    pub start_4: u32,
    /// 4★ probability added per draw past `start_4`.
    pub inc_4: f64,
    /// Draw number (pity + 1) where the 5★ ramp starts.
    pub start_5: u32,
    /// 5★ probability added per draw past `start_5`.
    pub inc_5: f64,
}

/// Rates and pity configuration of a banner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BannerRates {
    /// Base probabilities.
    pub base: BaseRates,
    /// Hard pity thresholds.
    pub hard_pity: HardPity,
    /// Optional soft-pity ramp.
    #[serde(default)]
    pub soft_pity: Option<SoftPity>,
}

/// Featured-item rule of a limited banner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturedRule {
    /// Featured 5★ subset. Empty means the banner's own 5★ pool.
    #[serde(default)]
    pub five_star: Vec<ItemId>,
    /// After a lost 50/50 the next 5★ is guaranteed featured.
    #[serde(default = "default_true")]
    pub guarantee_on_loss: bool,
}

const fn default_true() -> bool {
    true
}

/// A banner: one item pool players can draw on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    /// Unique identifier.
    pub id: BannerId,
    /// Display name.
    pub name: String,
    /// Currency spent per draw.
    pub currency: CurrencyKind,
    /// Item pools.
    pub pool: BannerPool,
    /// Rates and pity.
    pub rates: BannerRates,
    /// Featured rule, limited banners only.
    #[serde(default)]
    pub featured: Option<FeaturedRule>,
    /// Whether draws are currently allowed.
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Banner {
    /// Standard banners draw with the standard pass and have no 50/50.
    #[inline]
    #[must_use]
    pub fn is_standard(&self) -> bool {
        self.currency == CurrencyKind::Standard
    }

    /// Featured 5★ candidates of a limited banner.
    #[must_use]
    pub fn featured_pool(&self) -> Vec<&ItemId> {
        match &self.featured {
            Some(rule) if !rule.five_star.is_empty() => rule.five_star.iter().collect(),
            _ => self.pool.tier(Rarity::Five),
        }
    }

    /// Whether a lost 50/50 guarantees the next 5★.
    #[must_use]
    pub fn guarantees_after_loss(&self) -> bool {
        self.featured.as_ref().map_or(true, |rule| rule.guarantee_on_loss)
    }
}

/// The read-only catalog of items and banners.
#[derive(Clone, Debug)]
pub struct Catalog {
    items: HashMap<ItemId, ItemMeta>,
    banners: BTreeMap<BannerId, Banner>,
    standard_banner: BannerId,
}

impl Catalog {
    /// Builds the catalog and checks its cross references.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for duplicate ids, pool entries that do not
    /// exist or sit in the wrong rarity/category slot, out-of-range rates, or
    /// a missing standard banner.
    pub fn new(
        items: Vec<ItemMeta>,
        banners: Vec<Banner>,
        standard_banner: impl Into<BannerId>,
    ) -> GachaResult<Self> {
        let mut item_map = HashMap::with_capacity(items.len());
        for item in items {
            if let Some(dup) = item_map.insert(item.id.clone(), item) {
                return Err(GachaError::InvalidConfig(format!("duplicate item id {}", dup.id)));
            }
        }

        let mut banner_map = BTreeMap::new();
        for banner in banners {
            Self::check_banner(&item_map, &banner)?;
            if let Some(dup) = banner_map.insert(banner.id.clone(), banner) {
                return Err(GachaError::InvalidConfig(format!("duplicate banner id {}", dup.id)));
            }
        }

        let standard_banner = standard_banner.into();
        match banner_map.get(&standard_banner) {
            Some(b) if b.is_standard() => {}
            Some(_) => {
                return Err(GachaError::InvalidConfig(format!(
                    "standard banner {standard_banner} must draw with the standard currency"
                )))
            }
            None => return Err(GachaError::UnknownBanner(standard_banner)),
        }

        Ok(Self {
            items: item_map,
            banners: banner_map,
            standard_banner,
        })
    }

    fn check_banner(items: &HashMap<ItemId, ItemMeta>, banner: &Banner) -> GachaResult<()> {
        let invalid = |msg: String| GachaError::InvalidConfig(format!("banner {}: {msg}", banner.id));

        if banner.currency == CurrencyKind::Credits {
            return Err(invalid("credits cannot be spent on draws".into()));
        }

        let base = banner.rates.base;
        let in_unit = |p: f64| (0.0..=1.0).contains(&p);
        if !in_unit(base.five) || !in_unit(base.four) || base.five + base.four > 1.0 {
            return Err(invalid(format!("base rates out of range: {base:?}")));
        }
        let hard = banner.rates.hard_pity;
        if hard.four_at == 0 || hard.five_at == 0 {
            return Err(invalid("hard pity thresholds must be positive".into()));
        }
        if let Some(soft) = banner.rates.soft_pity {
            if soft.inc_4 < 0.0 || soft.inc_5 < 0.0 {
                return Err(invalid("soft pity increments must be non-negative".into()));
            }
        }

        for (slot, ids, rarity, category) in banner.pool.slots() {
            for id in ids {
                let meta = items
                    .get(id)
                    .ok_or_else(|| invalid(format!("{slot} references unknown item {id}")))?;
                if meta.rarity != rarity || meta.category != category {
                    return Err(invalid(format!(
                        "{slot} holds {id} ({} {})",
                        meta.rarity, meta.category
                    )));
                }
            }
        }
        if let Some(rule) = &banner.featured {
            for id in &rule.five_star {
                match items.get(id) {
                    Some(meta) if meta.rarity == Rarity::Five => {}
                    Some(_) => return Err(invalid(format!("featured item {id} is not 5★"))),
                    None => return Err(invalid(format!("featured item {id} does not exist"))),
                }
            }
        }
        Ok(())
    }

    /// Looks up an item.
    #[must_use]
    pub fn item(&self, id: &str) -> Option<&ItemMeta> {
        self.items.get(id)
    }

    /// Looks up a banner.
    #[must_use]
    pub fn banner(&self, id: &str) -> Option<&Banner> {
        self.banners.get(id)
    }

    /// The designated standard banner.
    #[must_use]
    pub fn standard_banner(&self) -> &Banner {
        // Presence is checked in `new` and the map is never mutated.
        &self.banners[&self.standard_banner]
    }

    /// All banners, ordered by id.
    pub fn banners(&self) -> impl Iterator<Item = &Banner> {
        self.banners.values()
    }

    /// Banners currently open for draws.
    pub fn active_banners(&self) -> impl Iterator<Item = &Banner> {
        self.banners.values().filter(|b| b.active)
    }

    /// Number of items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_catalog_builds() {
        let catalog = catalog();
        assert_eq!(catalog.item_count(), 9);
        assert_eq!(catalog.standard_banner().id, "stellar_warp");
        assert_eq!(catalog.banners().count(), 2);
        assert_eq!(catalog.item("seele").map(|m| m.rarity), Some(Rarity::Five));
    }

    #[test]
    fn test_rejects_unknown_pool_item() {
        let mut banner = standard_banner();
        banner.pool.four_star_characters.push("ghost".into());
        let err = Catalog::new(items(), vec![banner], "stellar_warp").unwrap_err();
        assert!(matches!(err, GachaError::InvalidConfig(msg) if msg.contains("ghost")));
    }

    #[test]
    fn test_rejects_item_in_wrong_slot() {
        let mut banner = standard_banner();
        banner.pool.five_star_characters.push("asta".into());
        assert!(Catalog::new(items(), vec![banner], "stellar_warp").is_err());
    }

    #[test]
    fn test_rejects_rates_above_one() {
        let mut banner = standard_banner();
        banner.rates.base = BaseRates { five: 0.6, four: 0.6 };
        assert!(Catalog::new(items(), vec![banner], "stellar_warp").is_err());
    }

    #[test]
    fn test_standard_banner_must_exist_and_be_standard() {
        let err = Catalog::new(items(), vec![standard_banner()], "nope").unwrap_err();
        assert_eq!(err, GachaError::UnknownBanner("nope".into()));

        let err = Catalog::new(items(), vec![limited_banner()], "butterfly_on_swordtip").unwrap_err();
        assert!(matches!(err, GachaError::InvalidConfig(_)));
    }

    #[test]
    fn test_featured_pool_defaults_to_own_five_stars() {
        let mut banner = limited_banner();
        banner.featured = None;
        assert_eq!(banner.featured_pool(), vec!["seele"]);
        assert!(banner.guarantees_after_loss());
    }

    #[test]
    fn test_rarity_from_toml_integer() {
        #[derive(Deserialize)]
        struct Holder {
            rarity: Rarity,
        }
        let holder: Holder = toml::from_str("rarity = 4").unwrap();
        assert_eq!(holder.rarity, Rarity::Four);
        assert!(toml::from_str::<Holder>("rarity = 2").is_err());
    }
}
