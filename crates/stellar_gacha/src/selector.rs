//! # Item Selector
//!
//! Picks the concrete item for a resolved rarity.
//!
//! ## Pools per tier
//!
//! | Tier | Banner   | Candidates                                   | Featured |
//! |------|----------|----------------------------------------------|----------|
//! | 3★   | any      | 3★ light cones, then the 4★ union            | no       |
//! | 4★   | any      | 4★ characters ∪ 4★ light cones, then 3★      | no       |
//! | 5★   | standard | 5★ union, then the 4★ union                  | yes*     |
//! | 5★   | limited  | guarantee / 50-50 between featured and the   | per pool |
//! |      |          | standard banner's 5★ union, then the 4★ union|          |
//!
//! *Standard banners report every 5★ as featured. Nothing reads that flag for
//! standard banners; it only keeps the counter shape uniform.
//!
//! An empty pool degrades to the next one in its chain with a warning. Only a
//! chain with no items at all fails the draw.

use crate::catalog::{Banner, Catalog, ItemCategory, ItemId, Rarity};
use crate::error::{GachaError, GachaResult};
use crate::rarity::RollSource;

/// Probability of winning the 50/50 on a limited banner.
pub const FEATURED_SPLIT: f64 = 0.5;

/// The item chosen for one draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    /// Chosen item.
    pub item_id: ItemId,
    /// Category of the chosen item.
    pub category: ItemCategory,
    /// Whether the draw counts as featured.
    pub is_featured: bool,
}

/// Selects the item for a draw of the given rarity.
///
/// # Errors
///
/// Returns `MisconfiguredBanner` when every pool in the fallback chain for
/// the tier is empty.
pub fn select_item(
    catalog: &Catalog,
    banner: &Banner,
    rarity: Rarity,
    last_top_was_featured: bool,
    rolls: &mut dyn RollSource,
) -> GachaResult<Selection> {
    match rarity {
        Rarity::Three => {
            let chain = [banner.pool.tier(Rarity::Three), banner.pool.tier(Rarity::Four)];
            pick_from_chain(catalog, banner, rarity, &chain, false, rolls)
        }
        Rarity::Four => {
            let chain = [banner.pool.tier(Rarity::Four), banner.pool.tier(Rarity::Three)];
            pick_from_chain(catalog, banner, rarity, &chain, false, rolls)
        }
        Rarity::Five if banner.is_standard() => {
            let own = banner.pool.tier(Rarity::Five);
            if own.is_empty() {
                warn_fallback(banner, rarity, "5★ pool empty, using 4★ pool");
                let chain = [banner.pool.tier(Rarity::Four)];
                return pick_from_chain(catalog, banner, rarity, &chain, false, rolls);
            }
            pick(catalog, &own, true, rolls)
        }
        Rarity::Five => select_limited_five(catalog, banner, last_top_was_featured, rolls),
    }
}

/// 5★ on a limited banner: guarantee after a loss, otherwise 50/50.
fn select_limited_five(
    catalog: &Catalog,
    banner: &Banner,
    last_top_was_featured: bool,
    rolls: &mut dyn RollSource,
) -> GachaResult<Selection> {
    let featured = banner.featured_pool();
    let standard = catalog.standard_banner().pool.tier(Rarity::Five);

    match (featured.is_empty(), standard.is_empty()) {
        (false, false) => {
            let guaranteed = !last_top_was_featured && banner.guarantees_after_loss();
            if guaranteed || rolls.roll() < FEATURED_SPLIT {
                pick(catalog, &featured, true, rolls)
            } else {
                pick(catalog, &standard, false, rolls)
            }
        }
        (false, true) => {
            warn_fallback(banner, Rarity::Five, "standard 5★ pool empty, drawing featured");
            pick(catalog, &featured, true, rolls)
        }
        (true, false) => {
            warn_fallback(banner, Rarity::Five, "featured pool empty, drawing standard 5★");
            pick(catalog, &standard, false, rolls)
        }
        (true, true) => {
            warn_fallback(banner, Rarity::Five, "no 5★ pools, using 4★ pool");
            let chain = [banner.pool.tier(Rarity::Four)];
            pick_from_chain(catalog, banner, Rarity::Five, &chain, false, rolls)
        }
    }
}

/// Picks from the first non-empty pool of a fallback chain.
fn pick_from_chain(
    catalog: &Catalog,
    banner: &Banner,
    rarity: Rarity,
    chain: &[Vec<&ItemId>],
    is_featured: bool,
    rolls: &mut dyn RollSource,
) -> GachaResult<Selection> {
    for (depth, pool) in chain.iter().enumerate() {
        if pool.is_empty() {
            continue;
        }
        if depth > 0 {
            warn_fallback(banner, rarity, "primary pool empty, using fallback pool");
        }
        return pick(catalog, pool, is_featured, rolls);
    }
    tracing::error!(banner = %banner.id, %rarity, "no items available after fallback");
    Err(GachaError::MisconfiguredBanner {
        banner_id: banner.id.clone(),
        rarity,
    })
}

/// Uniform pick from a non-empty pool.
fn pick(
    catalog: &Catalog,
    pool: &[&ItemId],
    is_featured: bool,
    rolls: &mut dyn RollSource,
) -> GachaResult<Selection> {
    let item_id = pool[rolls.pick(pool.len())];
    // Catalog::new checked every pool reference.
    let meta = catalog
        .item(item_id)
        .ok_or_else(|| GachaError::InvalidConfig(format!("pool references unknown item {item_id}")))?;
    Ok(Selection {
        item_id: item_id.clone(),
        category: meta.category,
        is_featured,
    })
}

fn warn_fallback(banner: &Banner, rarity: Rarity, what: &str) {
    tracing::warn!(banner = %banner.id, %rarity, "{what}");
}
