//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;

use stellar_gacha::{
    Banner, BannerPool, BannerRates, BaseRates, Catalog, CurrencyKind, FeaturedRule, HardPity,
    ItemCategory, ItemMeta, Rarity, RollSource, SoftPity,
};

pub const STANDARD: &str = "stellar_warp";
pub const LIMITED: &str = "butterfly_on_swordtip";

pub fn temp_wal_path(tag: &str) -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("stellar_{tag}_{id}.wal"))
}

fn item(id: &str, rarity: Rarity, category: ItemCategory) -> ItemMeta {
    ItemMeta {
        id: id.into(),
        name: id.replace('_', " "),
        rarity,
        category,
    }
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

pub fn rates() -> BannerRates {
    BannerRates {
        base: BaseRates { five: 0.006, four: 0.051 },
        hard_pity: HardPity { four_at: 10, five_at: 90 },
        soft_pity: Some(SoftPity { start_4: 9, inc_4: 0.5, start_5: 74, inc_5: 0.06 }),
    }
}

pub fn catalog() -> Catalog {
    let items = vec![
        item("bronya", Rarity::Five, ItemCategory::Character),
        item("gepard", Rarity::Five, ItemCategory::Character),
        item("kafka", Rarity::Five, ItemCategory::Character),
        item("in_the_night", Rarity::Five, ItemCategory::LightCone),
        item("serval", Rarity::Four, ItemCategory::Character),
        item("natasha", Rarity::Four, ItemCategory::Character),
        item("planetary_rendezvous", Rarity::Four, ItemCategory::LightCone),
        item("void", Rarity::Three, ItemCategory::LightCone),
        item("pioneering", Rarity::Three, ItemCategory::LightCone),
    ];
    let standard = Banner {
        id: STANDARD.into(),
        name: "Stellar Warp".into(),
        currency: CurrencyKind::Standard,
        pool: BannerPool {
            five_star_characters: ids(&["bronya", "gepard"]),
            four_star_characters: ids(&["serval", "natasha"]),
            five_star_light_cones: ids(&["in_the_night"]),
            four_star_light_cones: ids(&["planetary_rendezvous"]),
            three_star_light_cones: ids(&["void", "pioneering"]),
        },
        rates: rates(),
        featured: None,
        active: true,
    };
    let limited = Banner {
        id: LIMITED.into(),
        name: "Butterfly on Swordtip".into(),
        currency: CurrencyKind::Special,
        pool: BannerPool {
            five_star_characters: ids(&["kafka"]),
            four_star_characters: ids(&["serval", "natasha"]),
            five_star_light_cones: Vec::new(),
            four_star_light_cones: ids(&["planetary_rendezvous"]),
            three_star_light_cones: ids(&["void", "pioneering"]),
        },
        rates: rates(),
        featured: Some(FeaturedRule {
            five_star: ids(&["kafka"]),
            guarantee_on_loss: true,
        }),
        active: true,
    };
    Catalog::new(items, vec![standard, limited], STANDARD).unwrap()
}

/// Replays fixed rolls; every pick takes the first candidate.
pub struct FixedRolls {
    rolls: VecDeque<f64>,
}

impl FixedRolls {
    pub fn new(rolls: &[f64]) -> Self {
        Self {
            rolls: rolls.iter().copied().collect(),
        }
    }
}

impl RollSource for FixedRolls {
    fn roll(&mut self) -> f64 {
        self.rolls.pop_front().expect("script ran out of rolls")
    }

    fn pick(&mut self, _len: usize) -> usize {
        0
    }
}
