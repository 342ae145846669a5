//! # Rarity Resolver
//!
//! Maps pity counters and banner rates to the rarity tier of one draw.
//!
//! Evaluation order:
//!
//! ```text
//! pity5 + 1 >= five_at  ──> 5★ (no roll)
//! pity4 + 1 >= four_at  ──> roll: 5★ if r < base5, else 4★
//! otherwise             ──> soft-pity odds, roll: 5★ | 4★ | 3★
//! ```
//!
//! Randomness is pulled from a [`RollSource`]. Production draws use a ChaCha8
//! stream seeded from OS entropy: statistically uniform, not a secret.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::catalog::{BannerRates, Rarity};

/// Source of uniform randomness for draws.
pub trait RollSource {
    /// Uniform value in `[0, 1)`.
    fn roll(&mut self) -> f64;

    /// Uniform index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// Seeded ChaCha8 roll stream.
#[derive(Clone, Debug)]
pub struct SeededRolls {
    rng: ChaCha8Rng,
}

impl SeededRolls {
    /// Deterministic stream for replays and tests.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Stream seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Derives an independent stream (one per draw batch).
    #[must_use]
    pub fn fork(&mut self) -> Self {
        Self::new(self.rng.gen())
    }
}

impl RollSource for SeededRolls {
    fn roll(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

/// Effective per-draw probabilities for the next draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RarityOdds {
    /// Probability of a 5★.
    pub five: f64,
    /// Probability of a 4★.
    pub four: f64,
}

impl RarityOdds {
    /// Probability of a 3★ (the remainder).
    #[inline]
    #[must_use]
    pub fn three(&self) -> f64 {
        (1.0 - self.five - self.four).max(0.0)
    }

    /// Probability of the given tier.
    #[must_use]
    pub fn of(&self, rarity: Rarity) -> f64 {
        match rarity {
            Rarity::Five => self.five,
            Rarity::Four => self.four,
            Rarity::Three => self.three(),
        }
    }
}

/// Soft-pity ramped odds, ignoring hard pity.
fn ramped_odds(pity4: u32, pity5: u32, rates: &BannerRates) -> RarityOdds {
    let mut five = rates.base.five;
    let mut four = rates.base.four;

    if let Some(soft) = rates.soft_pity {
        let next5 = pity5.saturating_add(1);
        if next5 >= soft.start_5 {
            five = (five + soft.inc_5 * f64::from(next5 - soft.start_5)).min(1.0);
        }
        let next4 = pity4.saturating_add(1);
        if next4 >= soft.start_4 {
            four += soft.inc_4 * f64::from(next4 - soft.start_4);
        }
    }

    // 4★ only gets the probability mass the 5★ ramp left over.
    four = four.min(1.0 - five).max(0.0);
    RarityOdds { five, four }
}

/// Probabilities the resolver will use for the next draw.
///
/// Includes the hard-pity branches, so this is what an odds display should
/// show for a player at the given counters.
#[must_use]
pub fn effective_odds(pity4: u32, pity5: u32, rates: &BannerRates) -> RarityOdds {
    if pity5.saturating_add(1) >= rates.hard_pity.five_at {
        return RarityOdds { five: 1.0, four: 0.0 };
    }
    if pity4.saturating_add(1) >= rates.hard_pity.four_at {
        let five = rates.base.five;
        return RarityOdds { five, four: 1.0 - five };
    }
    ramped_odds(pity4, pity5, rates)
}

/// Resolves the rarity of one draw.
///
/// Consumes no roll when 5★ hard pity applies, one roll otherwise.
pub fn resolve_rarity(
    pity4: u32,
    pity5: u32,
    rates: &BannerRates,
    rolls: &mut dyn RollSource,
) -> Rarity {
    if pity5.saturating_add(1) >= rates.hard_pity.five_at {
        return Rarity::Five;
    }

    if pity4.saturating_add(1) >= rates.hard_pity.four_at {
        return if rolls.roll() < rates.base.five {
            Rarity::Five
        } else {
            Rarity::Four
        };
    }

    let odds = ramped_odds(pity4, pity5, rates);
    let r = rolls.roll();
    if r < odds.five {
        Rarity::Five
    } else if r < odds.five + odds.four {
        Rarity::Four
    } else {
        Rarity::Three
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::RollSource;
    use std::collections::VecDeque;

    /// Replays fixed values; picks always take the first candidate unless
    /// scripted otherwise.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedRolls {
        rolls: VecDeque<f64>,
        picks: VecDeque<usize>,
        pub(crate) rolls_taken: usize,
    }

    impl ScriptedRolls {
        pub(crate) fn new(rolls: &[f64]) -> Self {
            Self {
                rolls: rolls.iter().copied().collect(),
                ..Self::default()
            }
        }

        pub(crate) fn with_picks(mut self, picks: &[usize]) -> Self {
            self.picks = picks.iter().copied().collect();
            self
        }
    }

    impl RollSource for ScriptedRolls {
        fn roll(&mut self) -> f64 {
            self.rolls_taken += 1;
            self.rolls.pop_front().expect("script ran out of rolls")
        }

        fn pick(&mut self, len: usize) -> usize {
            self.picks.pop_front().unwrap_or(0) % len
        }
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::ScriptedRolls;
    use super::*;
    use crate::catalog::{BaseRates, HardPity, SoftPity};

    fn rates() -> BannerRates {
        BannerRates {
            base: BaseRates { five: 0.006, four: 0.051 },
            hard_pity: HardPity { four_at: 10, five_at: 90 },
            soft_pity: Some(SoftPity { start_4: 9, inc_4: 0.5, start_5: 74, inc_5: 0.06 }),
        }
    }

    #[test]
    fn test_five_star_hard_pity_needs_no_roll() {
        let mut rolls = ScriptedRolls::new(&[]);
        for pity5 in [89, 90, 150] {
            for pity4 in [0, 5, 9, 40] {
                assert_eq!(resolve_rarity(pity4, pity5, &rates(), &mut rolls), Rarity::Five);
            }
        }
        assert_eq!(rolls.rolls_taken, 0);
    }

    #[test]
    fn test_four_star_hard_pity_never_yields_three() {
        let mut rolls = SeededRolls::new(7);
        for pity5 in 0..89 {
            for _ in 0..50 {
                let rarity = resolve_rarity(9, pity5, &rates(), &mut rolls);
                assert_ne!(rarity, Rarity::Three, "pity5={pity5}");
            }
        }
    }

    #[test]
    fn test_four_star_hard_pity_uses_base_five_rate() {
        let mut rolls = ScriptedRolls::new(&[0.005, 0.006]);
        assert_eq!(resolve_rarity(9, 0, &rates(), &mut rolls), Rarity::Five);
        assert_eq!(resolve_rarity(9, 0, &rates(), &mut rolls), Rarity::Four);
    }

    #[test]
    fn test_half_roll_at_zero_pity_is_three_star() {
        let no_soft = BannerRates { soft_pity: None, ..rates() };
        let mut rolls = ScriptedRolls::new(&[0.5]);
        assert_eq!(resolve_rarity(0, 0, &no_soft, &mut rolls), Rarity::Three);
        assert_eq!(rolls.rolls_taken, 1);
    }

    #[test]
    fn test_roll_boundaries() {
        let r = rates();
        let mut rolls = ScriptedRolls::new(&[0.0, 0.0059, 0.006, 0.0569, 0.0571, 0.999]);
        let got: Vec<Rarity> = (0..6).map(|_| resolve_rarity(0, 0, &r, &mut rolls)).collect();
        assert_eq!(
            got,
            vec![Rarity::Five, Rarity::Five, Rarity::Four, Rarity::Four, Rarity::Three, Rarity::Three]
        );
    }

    #[test]
    fn test_soft_pity_ramp_values() {
        let r = rates();
        // pity5 = 73 means the next draw is #74, the ramp start: no bonus yet.
        assert!((effective_odds(0, 73, &r).five - 0.006).abs() < 1e-12);
        assert!((effective_odds(0, 74, &r).five - 0.066).abs() < 1e-12);
        assert!((effective_odds(0, 88, &r).five - 0.906).abs() < 1e-12);
        assert_eq!(effective_odds(0, 89, &r), RarityOdds { five: 1.0, four: 0.0 });
    }

    #[test]
    fn test_four_star_ramp_is_capped_by_five_star_mass() {
        let r = BannerRates {
            soft_pity: Some(SoftPity { start_4: 1, inc_4: 0.3, start_5: 1, inc_5: 0.3 }),
            hard_pity: HardPity { four_at: 100, five_at: 100 },
            ..rates()
        };
        let odds = effective_odds(5, 3, &r);
        assert!(odds.five <= 1.0);
        assert!(odds.five + odds.four <= 1.0 + 1e-12);
        assert!(odds.three() >= 0.0);
    }

    #[test]
    fn test_soft_pity_is_monotonic_in_trials() {
        let r = rates();
        let trials = 20_000;
        let mut previous = 0.0;
        for pity5 in (60..89).step_by(4) {
            let mut rolls = SeededRolls::new(0xC0FFEE);
            let fives = (0..trials)
                .filter(|_| resolve_rarity(0, pity5, &r, &mut rolls) == Rarity::Five)
                .count();
            let rate = fives as f64 / f64::from(trials);
            assert!(
                rate + 0.01 >= previous,
                "5★ rate dropped at pity5={pity5}: {rate} < {previous}"
            );
            previous = previous.max(rate);
        }
        assert!(previous > 0.5, "late soft pity should dominate, got {previous}");
    }

    #[test]
    fn test_base_rate_statistics() {
        let r = BannerRates { soft_pity: None, ..rates() };
        let mut rolls = SeededRolls::new(42);
        let trials = 200_000u32;
        let mut counts = [0u32; 3];
        for _ in 0..trials {
            match resolve_rarity(0, 0, &r, &mut rolls) {
                Rarity::Five => counts[0] += 1,
                Rarity::Four => counts[1] += 1,
                Rarity::Three => counts[2] += 1,
            }
        }
        let five = f64::from(counts[0]) / f64::from(trials);
        let four = f64::from(counts[1]) / f64::from(trials);
        assert!((five - 0.006).abs() < 0.002, "5★ rate {five}");
        assert!((four - 0.051).abs() < 0.005, "4★ rate {four}");
    }

    #[test]
    fn test_forked_streams_are_independent_and_reproducible() {
        let mut a = SeededRolls::new(1);
        let mut b = SeededRolls::new(1);
        let mut fa = a.fork();
        let mut fb = b.fork();
        assert_eq!(fa.roll().to_bits(), fb.roll().to_bits());
        let mut fa2 = a.fork();
        assert_ne!(fa.roll().to_bits(), fa2.roll().to_bits());
    }
}
