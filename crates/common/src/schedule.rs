//! # Reward Schedules
//!
//! Tabular reward data, configurable through [`Config`](crate::config::Config):
//!
//! - [`BonusSchedule`]: percentage credited per referral level. The same
//!   table serves the upstream bonus on mined claims and the downstream
//!   team-earnings table.
//! - [`MilestoneLadder`]: age and referral-count brackets with fixed payouts.
//!
//! The default bonus table keeps the 11–14 band at 5%, which is out of
//! line with its neighbours. Override the band in configuration rather
//! than editing the default.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════
// BONUS SCHEDULE
// ════════════════════════════════════════════════════════════════════════════

/// Inclusive level range sharing one percentage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusBand {
    pub from_level: u32,
    pub to_level: u32,
    pub percent: Decimal,
}

impl BonusBand {
    pub fn new(from_level: u32, to_level: u32, percent: Decimal) -> Self {
        Self { from_level, to_level, percent }
    }

    pub fn contains(&self, level: u32) -> bool {
        (self.from_level..=self.to_level).contains(&level)
    }
}

/// Level → percentage lookup. Levels outside every band earn 0%.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusSchedule {
    pub bands: Vec<BonusBand>,
}

impl Default for BonusSchedule {
    fn default() -> Self {
        let pct = |n: i64, scale: u32| Decimal::new(n, scale);
        Self {
            bands: vec![
                BonusBand::new(1, 1, pct(10, 0)),
                BonusBand::new(2, 2, pct(5, 0)),
                BonusBand::new(3, 3, pct(3, 0)),
                BonusBand::new(4, 5, pct(2, 0)),
                BonusBand::new(6, 7, pct(15, 1)),
                BonusBand::new(8, 10, pct(1, 0)),
                BonusBand::new(11, 14, pct(5, 0)),
                BonusBand::new(15, 17, pct(1, 0)),
                BonusBand::new(18, 19, pct(15, 1)),
                BonusBand::new(20, 20, pct(2, 0)),
                BonusBand::new(21, 21, pct(3, 0)),
            ],
        }
    }
}

impl BonusSchedule {
    /// Bonus percentage for `level` (1 = direct referral).
    pub fn percentage(&self, level: u32) -> Decimal {
        self.bands
            .iter()
            .find(|band| band.contains(level))
            .map(|band| band.percent)
            .unwrap_or(Decimal::ZERO)
    }

    /// Check that bands are well-formed and pairwise disjoint.
    pub fn validate(&self) -> Result<(), String> {
        for band in &self.bands {
            if band.from_level == 0 || band.from_level > band.to_level {
                return Err(format!(
                    "bonus band {}-{} is not a valid level range",
                    band.from_level, band.to_level
                ));
            }
            if band.percent < Decimal::ZERO {
                return Err(format!("bonus band {}-{} has a negative percent", band.from_level, band.to_level));
            }
        }
        for (i, a) in self.bands.iter().enumerate() {
            for b in &self.bands[i + 1..] {
                if a.from_level <= b.to_level && b.from_level <= a.to_level {
                    return Err(format!(
                        "bonus bands {}-{} and {}-{} overlap",
                        a.from_level, a.to_level, b.from_level, b.to_level
                    ));
                }
            }
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// MILESTONE LADDER
// ════════════════════════════════════════════════════════════════════════════

/// One rung of the milestone ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneBracket {
    pub min_age_days: i64,
    pub min_direct: u64,
    pub min_indirect: u64,
    pub payout: Decimal,
}

impl MilestoneBracket {
    pub fn new(min_age_days: i64, min_direct: u64, min_indirect: u64, payout: i64) -> Self {
        Self {
            min_age_days,
            min_direct,
            min_indirect,
            payout: Decimal::from(payout),
        }
    }

    pub fn is_met(&self, age_days: i64, direct: u64, indirect: u64) -> bool {
        age_days >= self.min_age_days && direct >= self.min_direct && indirect >= self.min_indirect
    }
}

/// Brackets evaluated from the longest tenure down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneLadder {
    pub brackets: Vec<MilestoneBracket>,
}

impl Default for MilestoneLadder {
    fn default() -> Self {
        Self {
            brackets: vec![
                MilestoneBracket::new(120, 280, 500_000, 510_000),
                MilestoneBracket::new(90, 250, 200_000, 170_000),
                MilestoneBracket::new(60, 220, 100_000, 75_000),
                MilestoneBracket::new(45, 200, 35_000, 15_000),
                MilestoneBracket::new(30, 180, 15_000, 5_000),
                MilestoneBracket::new(20, 150, 5_000, 1_500),
                MilestoneBracket::new(10, 100, 1_500, 500),
            ],
        }
    }
}

impl MilestoneLadder {
    /// The first bracket, by descending minimum age, whose age, direct, and
    /// indirect thresholds are all met.
    pub fn select(&self, age_days: i64, direct: u64, indirect: u64) -> Option<&MilestoneBracket> {
        let mut ordered: Vec<&MilestoneBracket> = self.brackets.iter().collect();
        ordered.sort_by(|a, b| b.min_age_days.cmp(&a.min_age_days));
        ordered
            .into_iter()
            .find(|bracket| bracket.is_met(age_days, direct, indirect))
    }
}
