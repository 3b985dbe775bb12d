//! The textual tier ladder and its numeric form, used to average a match's
//! participants into one regional tier figure.

use crate::error::GatherError;

const TIER_LADDER: &[&str] = &[
    "BRONZE V", "BRONZE IV", "BRONZE III", "BRONZE II", "BRONZE I",
    "SILVER V", "SILVER IV", "SILVER III", "SILVER II", "SILVER I",
    "GOLD V", "GOLD IV", "GOLD III", "GOLD II", "GOLD I",
    "PLATINUM V", "PLATINUM IV", "PLATINUM III", "PLATINUM II", "PLATINUM I",
    "DIAMOND V", "DIAMOND IV", "DIAMOND III", "DIAMOND II", "DIAMOND I",
    "MASTER I",
    "CHALLENGER I",
];

/// Placeholder for players without a solo-queue rank; excluded from averages.
pub const UNRANKED: &str = "UNRANKED";

#[derive(Debug, Clone, Copy, Default)]
pub struct Tiers;

impl Tiers {
    pub fn numeric(&self, textual_tier: &str) -> Result<usize, GatherError> {
        TIER_LADDER
            .iter()
            .position(|t| *t == textual_tier)
            .ok_or_else(|| GatherError::Config(format!("unconfigured tier {textual_tier}")))
    }

    pub fn textual(&self, numeric_tier: usize) -> Result<&'static str, GatherError> {
        TIER_LADDER
            .get(numeric_tier)
            .copied()
            .ok_or_else(|| GatherError::Config(format!("unconfigured tier #{numeric_tier}")))
    }

    /// Rounded average over the ranked entries; `UNRANKED` entries are
    /// ignored. Errors when nobody in the input is ranked.
    pub fn average<'a, I>(&self, tiers: I) -> Result<&'static str, GatherError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut sum = 0usize;
        let mut count = 0usize;
        for tier in tiers {
            if tier == UNRANKED {
                continue;
            }
            sum += self.numeric(tier)?;
            count += 1;
        }
        if count == 0 {
            return Err(GatherError::Config(
                "cannot average tiers: all participants unranked".to_string(),
            ));
        }
        let average = (sum as f64 / count as f64).round() as usize;
        self.textual(average)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_is_bijective() {
        let tiers = Tiers;
        for (idx, name) in TIER_LADDER.iter().enumerate() {
            assert_eq!(tiers.numeric(name).unwrap(), idx);
            assert_eq!(tiers.textual(idx).unwrap(), *name);
        }
        assert!(tiers.numeric("WOOD IV").is_err());
        assert!(tiers.textual(TIER_LADDER.len()).is_err());
    }

    #[test]
    fn average_rounds_and_skips_unranked() {
        let tiers = Tiers;
        // GOLD V (10) and PLATINUM V (15) average to 12.5, rounded to GOLD II (13)
        assert_eq!(
            tiers.average(["GOLD V", "PLATINUM V"]).unwrap(),
            "GOLD II"
        );
        assert_eq!(
            tiers.average(["GOLD V", UNRANKED, "GOLD V"]).unwrap(),
            "GOLD V"
        );
        assert!(tiers.average([UNRANKED, UNRANKED]).is_err());
    }
}
