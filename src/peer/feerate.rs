// Feerate selection and policy bounds-checking (§4.2, §7). The chain
// watcher hands back sat/kw targets for a handful of named buckets; this
// module picks the right one for a given operation and clamps a
// peer-proposed feerate against the configured [`crate::config::LiquidityPolicy`].

use crate::collaborators::FeerateTargets;
use crate::config::LiquidityPolicy;

/// Converts a sat/kw feerate (the unit every BOLT message uses) to an
/// approximate sat/vbyte rate (the unit [`LiquidityPolicy`] is expressed
/// in): 1 vbyte is 4 weight units, and sat/kw is per 1000 weight units.
pub fn feerate_per_kw_to_vbyte(feerate_per_kw: u32) -> u32 {
    ((feerate_per_kw as u64 * 4) / 1000) as u32
}

pub fn feerate_vbyte_to_per_kw(sat_per_vbyte: u32) -> u32 {
    ((sat_per_vbyte as u64 * 1000) / 4) as u32
}

/// `true` if a peer-proposed feerate for a channel open/splice/pay-to-open
/// falls within the local policy's ceiling (§4.3/§7).
pub fn within_policy(feerate_per_kw: u32, policy: &LiquidityPolicy) -> bool {
    feerate_per_kw_to_vbyte(feerate_per_kw) <= policy.max_fee_rate_sat_per_vbyte
}

/// Picks the feerate for opening a fresh channel or funding a splice: the
/// watcher's `funding` target, but never above what policy allows when we
/// are not the one proposing it (§4.1/§4.3).
pub fn funding_feerate(targets: &FeerateTargets, policy: &LiquidityPolicy) -> u32 {
    let ceiling = feerate_vbyte_to_per_kw(policy.max_fee_rate_sat_per_vbyte);
    targets.funding.min(ceiling)
}

/// Feerate for a mutual close's `closing_signed` negotiation.
pub fn closing_feerate(targets: &FeerateTargets) -> u32 {
    targets.mutual_close
}

/// Feerate for sweeping our own commitment/HTLC outputs after a force
/// close, where speed matters more than minimizing fees.
pub fn force_close_feerate(targets: &FeerateTargets) -> u32 {
    targets.fast
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_round_trip_within_integer_rounding() {
        let vbyte = feerate_per_kw_to_vbyte(2000);
        assert_eq!(vbyte, 8);
        assert_eq!(feerate_vbyte_to_per_kw(vbyte), 2000);
    }

    #[test]
    fn funding_feerate_is_clamped_by_policy() {
        let targets = FeerateTargets { funding: 100_000, mutual_close: 2000, claim_main: 5000, fast: 10_000 };
        let policy = LiquidityPolicy { max_fee_rate_sat_per_vbyte: 50, ..Default::default() };
        let picked = funding_feerate(&targets, &policy);
        assert!(feerate_per_kw_to_vbyte(picked) <= 50);
    }
}
