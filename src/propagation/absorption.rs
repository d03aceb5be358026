//! Absorption of the unallocated remainder into fixed pools.

use super::config::PoolShare;
use super::models::{Allocation, Phase, Recipient};
use crate::quantity::Quantity;

/// Split `remainder` across `pools` by percentage.
///
/// Each share is truncated; the leftover dust goes to the first pool so the
/// returned quantities sum to `remainder` exactly. Zero shares are omitted.
pub fn absorb(remainder: Quantity, pools: &[PoolShare]) -> Vec<Allocation> {
    if !remainder.is_positive() || pools.is_empty() {
        return Vec::new();
    }

    let mut shares: Vec<Quantity> = pools.iter().map(|p| remainder.percent(p.percent)).collect();
    let dust = remainder - shares.iter().sum::<Quantity>();
    shares[0] += dust;

    pools
        .iter()
        .zip(shares)
        .filter(|(_, q)| q.is_positive())
        .map(|(pool, quantity)| Allocation {
            recipient: Recipient::Pool(pool.name.clone()),
            quantity,
            phase: Phase::Absorption,
            hop: None,
            weight: pool.percent as f64 / 100.0,
            reason: format!("Remainder absorbed into {}", pool.name),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::PropagationConfig;

    #[test]
    fn test_whole_split() {
        let pools = PropagationConfig::default().pools;
        let out = absorb(Quantity::from_whole(100), &pools);
        let amounts: Vec<_> = out.iter().map(|a| a.quantity).collect();
        assert_eq!(
            amounts,
            vec![
                Quantity::from_whole(40),
                Quantity::from_whole(25),
                Quantity::from_whole(20),
                Quantity::from_whole(15),
            ]
        );
    }

    #[test]
    fn test_dust_goes_to_first_pool() {
        let pools = PropagationConfig::default().pools;
        // 7 units: 40% -> 2, 25% -> 1, 20% -> 1, 15% -> 1, dust 2
        let out = absorb(Quantity::from_units(7), &pools);
        assert_eq!(out[0].quantity, Quantity::from_units(4));
        assert_eq!(
            out.iter().map(|a| a.quantity).sum::<Quantity>(),
            Quantity::from_units(7)
        );
    }

    #[test]
    fn test_single_unit_skips_empty_pools() {
        let pools = PropagationConfig::default().pools;
        let out = absorb(Quantity::from_units(1), &pools);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipient, Recipient::Pool("stability".into()));
    }

    #[test]
    fn test_huge_remainder_splits_without_overflow() {
        let pools = PropagationConfig::default().pools;
        let remainder: Quantity = "1000000000000000000000000000000".parse().unwrap();
        let out = absorb(remainder, &pools);

        assert_eq!(out.len(), 4);
        assert_eq!(out[0].quantity.units(), 40 * 10i128.pow(36));
        assert_eq!(out[3].quantity.units(), 15 * 10i128.pow(36));
        assert_eq!(out.iter().map(|a| a.quantity).sum::<Quantity>(), remainder);
    }

    #[test]
    fn test_nothing_to_absorb() {
        let pools = PropagationConfig::default().pools;
        assert!(absorb(Quantity::ZERO, &pools).is_empty());
    }
}
