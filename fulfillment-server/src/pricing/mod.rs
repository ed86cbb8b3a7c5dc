//! Pricing table - pure (size, finish) -> price lookup
//!
//! The price of a poster is derived solely from its size and finish.
//! Client-supplied amounts are never accepted anywhere in the system;
//! every code path that needs a price calls [`price_for`] fresh.

use shared::{PosterFinish, PosterSize};

/// Price list in minor currency units (cents)
const PRICES: &[(PosterSize, PosterFinish, i64)] = &[
    (PosterSize::A4, PosterFinish::Matte, 2999),
    (PosterSize::A4, PosterFinish::Glossy, 3499),
    (PosterSize::A3, PosterFinish::Matte, 3999),
    (PosterSize::A3, PosterFinish::Glossy, 4499),
    (PosterSize::A2, PosterFinish::Matte, 5499),
    (PosterSize::A2, PosterFinish::Glossy, 5999),
    (PosterSize::A1, PosterFinish::Matte, 6999),
    (PosterSize::A1, PosterFinish::Glossy, 7499),
];

/// Look up the price for a (size, finish) combination.
///
/// Returns `None` for combinations the shop does not sell; callers must
/// reject the order with a validation error in that case.
pub fn price_for(size: PosterSize, finish: PosterFinish) -> Option<i64> {
    PRICES
        .iter()
        .find(|(s, f, _)| *s == size && *f == finish)
        .map(|(_, _, amount)| *amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_matte_is_2999() {
        assert_eq!(price_for(PosterSize::A4, PosterFinish::Matte), Some(2999));
    }

    #[test]
    fn every_combination_has_a_price() {
        for size in [PosterSize::A4, PosterSize::A3, PosterSize::A2, PosterSize::A1] {
            for finish in [PosterFinish::Matte, PosterFinish::Glossy] {
                assert!(price_for(size, finish).is_some(), "{size}/{finish}");
            }
        }
    }

    #[test]
    fn prices_increase_with_size() {
        let a4 = price_for(PosterSize::A4, PosterFinish::Matte).unwrap();
        let a3 = price_for(PosterSize::A3, PosterFinish::Matte).unwrap();
        let a2 = price_for(PosterSize::A2, PosterFinish::Matte).unwrap();
        let a1 = price_for(PosterSize::A1, PosterFinish::Matte).unwrap();
        assert!(a4 < a3 && a3 < a2 && a2 < a1);
    }
}
