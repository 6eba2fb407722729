//! Price-tick rules.
//!
//! Symbols with an explicit table use the half-open range `[min, max)` that
//! contains the price. Everything else, including prices no range covers,
//! falls back to the global bracket table. The result is always positive.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickRange {
    pub min: f64,
    pub max: f64,
    pub tick: f64,
}

const fn range(min: f64, max: f64, tick: f64) -> TickRange {
    TickRange { min, max, tick }
}

const BTC_TICKS: &[TickRange] = &[
    range(0.0, 2_000_000.0, 1_000.0),
    range(2_000_000.0, 10_000_000.0, 5_000.0),
    range(10_000_000.0, f64::INFINITY, 10_000.0),
];

const ETH_TICKS: &[TickRange] = &[
    range(0.0, 100_000.0, 100.0),
    range(100_000.0, 500_000.0, 500.0),
    range(500_000.0, f64::INFINITY, 1_000.0),
];

const DOGE_TICKS: &[TickRange] = &[range(0.0, f64::INFINITY, 1.0)];

/// Explicit table for `symbol`, if any.
pub fn tick_table(symbol: &str) -> Option<&'static [TickRange]> {
    match symbol.to_ascii_uppercase().as_str() {
        "BTC" => Some(BTC_TICKS),
        "ETH" => Some(ETH_TICKS),
        "DOGE" => Some(DOGE_TICKS),
        _ => None,
    }
}

/// Default tick by KRW price bracket.
pub fn global_tick_size(price: f64) -> f64 {
    if price >= 2_000_000.0 {
        1_000.0
    } else if price >= 1_000_000.0 {
        500.0
    } else if price >= 500_000.0 {
        100.0
    } else if price >= 100_000.0 {
        50.0
    } else if price >= 10_000.0 {
        10.0
    } else if price >= 100.0 {
        1.0
    } else if price >= 10.0 {
        0.01
    } else {
        0.001
    }
}

pub fn resolve_tick_size(symbol: &str, price: f64) -> f64 {
    tick_table(symbol)
        .and_then(|table| {
            table
                .iter()
                .find(|r| r.min <= price && price < r.max)
                .map(|r| r.tick)
        })
        .unwrap_or_else(|| global_tick_size(price))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_symbols_use_containing_range() {
        for (symbol, table) in [("BTC", BTC_TICKS), ("ETH", ETH_TICKS), ("DOGE", DOGE_TICKS)] {
            for price in [0.0, 1.0, 99_999.0, 100_000.0, 1_999_999.0, 2_000_000.0, 9_999_999.0, 10_000_000.0, 1e12] {
                let tick = resolve_tick_size(symbol, price);
                assert!(
                    table.iter().any(|r| r.tick == tick && r.min <= price && price < r.max),
                    "{} @ {} -> {}",
                    symbol,
                    price,
                    tick
                );
            }
        }
    }

    #[test]
    fn test_range_boundaries_are_half_open() {
        assert_eq!(resolve_tick_size("BTC", 1_999_999.0), 1_000.0);
        assert_eq!(resolve_tick_size("BTC", 2_000_000.0), 5_000.0);
        assert_eq!(resolve_tick_size("btc", 163_800_000.0), 10_000.0);
        assert_eq!(resolve_tick_size("ETH", 100_000.0), 500.0);
    }

    #[test]
    fn test_unconfigured_symbols_use_global_brackets() {
        let cases = [
            (3_000_000.0, 1_000.0),
            (1_500_000.0, 500.0),
            (600_000.0, 100.0),
            (150_000.0, 50.0),
            (50_000.0, 10.0),
            (4_376.0, 1.0),
            (150.0, 1.0),
            (50.0, 0.01),
            (0.5, 0.001),
        ];
        for (price, expected) in cases {
            assert_eq!(resolve_tick_size("XRP", price), expected, "price {}", price);
        }
    }

    #[test]
    fn test_never_zero_or_negative() {
        for symbol in ["BTC", "ETH", "DOGE", "ANY"] {
            for price in [-1.0, f64::NAN, 0.0, 1e-9, f64::INFINITY] {
                let tick = resolve_tick_size(symbol, price);
                assert!(tick > 0.0, "{} @ {} -> {}", symbol, price, tick);
            }
        }
    }
}
