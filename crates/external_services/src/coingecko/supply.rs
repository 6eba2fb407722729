//! Supply selection and market-cap arithmetic.
//!
//! Priority: circulating, total, max, then a heuristic by symbol or KRW price
//! bracket. A zero, negative or non-finite figure counts as missing.

use super::types::SupplyInfo;
use serde::{Deserialize, Serialize};

/// Which figure the supply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyBasis {
    Circulating,
    Total,
    Max,
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupplyChoice {
    pub supply: f64,
    pub basis: SupplyBasis,
}

/// Known supplies for large coins, used before the price brackets.
const MAJOR_SUPPLIES: &[(&str, f64)] = &[
    ("BTC", 19_500_000.0),
    ("ETH", 120_000_000.0),
    ("XRP", 100_000_000_000.0),
    ("ADA", 35_000_000_000.0),
    ("SOL", 400_000_000.0),
    ("DOGE", 140_000_000_000.0),
    ("MATIC", 9_000_000_000.0),
    ("AVAX", 400_000_000.0),
    ("DOT", 1_000_000_000.0),
    ("LINK", 1_000_000_000.0),
    ("LTC", 70_000_000.0),
    ("BCH", 19_000_000.0),
    ("XLM", 25_000_000_000.0),
    ("EOS", 1_000_000_000.0),
    ("ATOM", 300_000_000.0),
    ("NEAR", 1_000_000_000.0),
    ("ALGO", 7_000_000_000.0),
    ("VET", 70_000_000_000.0),
    ("ICP", 500_000_000.0),
    ("FTM", 3_000_000_000.0),
    ("THETA", 1_000_000_000.0),
    ("HBAR", 50_000_000_000.0),
    ("TRX", 100_000_000_000.0),
    ("FIL", 2_000_000_000.0),
    ("KLAY", 3_000_000_000.0),
    ("WEMIX", 1_000_000_000.0),
    ("QTUM", 100_000_000.0),
    ("ICX", 800_000_000.0),
    ("WAVES", 100_000_000.0),
    ("ZIL", 13_000_000_000.0),
    ("ONE", 12_000_000_000.0),
    ("CELO", 1_000_000_000.0),
];

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Heuristic supply when the provider has nothing.
pub fn estimate_supply(symbol: &str, price_krw: f64) -> f64 {
    let symbol = symbol.to_ascii_uppercase();
    if let Some((_, supply)) = MAJOR_SUPPLIES.iter().find(|(s, _)| *s == symbol) {
        return *supply;
    }

    if price_krw >= 10_000_000.0 {
        10_000_000.0
    } else if price_krw >= 1_000_000.0 {
        100_000_000.0
    } else if price_krw >= 100_000.0 {
        1_000_000_000.0
    } else if price_krw >= 10_000.0 {
        10_000_000_000.0
    } else if price_krw >= 1_000.0 {
        100_000_000_000.0
    } else {
        1_000_000_000_000.0
    }
}

/// Pick the supply for `symbol`. The heuristic runs only if all three figures are missing.
pub fn resolve_supply(symbol: &str, info: Option<&SupplyInfo>, price_krw: f64) -> SupplyChoice {
    if let Some(info) = info {
        let ranked = [
            (info.circulating, SupplyBasis::Circulating),
            (info.total, SupplyBasis::Total),
            (info.max, SupplyBasis::Max),
        ];
        for (value, basis) in ranked {
            if let Some(supply) = usable(value) {
                return SupplyChoice { supply, basis };
            }
        }
    }

    SupplyChoice {
        supply: estimate_supply(symbol, price_krw),
        basis: SupplyBasis::Estimated,
    }
}

pub fn market_cap(price: f64, supply: f64) -> f64 {
    price * supply
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(c: Option<f64>, t: Option<f64>, m: Option<f64>) -> SupplyInfo {
        SupplyInfo {
            circulating: c,
            total: t,
            max: m,
        }
    }

    #[test]
    fn test_priority_order() {
        let all = info(Some(10.0), Some(20.0), Some(30.0));
        assert_eq!(resolve_supply("X", Some(&all), 1.0).basis, SupplyBasis::Circulating);

        let no_circ = info(Some(0.0), Some(20.0), Some(30.0));
        let choice = resolve_supply("X", Some(&no_circ), 1.0);
        assert_eq!(choice.basis, SupplyBasis::Total);
        assert_eq!(choice.supply, 20.0);

        let only_max = info(None, None, Some(30.0));
        assert_eq!(resolve_supply("X", Some(&only_max), 1.0).basis, SupplyBasis::Max);
    }

    #[test]
    fn test_heuristic_only_when_all_missing() {
        let empty = info(None, Some(0.0), None);
        let choice = resolve_supply("NEWCOIN", Some(&empty), 50_000.0);
        assert_eq!(choice.basis, SupplyBasis::Estimated);
        assert_eq!(choice.supply, 10_000_000_000.0);

        assert_eq!(resolve_supply("NEWCOIN", None, 50_000.0).basis, SupplyBasis::Estimated);
    }

    #[test]
    fn test_market_cap_is_price_times_chosen_supply() {
        let cases = [
            (info(Some(5.0), Some(7.0), None), 5.0),
            (info(None, Some(7.0), Some(9.0)), 7.0),
            (info(None, None, Some(9.0)), 9.0),
        ];
        for (supply_info, expected_supply) in cases {
            let choice = resolve_supply("X", Some(&supply_info), 1234.5);
            assert_eq!(market_cap(1234.5, choice.supply), 1234.5 * expected_supply);
        }
    }

    #[test]
    fn test_major_table_beats_brackets() {
        assert_eq!(estimate_supply("btc", 1.0), 19_500_000.0);
        assert_eq!(estimate_supply("ETH", 1e12), 120_000_000.0);
    }

    #[test]
    fn test_price_brackets() {
        assert_eq!(estimate_supply("ZZZ", 20_000_000.0), 10_000_000.0);
        assert_eq!(estimate_supply("ZZZ", 1_000_000.0), 100_000_000.0);
        assert_eq!(estimate_supply("ZZZ", 150_000.0), 1_000_000_000.0);
        assert_eq!(estimate_supply("ZZZ", 1_000.0), 100_000_000_000.0);
        assert_eq!(estimate_supply("ZZZ", 5.0), 1_000_000_000_000.0);
    }
}
