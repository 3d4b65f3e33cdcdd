// =============================================================================
// Market catalogue — symbols offered by the Deriv gateway
// =============================================================================

use serde::{Deserialize, Serialize};

/// Broad grouping used by the market picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    Volatility,
    Forex,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Market {
    pub symbol: &'static str,
    pub name: &'static str,
    pub short_name: &'static str,
    pub kind: MarketKind,
}

const fn volatility(symbol: &'static str, name: &'static str, short_name: &'static str) -> Market {
    Market {
        symbol,
        name,
        short_name,
        kind: MarketKind::Volatility,
    }
}

const fn forex(symbol: &'static str, name: &'static str, short_name: &'static str) -> Market {
    Market {
        symbol,
        name,
        short_name,
        kind: MarketKind::Forex,
    }
}

pub const MARKETS: &[Market] = &[
    volatility("R_10", "Volatility 10 Index", "V10"),
    volatility("R_25", "Volatility 25 Index", "V25"),
    volatility("R_50", "Volatility 50 Index", "V50"),
    volatility("R_75", "Volatility 75 Index", "V75"),
    volatility("R_100", "Volatility 100 Index", "V100"),
    volatility("1HZ10V", "Volatility 10 (1s) Index", "V10 1s"),
    volatility("1HZ25V", "Volatility 25 (1s) Index", "V25 1s"),
    volatility("1HZ50V", "Volatility 50 (1s) Index", "V50 1s"),
    volatility("1HZ75V", "Volatility 75 (1s) Index", "V75 1s"),
    volatility("1HZ100V", "Volatility 100 (1s) Index", "V100 1s"),
    forex("frxXAUUSD", "Gold/USD", "XAU/USD"),
    forex("frxXAGUSD", "Silver/USD", "XAG/USD"),
    forex("frxEURUSD", "EUR/USD", "EUR/USD"),
    forex("frxGBPUSD", "GBP/USD", "GBP/USD"),
    forex("frxUSDJPY", "USD/JPY", "USD/JPY"),
    forex("frxAUDUSD", "AUD/USD", "AUD/USD"),
    forex("frxUSDCAD", "USD/CAD", "USD/CAD"),
    forex("frxUSDCHF", "USD/CHF", "USD/CHF"),
];

/// Look up a catalogue entry by its exact gateway symbol.
pub fn find(symbol: &str) -> Option<&'static Market> {
    MARKETS.iter().find(|m| m.symbol == symbol)
}

pub fn by_kind(kind: MarketKind) -> impl Iterator<Item = &'static Market> {
    MARKETS.iter().filter(move |m| m.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_default_symbol() {
        let m = find("R_25").expect("V25 is catalogued");
        assert_eq!(m.short_name, "V25");
        assert_eq!(m.kind, MarketKind::Volatility);
    }

    #[test]
    fn unknown_symbol_is_none() {
        assert!(find("BTCUSDT").is_none());
    }

    #[test]
    fn kind_filter_partitions_catalogue() {
        let vol = by_kind(MarketKind::Volatility).count();
        let fx = by_kind(MarketKind::Forex).count();
        assert_eq!(vol, 10);
        assert_eq!(fx, 8);
        assert_eq!(vol + fx, MARKETS.len());
    }
}
