//! Symbol normalization: spot <-> futures mapping (spec.md §6), and the base-token
//! comparison used by the pyramiding guard (I7) and the auction's per-symbol cap.

/// Futures symbol prefixes that all denote "this venue's raw futures naming", in the
/// preference order spec.md §6 specifies (`PF_` before `PI_` before `FI_`).
const FUTURES_PREFIXES: &[&str] = &["PF_", "PI_", "FI_"];

/// BTC on spot maps to XBT on futures where the venue uses that aliasing.
fn alias_base_for_futures(base: &str) -> &str {
    if base.eq_ignore_ascii_case("BTC") {
        "XBT"
    } else {
        base
    }
}

fn unalias_base_from_futures(base: &str) -> String {
    if base.eq_ignore_ascii_case("XBT") {
        "BTC".to_string()
    } else {
        base.to_string()
    }
}

/// Normalizes any of the known futures symbol spellings (`PF_XBTUSD`, `PI_XBTUSD`,
/// CCXT `BTC/USD:USD`, ...) down to a canonical base token for comparison purposes,
/// e.g. `PF_XBTUSD` and `BTC/USD:USD` both normalize to `"BTC"`.
pub fn normalized_base(symbol: &str) -> String {
    if let Some(rest) = symbol.strip_suffix("/USD:USD") {
        return unalias_base_from_futures(rest);
    }
    for prefix in FUTURES_PREFIXES {
        if let Some(rest) = symbol.strip_prefix(prefix) {
            let base = rest.strip_suffix("USD").unwrap_or(rest);
            return unalias_base_from_futures(base);
        }
    }
    if let Some((base, _quote)) = symbol.split_once('/') {
        return unalias_base_from_futures(base);
    }
    symbol.to_string()
}

/// Two symbols are "the same instrument" for pyramiding / cap purposes iff their
/// normalized bases match (spec.md I7, §4.4 per-symbol cap normalization).
pub fn same_base(a: &str, b: &str) -> bool {
    normalized_base(a).eq_ignore_ascii_case(&normalized_base(b))
}

/// Build the CCXT unified futures form, e.g. `BTC/USD:USD`.
pub fn ccxt_futures_form(base: &str, quote: &str) -> String {
    format!("{base}/{quote}:{quote}")
}

/// Resolve the futures symbol to use for a given spot base, per the discovery order in
/// spec.md §6: discovery override (if present in tickers) -> CCXT unified form (if in
/// tickers) -> PF_ -> PI_ -> FI_.
pub fn resolve_futures_symbol(
    spot_base: &str,
    quote: &str,
    discovery_override: Option<&str>,
    available_tickers: &[String],
) -> String {
    if let Some(over) = discovery_override {
        if available_tickers.iter().any(|t| t == over) {
            return over.to_string();
        }
    }
    let ccxt = ccxt_futures_form(spot_base, quote);
    if available_tickers.iter().any(|t| t == &ccxt) {
        return ccxt;
    }
    let futures_base = alias_base_for_futures(spot_base);
    format!("PF_{futures_base}{quote}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_pf_prefix_with_xbt_alias() {
        assert_eq!(normalized_base("PF_XBTUSD"), "BTC");
    }

    #[test]
    fn normalizes_ccxt_form() {
        assert_eq!(normalized_base("BTC/USD:USD"), "BTC");
    }

    #[test]
    fn pf_and_ccxt_are_same_base() {
        assert!(same_base("PF_XBTUSD", "BTC/USD:USD"));
    }

    #[test]
    fn pf_rose_and_ccxt_rose_are_same_base() {
        assert!(same_base("PF_ROSEUSD", "ROSE/USD:USD"));
    }

    #[test]
    fn different_bases_are_not_equal() {
        assert!(!same_base("PF_ETHUSD", "BTC/USD:USD"));
    }

    #[test]
    fn resolve_prefers_discovery_override_when_present() {
        let tickers = vec!["PF_XBTUSD".to_string(), "BTC/USD:USD".to_string()];
        let resolved = resolve_futures_symbol("BTC", "USD", Some("PI_XBTUSD"), &[
            "PI_XBTUSD".to_string(),
        ]);
        assert_eq!(resolved, "PI_XBTUSD");
        // Override absent from tickers falls through to CCXT form.
        let resolved2 = resolve_futures_symbol("BTC", "USD", Some("NOT_LISTED"), &tickers);
        assert_eq!(resolved2, "BTC/USD:USD");
    }

    #[test]
    fn resolve_falls_back_to_pf_prefix() {
        let resolved = resolve_futures_symbol("ROSE", "USD", None, &[]);
        assert_eq!(resolved, "PF_ROSEUSD");
    }
}
