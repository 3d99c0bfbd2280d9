use api_client::{WireCatalogEntry, WireFilterRule, parse_element};
use core_types::{CoreError, FilterRule, IntervalCode};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Symbol wildcard: the rule matches every symbol of its exchange.
pub const ALL_SYMBOLS: &str = "ALL";

// Filter editor defaults and lower bounds.
pub const DEFAULT_DELTA: f64 = 5.0;
pub const DEFAULT_VOLUME: f64 = 1000.0;
pub const MIN_DELTA: f64 = 2.0;
pub const MIN_VOLUME: f64 = 500.0;

type Symbols = BTreeMap<String, BTreeSet<IntervalCode>>;

/// The exchange -> symbol -> interval universe advertised by the server.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Catalog {
    exchanges: BTreeMap<String, Symbols>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot with the `KLines` array of a catalog response.
    ///
    /// Duplicate triples merge. Elements that do not parse, or whose interval
    /// is unknown, are skipped. Returns the number of skipped elements.
    pub fn apply_catalog(&mut self, wire: &[Value]) -> usize {
        self.exchanges.clear();
        let mut skipped = 0;

        for value in wire {
            let entry: WireCatalogEntry = match parse_element(value) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!(error = %e, "Malformed catalog entry; skipping.");
                    skipped += 1;
                    continue;
                }
            };
            let interval = IntervalCode::parse(&entry.interval);
            if !interval.is_known() || entry.stock_exchange.is_empty() || entry.money.is_empty() {
                tracing::warn!(
                    exchange = %entry.stock_exchange,
                    symbol = %entry.money,
                    interval = %entry.interval,
                    "Unusable catalog entry; skipping."
                );
                skipped += 1;
                continue;
            }
            self.insert(&entry.stock_exchange, &entry.money, interval);
        }

        tracing::info!(
            exchanges = self.exchange_count(),
            symbols = self.symbol_count(),
            skipped,
            "Catalog updated."
        );
        skipped
    }

    /// Adds one triple. Returns false if it was already present.
    pub fn insert(&mut self, exchange: &str, symbol: &str, interval: IntervalCode) -> bool {
        self.exchanges
            .entry(exchange.to_string())
            .or_default()
            .entry(symbol.to_string())
            .or_default()
            .insert(interval)
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &str> {
        self.exchanges.keys().map(String::as_str)
    }

    /// Symbols of `exchange`, in order. Empty for an unknown exchange.
    pub fn symbols(&self, exchange: &str) -> Vec<&str> {
        self.exchanges
            .get(exchange)
            .map(|symbols| symbols.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Intervals available for one symbol. For [`ALL_SYMBOLS`] this is the
    /// union over the exchange.
    pub fn intervals(&self, exchange: &str, symbol: &str) -> BTreeSet<IntervalCode> {
        let Some(symbols) = self.exchanges.get(exchange) else {
            return BTreeSet::new();
        };
        if symbol == ALL_SYMBOLS {
            return symbols.values().flatten().copied().collect();
        }
        symbols.get(symbol).cloned().unwrap_or_default()
    }

    pub fn contains(&self, exchange: &str, symbol: &str, interval: IntervalCode) -> bool {
        self.exchanges
            .get(exchange)
            .and_then(|symbols| symbols.get(symbol))
            .is_some_and(|intervals| intervals.contains(&interval))
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.len()
    }

    /// Distinct (exchange, symbol) pairs.
    pub fn symbol_count(&self) -> usize {
        self.exchanges.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// The row a new filter rule starts from, or `None` before the first
    /// catalog fetch.
    pub fn default_rule(&self) -> Option<FilterRule> {
        let exchange = self.exchanges.keys().next()?;
        Some(FilterRule {
            exchange: exchange.clone(),
            symbol: ALL_SYMBOLS.to_string(),
            interval: IntervalCode::Min1,
            min_delta_percent: DEFAULT_DELTA,
            min_volume: DEFAULT_VOLUME,
        })
    }

    /// Fits a rule to what the catalog offers.
    ///
    /// An unknown exchange moves to the first one, an unsupported symbol
    /// becomes [`ALL_SYMBOLS`], an unsupported interval becomes `1m`. The
    /// thresholds are raised to their lower bounds. With an empty catalog only
    /// the thresholds change.
    pub fn normalize(&self, rule: &FilterRule) -> FilterRule {
        let mut fitted = rule.clone();
        fitted.min_delta_percent = fitted.min_delta_percent.max(MIN_DELTA);
        fitted.min_volume = fitted.min_volume.max(MIN_VOLUME);

        let Some(first) = self.exchanges.keys().next() else {
            return fitted;
        };
        if !self.exchanges.contains_key(&fitted.exchange) {
            fitted.exchange = first.clone();
        }
        if fitted.symbol != ALL_SYMBOLS
            && !self.symbols(&fitted.exchange).contains(&fitted.symbol.as_str())
        {
            fitted.symbol = ALL_SYMBOLS.to_string();
        }
        if !self
            .intervals(&fitted.exchange, &fitted.symbol)
            .contains(&fitted.interval)
        {
            fitted.interval = IntervalCode::Min1;
        }
        fitted
    }
}

/// The user's filter: the rules the server matches against, plus the rows the
/// filter editor shows.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FilterModel {
    rules: Vec<FilterRule>,
    editor_rows: Vec<FilterRule>,
}

impl FilterModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the rules with the `Filter` array of a login response.
    ///
    /// An unparsable interval string degrades to `Unknown`. Elements that are
    /// not filter objects at all are skipped; the count is returned.
    pub fn apply_server_filter(&mut self, wire: &[Value]) -> usize {
        let mut skipped = 0;
        self.rules = wire
            .iter()
            .filter_map(|value| match parse_element::<WireFilterRule>(value) {
                Ok(rule) => Some(from_wire(rule)),
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed filter rule; skipping.");
                    skipped += 1;
                    None
                }
            })
            .collect();
        tracing::debug!(rules = self.rules.len(), skipped, "Server filter applied.");
        skipped
    }

    /// The wire form of the rules.
    ///
    /// Fails without producing anything when a rule has an `Unknown`
    /// interval, so a partially understood filter is never pushed back.
    pub fn serialize(&self) -> Result<Vec<WireFilterRule>, CoreError> {
        self.rules
            .iter()
            .map(|rule| {
                let interval = rule.interval.as_wire().ok_or_else(|| CoreError::UnknownInterval {
                    exchange: rule.exchange.clone(),
                    symbol: rule.symbol.clone(),
                })?;
                Ok(WireFilterRule {
                    stock_exchange: rule.exchange.clone(),
                    money: rule.symbol.clone(),
                    interval: interval.to_string(),
                    delta: rule.min_delta_percent,
                    volume: rule.min_volume,
                })
            })
            .collect()
    }

    pub fn replace_rules(&mut self, rules: Vec<FilterRule>) {
        self.rules = rules;
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Recomputes the editor rows: every rule fitted to the catalog.
    pub fn rebuild_editor(&mut self, catalog: &Catalog) {
        self.editor_rows = self.rules.iter().map(|rule| catalog.normalize(rule)).collect();
    }

    pub fn editor_rows(&self) -> &[FilterRule] {
        &self.editor_rows
    }
}

fn from_wire(rule: WireFilterRule) -> FilterRule {
    FilterRule {
        exchange: rule.stock_exchange,
        symbol: rule.money,
        interval: IntervalCode::parse(&rule.interval),
        min_delta_percent: rule.delta,
        min_volume: rule.volume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog_wire() -> Vec<Value> {
        vec![
            json!({"StockExchange": "MEXC", "Money": "BTCUSDT", "Interval": "1m"}),
            json!({"StockExchange": "MEXC", "Money": "BTCUSDT", "Interval": "5m"}),
            json!({"StockExchange": "MEXC", "Money": "ETHUSDT", "Interval": "1h"}),
            json!({"StockExchange": "GATE", "Money": "SOLUSDT", "Interval": "15m"}),
        ]
    }

    fn rule(exchange: &str, symbol: &str, interval: IntervalCode) -> FilterRule {
        FilterRule {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            interval,
            min_delta_percent: 3.0,
            min_volume: 800.0,
        }
    }

    #[test]
    fn applying_the_same_catalog_twice_is_idempotent() {
        let mut catalog = Catalog::new();
        catalog.apply_catalog(&catalog_wire());
        let first = catalog.clone();
        catalog.apply_catalog(&catalog_wire());
        assert_eq!(catalog, first);
    }

    #[test]
    fn duplicate_entries_merge_and_unknown_intervals_are_skipped() {
        let mut wire = catalog_wire();
        wire.push(json!({"StockExchange": "MEXC", "Money": "BTCUSDT", "Interval": "1m"}));

        let mut catalog = Catalog::new();
        let skipped = catalog.apply_catalog(&wire);

        // "1h" is not a known code.
        assert_eq!(skipped, 1);
        assert_eq!(catalog.exchanges().collect::<Vec<_>>(), vec!["GATE", "MEXC"]);
        assert_eq!(catalog.symbols("MEXC"), vec!["BTCUSDT"]);
        assert_eq!(catalog.intervals("MEXC", "BTCUSDT").len(), 2);
        assert_eq!(catalog.symbol_count(), 2);
    }

    #[test]
    fn a_new_snapshot_replaces_the_old_one() {
        let mut catalog = Catalog::new();
        catalog.apply_catalog(&catalog_wire());
        catalog.apply_catalog(&[json!({"StockExchange": "BYBIT", "Money": "XRPUSDT", "Interval": "1d"})]);
        assert_eq!(catalog.exchanges().collect::<Vec<_>>(), vec!["BYBIT"]);
        assert!(catalog.contains("BYBIT", "XRPUSDT", IntervalCode::Day1));
    }

    #[test]
    fn default_rule_uses_the_first_exchange() {
        let mut catalog = Catalog::new();
        assert_eq!(catalog.default_rule(), None);

        catalog.apply_catalog(&catalog_wire());
        let row = catalog.default_rule().unwrap();
        assert_eq!(row.exchange, "GATE");
        assert_eq!(row.symbol, ALL_SYMBOLS);
        assert_eq!(row.interval, IntervalCode::Min1);
        assert_eq!(row.min_delta_percent, DEFAULT_DELTA);
        assert_eq!(row.min_volume, DEFAULT_VOLUME);
    }

    #[test]
    fn normalize_fits_rules_to_the_catalog() {
        let mut catalog = Catalog::new();
        catalog.apply_catalog(&catalog_wire());

        let kept = catalog.normalize(&rule("MEXC", "BTCUSDT", IntervalCode::Min5));
        assert_eq!(kept, rule("MEXC", "BTCUSDT", IntervalCode::Min5));

        let symbol = catalog.normalize(&rule("MEXC", "DOGEUSDT", IntervalCode::Min5));
        assert_eq!(symbol.symbol, ALL_SYMBOLS);
        assert_eq!(symbol.interval, IntervalCode::Min5);

        let interval = catalog.normalize(&rule("GATE", "SOLUSDT", IntervalCode::Week1));
        assert_eq!(interval.interval, IntervalCode::Min1);

        let exchange = catalog.normalize(&rule("KRAKEN", "BTCUSDT", IntervalCode::Min15));
        assert_eq!(exchange.exchange, "GATE");
        assert_eq!(exchange.symbol, ALL_SYMBOLS);
        assert_eq!(exchange.interval, IntervalCode::Min15);

        let mut low = rule("MEXC", "ALL", IntervalCode::Min1);
        low.min_delta_percent = 0.5;
        low.min_volume = 10.0;
        let raised = catalog.normalize(&low);
        assert_eq!(raised.min_delta_percent, MIN_DELTA);
        assert_eq!(raised.min_volume, MIN_VOLUME);
    }

    #[test]
    fn server_filter_keeps_unknown_intervals_but_refuses_to_serialize_them() {
        let mut filter = FilterModel::new();
        filter.apply_server_filter(&[
            json!({"StockExchange": "MEXC", "Money": "ALL", "Interval": "5m", "Delta": 4.0, "Volume": 900.0}),
            json!({"StockExchange": "GATE", "Money": "SOLUSDT", "Interval": "2m", "Delta": 3.0, "Volume": 600.0}),
        ]);
        assert_eq!(filter.rules().len(), 2);
        assert_eq!(filter.rules()[1].interval, IntervalCode::Unknown);

        let err = filter.serialize().unwrap_err();
        assert_eq!(
            err,
            CoreError::UnknownInterval {
                exchange: "GATE".to_string(),
                symbol: "SOLUSDT".to_string()
            }
        );
    }

    #[test]
    fn known_rules_serialize_with_canonical_strings() {
        let mut filter = FilterModel::new();
        filter.replace_rules(vec![rule("MEXC", "BTCUSDT", IntervalCode::Hour4)]);
        let wire = filter.serialize().unwrap();
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].interval, "4h");
        assert_eq!(wire[0].money, "BTCUSDT");
        assert_eq!(wire[0].delta, 3.0);
    }

    #[test]
    fn malformed_filter_elements_are_skipped() {
        let mut filter = FilterModel::new();
        let skipped = filter.apply_server_filter(&[json!("garbage"), json!({"StockExchange": "MEXC", "Interval": "1m"})]);
        assert_eq!(skipped, 1);
        assert_eq!(filter.rules().len(), 1);
    }

    #[test]
    fn editor_rows_follow_the_catalog() {
        let mut catalog = Catalog::new();
        catalog.apply_catalog(&catalog_wire());
        let mut filter = FilterModel::new();
        filter.replace_rules(vec![rule("MEXC", "DOGEUSDT", IntervalCode::Min1)]);

        filter.rebuild_editor(&catalog);
        assert_eq!(filter.editor_rows()[0].symbol, ALL_SYMBOLS);
        assert_eq!(filter.rules()[0].symbol, "DOGEUSDT");
    }
}
