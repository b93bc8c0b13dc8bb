//! Per-asset order book and the exact-quantity matcher.
//!
//! Matching is pure and in-memory: the ingest actor is the only writer,
//! queries read immutable snapshots. The commitment scheme binds quantity,
//! so only orders with identical quantities can pair; price-crossing
//! candidates with mismatched quantities are skipped and surfaced as a
//! structured no-match reason.

use std::collections::HashMap;

use crate::order::{Match, PrivateOrder, Side};

#[derive(Clone, Copy, Debug)]
pub struct BookEntry {
    pub quantity: u64,
    pub price: u64,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Default)]
pub struct BookSnapshot {
    pub buys: Vec<BookEntry>,
    pub sells: Vec<BookEntry>,
}

#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub matches: Vec<Match>,
    pub no_match_reason: Option<String>,
}

#[derive(Debug, Default)]
pub struct OrderBook {
    buys: HashMap<String, Vec<PrivateOrder>>,
    sells: HashMap<String, Vec<PrivateOrder>>,
}

fn entry(order: &PrivateOrder) -> BookEntry {
    BookEntry {
        quantity: order.quantity,
        price: order.price,
        timestamp: order.timestamp,
    }
}

fn sort_buys(buys: &mut [PrivateOrder]) {
    buys.sort_by(|a, b| {
        b.price
            .cmp(&a.price)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });
}

fn sort_sells(sells: &mut [PrivateOrder]) {
    sells.sort_by(|a, b| {
        a.price
            .cmp(&b.price)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });
}

impl OrderBook {
    pub fn insert(&mut self, order: PrivateOrder) {
        let side = match order.side {
            Side::Buy => &mut self.buys,
            Side::Sell => &mut self.sells,
        };
        side.entry(order.asset_address.clone()).or_default().push(order);
    }

    /// Total resting orders across all assets.
    pub fn depth(&self) -> usize {
        let buys: usize = self.buys.values().map(Vec::len).sum();
        let sells: usize = self.sells.values().map(Vec::len).sum();
        buys + sells
    }

    /// Drop every resting order whose expiry has passed.
    pub fn sweep_expired(&mut self, now_ms: u64) -> usize {
        let mut removed = 0;
        for side in [&mut self.buys, &mut self.sells] {
            for orders in side.values_mut() {
                let before = orders.len();
                orders.retain(|order| order.expiry > now_ms);
                removed += before - orders.len();
            }
            side.retain(|_, orders| !orders.is_empty());
        }
        removed
    }

    /// One greedy matching pass over a single asset.
    ///
    /// Buys sorted by descending price then ascending timestamp, sells by
    /// ascending price then ascending timestamp. For each buy, the first
    /// unclaimed sell that crosses on price and matches quantity exactly is
    /// claimed; earliest timestamp wins among equal prices.
    pub fn match_asset(&mut self, asset: &str, now_ms: u64) -> MatchOutcome {
        for side in [&mut self.buys, &mut self.sells] {
            if let Some(orders) = side.get_mut(asset) {
                orders.retain(|order| order.expiry > now_ms);
            }
        }
        let buys = self.buys.entry(asset.to_string()).or_default();
        let sells = self.sells.entry(asset.to_string()).or_default();
        sort_buys(buys);
        sort_sells(sells);

        let mut buy_claimed = vec![false; buys.len()];
        let mut sell_claimed = vec![false; sells.len()];
        let mut matches = Vec::new();
        let mut quantity_misses = 0usize;

        for (bi, buy) in buys.iter().enumerate() {
            for (si, sell) in sells.iter().enumerate() {
                if sell_claimed[si] {
                    continue;
                }
                if buy.price < sell.price {
                    // Sells are price-ascending: nothing further crosses.
                    break;
                }
                if buy.quantity != sell.quantity {
                    quantity_misses += 1;
                    continue;
                }
                buy_claimed[bi] = true;
                sell_claimed[si] = true;
                matches.push(Match::pair(buy.clone(), sell.clone()));
                break;
            }
        }

        let mut keep_buy = buy_claimed.iter();
        buys.retain(|_| !*keep_buy.next().unwrap_or(&false));
        let mut keep_sell = sell_claimed.iter();
        sells.retain(|_| !*keep_sell.next().unwrap_or(&false));

        let no_match_reason = if matches.is_empty() && quantity_misses > 0 {
            Some(format!(
                "{quantity_misses} crossing counterparty order(s) differ in quantity; exact-quantity match required"
            ))
        } else {
            None
        };
        MatchOutcome {
            matches,
            no_match_reason,
        }
    }

    /// Priority-ordered copy for queries; never exposes secrets.
    pub fn snapshot(&self, asset: &str) -> BookSnapshot {
        let mut buys: Vec<PrivateOrder> = self.buys.get(asset).cloned().unwrap_or_default();
        let mut sells: Vec<PrivateOrder> = self.sells.get(asset).cloned().unwrap_or_default();
        sort_buys(&mut buys);
        sort_sells(&mut sells);
        BookSnapshot {
            buys: buys.iter().map(entry).collect(),
            sells: sells.iter().map(entry).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{now_ms, ADDRESS_LEN};
    use ark_bn254::Fr;

    const ASSET: &str = "CASSET";

    fn order(side: Side, quantity: u64, price: u64, timestamp: u64) -> PrivateOrder {
        PrivateOrder {
            commitment: Fr::from(timestamp),
            trader: "C".repeat(ADDRESS_LEN),
            asset_address: ASSET.into(),
            symbol: "GOLD".into(),
            side,
            quantity,
            price,
            secret: Fr::from(11u64),
            nonce: Fr::from(13u64),
            timestamp,
            expiry: now_ms() + 60_000,
            whitelist_index: 0,
        }
    }

    #[test]
    fn exact_match_at_equal_prices_empties_book() {
        let mut book = OrderBook::default();
        book.insert(order(Side::Buy, 100, 50, 1));
        book.insert(order(Side::Sell, 100, 50, 2));
        let outcome = book.match_asset(ASSET, now_ms());
        assert_eq!(outcome.matches.len(), 1);
        let matched = &outcome.matches[0];
        assert_eq!(matched.execution_price, 50);
        assert_eq!(matched.execution_quantity, 100);
        let snapshot = book.snapshot(ASSET);
        assert!(snapshot.buys.is_empty());
        assert!(snapshot.sells.is_empty());
    }

    #[test]
    fn crossing_prices_execute_at_midpoint() {
        let mut book = OrderBook::default();
        book.insert(order(Side::Buy, 100, 52, 1));
        book.insert(order(Side::Sell, 100, 48, 2));
        let outcome = book.match_asset(ASSET, now_ms());
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].execution_price, 50);
    }

    #[test]
    fn quantity_mismatch_suppresses_match_with_reason() {
        let mut book = OrderBook::default();
        book.insert(order(Side::Buy, 100, 50, 1));
        book.insert(order(Side::Sell, 90, 50, 2));
        let outcome = book.match_asset(ASSET, now_ms());
        assert!(outcome.matches.is_empty());
        assert!(outcome
            .no_match_reason
            .as_deref()
            .unwrap()
            .contains("exact-quantity"));
        let snapshot = book.snapshot(ASSET);
        assert_eq!(snapshot.buys.len(), 1);
        assert_eq!(snapshot.sells.len(), 1);
    }

    #[test]
    fn better_price_beats_earlier_timestamp() {
        let mut book = OrderBook::default();
        book.insert(order(Side::Sell, 100, 50, 1));
        book.insert(order(Side::Sell, 100, 48, 2));
        book.insert(order(Side::Buy, 100, 55, 3));
        let outcome = book.match_asset(ASSET, now_ms());
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].sell_order.price, 48);
        assert_eq!(outcome.matches[0].sell_order.timestamp, 2);
        // The worse sell stays on the book.
        assert_eq!(book.snapshot(ASSET).sells.len(), 1);
    }

    #[test]
    fn equal_prices_tie_break_on_timestamp() {
        let mut book = OrderBook::default();
        book.insert(order(Side::Sell, 100, 50, 5));
        book.insert(order(Side::Sell, 100, 50, 2));
        book.insert(order(Side::Buy, 100, 50, 7));
        let outcome = book.match_asset(ASSET, now_ms());
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].sell_order.timestamp, 2);
    }

    #[test]
    fn one_order_appears_in_at_most_one_match() {
        let mut book = OrderBook::default();
        book.insert(order(Side::Buy, 100, 50, 1));
        book.insert(order(Side::Buy, 100, 50, 2));
        book.insert(order(Side::Sell, 100, 50, 3));
        let outcome = book.match_asset(ASSET, now_ms());
        assert_eq!(outcome.matches.len(), 1);
        // Earlier buy wins; the later one rests.
        assert_eq!(outcome.matches[0].buy_order.timestamp, 1);
        assert_eq!(book.snapshot(ASSET).buys.len(), 1);
    }

    #[test]
    fn expired_orders_never_match() {
        let mut book = OrderBook::default();
        let mut stale = order(Side::Sell, 100, 50, 1);
        stale.expiry = 1;
        book.insert(stale);
        book.insert(order(Side::Buy, 100, 50, 2));
        let outcome = book.match_asset(ASSET, now_ms());
        assert!(outcome.matches.is_empty());
        assert!(outcome.no_match_reason.is_none());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let mut book = OrderBook::default();
        let mut stale = order(Side::Buy, 100, 50, 1);
        stale.expiry = 1;
        book.insert(stale);
        book.insert(order(Side::Buy, 100, 51, 2));
        assert_eq!(book.sweep_expired(now_ms()), 1);
        assert_eq!(book.depth(), 1);
    }

    #[test]
    fn assets_do_not_cross_match() {
        let mut book = OrderBook::default();
        book.insert(order(Side::Buy, 100, 50, 1));
        let mut other = order(Side::Sell, 100, 50, 2);
        other.asset_address = "COTHER".into();
        book.insert(other);
        let outcome = book.match_asset(ASSET, now_ms());
        assert!(outcome.matches.is_empty());
    }
}
