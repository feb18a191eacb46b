//! Concurrency test
//!
//! Parallel workers settle disjoint order pairs that all share the same two
//! member accounts. Per-order and per-account locking must serialize the
//! conflicting ledger mutations without losing a single transfer.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use settlement::{LogNotifier, MatchRequest, SettlementConfig, SettlementEngine};
use types::ids::{Currency, MarketId, MemberId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderState, Side};

const PAIRS: usize = 100;
const WORKERS: usize = 4;

fn dec(s: &str) -> Decimal {
    Decimal::from_str_exact(s).unwrap()
}

#[test]
fn concurrent_settlements_over_shared_accounts() {
    let market = MarketId::new("BTC/USDT");
    let config = SettlementConfig {
        // Plenty of headroom for account contention across workers.
        lock_timeout: Duration::from_secs(5),
        ..SettlementConfig::default()
    };
    let engine = Arc::new(SettlementEngine::new(config, Box::new(LogNotifier)));
    engine.add_market(market.clone());

    let alice = MemberId::new();
    let bob = MemberId::new();
    for member in [alice, bob] {
        for code in ["BTC", "USDT"] {
            engine
                .ledger()
                .deposit(member, Currency::new(code), Decimal::from(1_000_000));
        }
    }

    let price = Price::from_u64(10);
    let volume = Quantity::from_str("1").unwrap();

    // Alice sells 1 BTC to Bob at 10, a hundred times over.
    let mut requests = Vec::with_capacity(PAIRS);
    for _ in 0..PAIRS {
        engine
            .ledger()
            .lock_funds(alice, Currency::new("BTC"), Decimal::ONE)
            .unwrap();
        let ask = Order::limit(
            alice,
            market.clone(),
            Side::ASK,
            price,
            volume,
            Decimal::ONE,
            Utc::now(),
        );

        engine
            .ledger()
            .lock_funds(bob, Currency::new("USDT"), Decimal::from(10))
            .unwrap();
        let bid = Order::limit(
            bob,
            market.clone(),
            Side::BID,
            price,
            volume,
            Decimal::from(10),
            Utc::now(),
        );

        requests.push(MatchRequest {
            market_id: market.clone(),
            ask_order_id: ask.id,
            bid_order_id: bid.id,
            price,
            volume,
            funds: Decimal::from(10),
        });
        engine.submit_order(ask);
        engine.submit_order(bid);
    }

    let handles: Vec<_> = requests
        .chunks(PAIRS / WORKERS)
        .map(|chunk| {
            let engine = Arc::clone(&engine);
            let chunk = chunk.to_vec();
            thread::spawn(move || {
                for req in &chunk {
                    engine.settle(req).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.trade_count(), PAIRS);

    // Every order done, every reservation fully consumed.
    for req in &requests {
        for id in [req.ask_order_id, req.bid_order_id] {
            let order = engine.order(id).unwrap();
            assert_eq!(order.state, OrderState::DONE);
            assert_eq!(order.trades_count, 1);
        }
    }

    let account = |member, code: &str| engine.ledger().account(member, &Currency::new(code)).unwrap();

    // Alice: 100 BTC sold, 100 × 10 × 0.998 USDT received.
    assert_eq!(account(alice, "BTC").balance, dec("999900"));
    assert_eq!(account(alice, "BTC").locked, Decimal::ZERO);
    assert_eq!(account(alice, "USDT").balance, dec("1000998"));

    // Bob: 1000 USDT spent, 100 × 0.998 BTC received.
    assert_eq!(account(bob, "USDT").balance, dec("999000"));
    assert_eq!(account(bob, "USDT").locked, Decimal::ZERO);
    assert_eq!(account(bob, "BTC").balance, dec("1000099.8"));
}

#[test]
fn markets_settle_independently_in_parallel() {
    let config = SettlementConfig {
        lock_timeout: Duration::from_secs(5),
        ..SettlementConfig::default()
    };
    let engine = Arc::new(SettlementEngine::new(config, Box::new(LogNotifier)));

    let handles: Vec<_> = ["BTC/USDT", "ETH/USDT", "SOL/USDT", "DOGE/USDT"]
        .into_iter()
        .map(|symbol| {
            let engine = Arc::clone(&engine);
            let market = MarketId::new(symbol);
            engine.add_market(market.clone());
            thread::spawn(move || {
                let base = market.base();
                let quote = market.quote();
                let alice = MemberId::new();
                let bob = MemberId::new();
                engine
                    .ledger()
                    .deposit(alice, base.clone(), Decimal::from(1_000));
                engine
                    .ledger()
                    .deposit(bob, quote.clone(), Decimal::from(10_000));

                let price = Price::from_u64(10);
                let volume = Quantity::from_str("1").unwrap();
                for _ in 0..50 {
                    engine
                        .ledger()
                        .lock_funds(alice, base.clone(), Decimal::ONE)
                        .unwrap();
                    let ask = Order::limit(
                        alice,
                        market.clone(),
                        Side::ASK,
                        price,
                        volume,
                        Decimal::ONE,
                        Utc::now(),
                    );
                    engine
                        .ledger()
                        .lock_funds(bob, quote.clone(), Decimal::from(10))
                        .unwrap();
                    let bid = Order::limit(
                        bob,
                        market.clone(),
                        Side::BID,
                        price,
                        volume,
                        Decimal::from(10),
                        Utc::now(),
                    );
                    let req = MatchRequest {
                        market_id: market.clone(),
                        ask_order_id: ask.id,
                        bid_order_id: bid.id,
                        price,
                        volume,
                        funds: Decimal::from(10),
                    };
                    engine.submit_order(ask);
                    engine.submit_order(bid);
                    engine.settle(&req).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.trade_count(), 200);
}
