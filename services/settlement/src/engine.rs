//! Settlement engine core
//!
//! Orchestrates one match settlement end to end: validation, trend,
//! price-improvement release, fee assessment, atomic ledger transfers,
//! order mutation, durable trade record, and notification.
//!
//! Locking protocol: both orders are locked in canonical id order, then
//! every involved account in canonical key order, each with a bounded wait.
//! Everything between validation and commit happens under those locks, so
//! at most one settlement is in flight per order and per account. All
//! fallible steps run against a working copy of the accounts; the first
//! write anyone else can observe happens only once nothing can fail.

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use types::account::AccountKey;
use types::errors::LedgerError;
use types::ids::{MarketId, MemberId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderState, Side};
use types::trade::Trade;

use crate::config::SettlementConfig;
use crate::error::{MatchViolation, SettlementError};
use crate::events::{TradeExecutedEvent, TradeNotifier};
use crate::fees::FeePolicy;
use crate::journal::{JournalError, TradeJournal};
use crate::ledger::{guard, Ledger, LedgerTx};
use crate::market::MarketState;

/// A candidate match handed over by the order-book matcher. Transient.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRequest {
    pub market_id: MarketId,
    pub ask_order_id: OrderId,
    pub bid_order_id: OrderId,
    /// Strike price agreed by the matcher.
    pub price: Price,
    /// Matched volume in base-currency units.
    pub volume: Quantity,
    /// Matched funds in quote-currency units (price × volume).
    pub funds: Decimal,
}

/// The trade settlement engine.
///
/// Owns the ledger, the order and market registries, the trade store, an
/// optional durable journal, and the notifier. Shared across workers via
/// `Arc`; all methods take `&self`.
pub struct SettlementEngine {
    config: SettlementConfig,
    fees: FeePolicy,
    ledger: Ledger,
    orders: DashMap<OrderId, Arc<Mutex<Order>>>,
    markets: DashMap<MarketId, Arc<Mutex<MarketState>>>,
    trades: RwLock<Vec<Trade>>,
    journal: Option<Mutex<TradeJournal>>,
    notifier: Box<dyn TradeNotifier>,
}

impl SettlementEngine {
    pub fn new(config: SettlementConfig, notifier: Box<dyn TradeNotifier>) -> Self {
        let fees = FeePolicy::from_config(&config);
        Self {
            config,
            fees,
            ledger: Ledger::new(),
            orders: DashMap::new(),
            markets: DashMap::new(),
            trades: RwLock::new(Vec::new()),
            journal: None,
            notifier,
        }
    }

    /// Attach a durable trade journal, replaying any trades already on
    /// disk into the store and each market's last price.
    pub fn with_journal(mut self, path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let (journal, recovered) = TradeJournal::open(path)?;
        for trade in &recovered {
            self.add_market(trade.market_id.clone());
            if let Some(handle) = self.market_handle(&trade.market_id) {
                guard(&handle).record(trade.price);
            }
        }
        if !recovered.is_empty() {
            info!(trades = recovered.len(), "recovered trade journal");
        }
        *self.trades_mut() = recovered;
        self.journal = Some(Mutex::new(journal));
        Ok(self)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Register a market. Idempotent.
    pub fn add_market(&self, market_id: MarketId) {
        let state = MarketState::new(market_id.clone());
        self.markets
            .entry(market_id)
            .or_insert_with(|| Arc::new(Mutex::new(state)));
    }

    /// Hand over a resting order. The order must already be open with its
    /// reservation locked in the ledger.
    pub fn submit_order(&self, order: Order) {
        self.orders.insert(order.id, Arc::new(Mutex::new(order)));
    }

    /// Point-in-time snapshot of one order.
    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        self.orders
            .get(&order_id)
            .map(|entry| guard(entry.value()).clone())
    }

    /// Price of the market's most recent settled trade.
    pub fn market_last_price(&self, market_id: &MarketId) -> Option<Price> {
        self.market_handle(market_id)
            .and_then(|handle| guard(&handle).last_price)
    }

    /// All settled trades, oldest first.
    pub fn trades(&self) -> Vec<Trade> {
        self.trades
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn trade_count(&self) -> usize {
        self.trades
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Settle one candidate match.
    ///
    /// On success the trade is durable, both orders and all involved
    /// accounts are updated, and the event is published. On failure nothing
    /// is changed anywhere.
    pub fn settle(&self, req: &MatchRequest) -> Result<Trade, SettlementError> {
        debug!(
            market = %req.market_id,
            ask = %req.ask_order_id,
            bid = %req.bid_order_id,
            price = %req.price,
            volume = %req.volume,
            "settling match"
        );
        match self.execute(req) {
            Ok(trade) => {
                info!(
                    trade_id = %trade.id,
                    market = %trade.market_id,
                    price = %trade.price,
                    volume = %trade.volume,
                    trend = ?trade.trend,
                    "trade settled"
                );
                Ok(trade)
            }
            Err(err) => {
                warn!(
                    market = %req.market_id,
                    ask = %req.ask_order_id,
                    bid = %req.bid_order_id,
                    error = %err,
                    "settlement aborted"
                );
                Err(err)
            }
        }
    }

    fn execute(&self, req: &MatchRequest) -> Result<Trade, SettlementError> {
        let deadline = Instant::now() + self.config.lock_timeout;
        let timeout = self.config.lock_timeout;
        let tolerance = self.config.tolerance;

        if req.ask_order_id == req.bid_order_id {
            return Err(MatchViolation::IdenticalOrders {
                order_id: req.ask_order_id,
            }
            .into());
        }

        let market = self
            .market_handle(&req.market_id)
            .ok_or_else(|| MatchViolation::UnknownMarket {
                market_id: req.market_id.clone(),
            })?;

        let ask_handle = self.order_handle(req.ask_order_id)?;
        let bid_handle = self.order_handle(req.bid_order_id)?;

        // Exclusive pair lock, canonical id order.
        let ask_first = req.ask_order_id <= req.bid_order_id;
        let (first, second) = if ask_first {
            (&ask_handle, &bid_handle)
        } else {
            (&bid_handle, &ask_handle)
        };
        let first_guard = acquire(first, deadline, timeout, "order")?;
        let second_guard = acquire(second, deadline, timeout, "order")?;
        let (mut ask, mut bid) = if ask_first {
            (first_guard, second_guard)
        } else {
            (second_guard, first_guard)
        };

        validate(req, &ask, &bid, tolerance)?;

        let trend = acquire(&market, deadline, timeout, "market")?.trend_for(req.price);

        let base = req.market_id.base();
        let quote = req.market_id.quote();
        let volume = req.volume.as_decimal();
        let funds = req.funds;

        let ask_base = AccountKey::new(ask.member_id, base.clone());
        let ask_quote = AccountKey::new(ask.member_id, quote.clone());
        let bid_quote = AccountKey::new(bid.member_id, quote.clone());
        let bid_base = AccountKey::new(bid.member_id, base.clone());

        let ask_utility = self.utility_key(&ask);
        let bid_utility = self.utility_key(&bid);

        let mut keys = vec![
            ask_base.clone(),
            ask_quote.clone(),
            bid_quote.clone(),
            bid_base.clone(),
        ];
        keys.extend(ask_utility.clone());
        keys.extend(bid_utility.clone());
        keys.sort();
        keys.dedup();

        // Exclusive account locks, canonical key order.
        let mut handles = Vec::with_capacity(keys.len());
        for key in &keys {
            let handle =
                self.ledger
                    .handle(key)
                    .ok_or_else(|| MatchViolation::UnknownAccount {
                        member_id: key.member_id,
                        currency: key.currency.clone(),
                    })?;
            handles.push(handle);
        }
        let mut guards: Vec<MutexGuard<'_, _>> = Vec::with_capacity(handles.len());
        for handle in &handles {
            guards.push(acquire(handle, deadline, timeout, "account")?);
        }

        let mut tx = LedgerTx::begin(&guards);

        let ask_fees = self.fees.assess(
            &ask,
            &req.market_id,
            funds,
            quote,
            ask_utility.as_ref().and_then(|key| tx.balance(key)),
        );
        let bid_fees = self.fees.assess(
            &bid,
            &req.market_id,
            volume,
            base,
            bid_utility.as_ref().and_then(|key| tx.balance(key)),
        );

        // The bid reserved this increment at its own price; everything the
        // strike did not consume is released back to its balance.
        let bid_release = bid.reservation_for(req.volume, funds) - funds;

        tx.debit_locked(&ask_base, volume)
            .map_err(|source| ledger_leg(Side::ASK, ask.member_id, source))?;
        tx.debit_locked(&bid_quote, funds)
            .map_err(|source| ledger_leg(Side::BID, bid.member_id, source))?;
        if bid_release > Decimal::ZERO {
            tx.unlock(&bid_quote, bid_release)
                .map_err(|source| ledger_leg(Side::BID, bid.member_id, source))?;
        }
        tx.credit(&ask_quote, ask_fees.net_received);
        tx.credit(&bid_base, bid_fees.net_received);

        // Utility fees come out of the elected account's available balance.
        if let (true, Some(key)) = (ask_fees.paid_with_utility, ask_utility.as_ref()) {
            tx.lock(key, ask_fees.fee_amount)
                .and_then(|_| tx.debit_locked(key, ask_fees.fee_amount))
                .map_err(|source| ledger_leg(Side::ASK, ask.member_id, source))?;
        }
        if let (true, Some(key)) = (bid_fees.paid_with_utility, bid_utility.as_ref()) {
            tx.lock(key, bid_fees.fee_amount)
                .and_then(|_| tx.debit_locked(key, bid_fees.fee_amount))
                .map_err(|source| ledger_leg(Side::BID, bid.member_id, source))?;
        }

        let trade = Trade::new(
            req.market_id.clone(),
            req.ask_order_id,
            req.bid_order_id,
            req.price,
            req.volume,
            funds,
            trend,
            Utc::now(),
        );

        // Durable before anything is committed; the journal append is the
        // last step that can fail.
        if let Some(journal) = &self.journal {
            guard(journal).append(&trade)?;
        }

        tx.commit(&mut guards);
        let now = trade.created_at;
        ask.fill(req.volume, volume, tolerance, now);
        bid.fill(req.volume, funds, tolerance, now);

        guard(&market).record(req.price);
        self.trades_mut().push(trade.clone());

        self.notifier.publish(&TradeExecutedEvent::from_trade(&trade));
        Ok(trade)
    }

    fn trades_mut(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Trade>> {
        self.trades.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn market_handle(&self, market_id: &MarketId) -> Option<Arc<Mutex<MarketState>>> {
        self.markets
            .get(market_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn order_handle(&self, order_id: OrderId) -> Result<Arc<Mutex<Order>>, SettlementError> {
        self.orders
            .get(&order_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MatchViolation::UnknownOrder { order_id }.into())
    }

    /// Key of the order's elected utility account, when the election is
    /// eligible and the account exists. A missing account is not an error;
    /// the side falls back to the in-kind fee.
    fn utility_key(&self, order: &Order) -> Option<AccountKey> {
        if !order.utility_fee_elected(&order.market_id) {
            return None;
        }
        let currency = order.fee_currency.clone()?;
        let key = AccountKey::new(order.member_id, currency);
        self.ledger.contains(&key).then_some(key)
    }
}

fn ledger_leg(side: Side, member_id: MemberId, source: LedgerError) -> SettlementError {
    SettlementError::Ledger {
        side,
        member_id,
        source,
    }
}

/// Bounded-wait exclusive acquisition. Contention past the deadline is
/// surfaced as a retryable error rather than blocking indefinitely.
fn acquire<'a, T>(
    mutex: &'a Mutex<T>,
    deadline: Instant,
    timeout: Duration,
    resource: &str,
) -> Result<MutexGuard<'a, T>, SettlementError> {
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(SettlementError::ContentionTimeout {
                        resource: resource.to_string(),
                        waited_ms: timeout.as_millis() as u64,
                    });
                }
                std::thread::sleep(Duration::from_micros(50));
            }
        }
    }
}

fn validate(
    req: &MatchRequest,
    ask: &Order,
    bid: &Order,
    tolerance: Decimal,
) -> Result<(), MatchViolation> {
    for order in [ask, bid] {
        if order.market_id != req.market_id {
            return Err(MatchViolation::ForeignOrder {
                order_id: order.id,
                expected: req.market_id.clone(),
                actual: order.market_id.clone(),
            });
        }
    }
    if ask.side != Side::ASK {
        return Err(MatchViolation::SideMismatch {
            order_id: ask.id,
            expected: Side::ASK,
            actual: ask.side,
        });
    }
    if bid.side != Side::BID {
        return Err(MatchViolation::SideMismatch {
            order_id: bid.id,
            expected: Side::BID,
            actual: bid.side,
        });
    }
    for order in [ask, bid] {
        if order.state != OrderState::OPEN {
            return Err(MatchViolation::OrderNotOpen {
                order_id: order.id,
                state: order.state,
            });
        }
    }
    if req.volume.as_decimal() <= Decimal::ZERO {
        return Err(MatchViolation::NonPositiveVolume);
    }
    if let (Some(ask_price), Some(bid_price)) = (ask.price, bid.price) {
        if bid_price < ask_price {
            return Err(MatchViolation::PriceNotCrossed {
                ask_price,
                bid_price,
            });
        }
    }
    for order in [ask, bid] {
        if req.volume.as_decimal() > order.volume.as_decimal() + tolerance {
            return Err(MatchViolation::VolumeExceedsRemaining {
                order_id: order.id,
                remaining: order.volume,
                requested: req.volume,
            });
        }
    }
    let expected = req.price.as_decimal() * req.volume.as_decimal();
    if (req.funds - expected).abs() > tolerance {
        return Err(MatchViolation::FundsMismatch {
            expected,
            actual: req.funds,
        });
    }
    Ok(())
}
