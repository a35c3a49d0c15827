// ============================================================================
// Order Validator
// Stateless rule checks run before an order reaches the book
// ============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::OrderRequest;
use crate::domain::{AssetCatalog, Order, OrderBook, OrderKind, OrderType, Side, TimeInForce};
use crate::error::{EngineError, RejectCode, Rejection};
use crate::interfaces::{LedgerError, PortfolioLedger, Reservation};
use crate::numeric::{self, NumericError, Price};

/// Which time-in-force values an order type accepts.
///
/// MARKET orders cannot rest, so GTC is refused; stop types wait for a
/// trigger, so IOC/FOK are refused.
pub fn is_time_in_force_legal(kind: OrderKind, time_in_force: TimeInForce) -> bool {
    match kind {
        OrderKind::Limit => true,
        OrderKind::Market => time_in_force != TimeInForce::GoodTillCancel,
        OrderKind::Stop | OrderKind::StopLimit | OrderKind::TrailingStop => {
            time_in_force.can_rest()
        },
    }
}

pub struct OrderValidator {
    assets: Arc<AssetCatalog>,
    ledger: Arc<dyn PortfolioLedger>,
    fee_rate: Decimal,
}

impl OrderValidator {
    pub fn new(assets: Arc<AssetCatalog>, ledger: Arc<dyn PortfolioLedger>) -> Self {
        Self {
            assets,
            ledger,
            fee_rate: Decimal::ZERO,
        }
    }

    /// Builder method: Fee rate added on top of every BUY cost estimate
    pub fn with_fee_rate(mut self, fee_rate: Decimal) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    pub fn assets(&self) -> &Arc<AssetCatalog> {
        &self.assets
    }

    /// Shape checks that need no book and no ledger. On success the request
    /// becomes a PENDING order with its type resolved.
    pub fn prepare(&self, request: &OrderRequest, now: DateTime<Utc>) -> Result<Order, Rejection> {
        let asset = self.assets.get(request.asset_id).ok_or_else(|| {
            Rejection::new(
                RejectCode::UnknownAsset,
                format!("asset {} does not exist", request.asset_id),
            )
        })?;
        if !asset.tradable {
            return Err(Rejection::new(
                RejectCode::AssetNotTradable,
                format!("asset {} is not tradable", asset.symbol),
            ));
        }

        if request.quantity <= Decimal::ZERO {
            return Err(Rejection::new(
                RejectCode::InvalidQuantity,
                format!("quantity must be positive, got {}", request.quantity),
            ));
        }
        if let Some(lot) = asset.lot_size {
            if !numeric::is_multiple_of(request.quantity, lot) {
                return Err(Rejection::new(
                    RejectCode::InvalidLotSize,
                    format!("quantity {} is not a multiple of lot size {lot}", request.quantity),
                ));
            }
        }

        let kind = request.order_type;
        let price = check_price(
            kind.uses_price(),
            request.price,
            asset.tick_size,
            RejectCode::InvalidPrice,
            "price",
        )?;
        let stop_price = check_price(
            kind.uses_stop_price(),
            request.stop_price,
            asset.tick_size,
            RejectCode::InvalidStopPrice,
            "stop price",
        )?;

        let order_type = match (kind, price, stop_price) {
            (OrderKind::Market, None, None) => OrderType::Market,
            (OrderKind::Limit, Some(price), None) => OrderType::Limit { price },
            (OrderKind::Stop, None, Some(stop_price)) => OrderType::Stop { stop_price },
            (OrderKind::StopLimit, Some(price), Some(stop_price)) => {
                OrderType::StopLimit { price, stop_price }
            },
            (OrderKind::TrailingStop, None, Some(stop_price)) => {
                OrderType::TrailingStop { stop_price }
            },
            _ => {
                return Err(Rejection::new(
                    RejectCode::UnexpectedPrice,
                    format!("prices do not match order type {kind}"),
                ))
            },
        };

        if !is_time_in_force_legal(kind, request.time_in_force) {
            return Err(Rejection::new(
                RejectCode::IllegalTimeInForce,
                format!("{} is not allowed for {kind} orders", request.time_in_force),
            ));
        }

        Ok(Order::new(
            request.portfolio_id,
            request.asset_id,
            request.side,
            order_type,
            request.quantity,
            request.time_in_force,
            now,
        ))
    }

    /// Cash check for BUY, holdings check for SELL, against what is left
    /// after the holds of the portfolio's other live orders. Holds nothing.
    ///
    /// Insufficient funds or holdings reject the order itself: the returned
    /// rejection carries the REJECTED record. Ledger outages are errors, not
    /// rejections.
    pub fn check_buying_power(
        &self,
        order: &Order,
        book: &OrderBook,
        last_price: Option<Price>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let requirement = self.requirement(order, book, last_price)?;
        let available = match requirement {
            Reservation::Cash(_) => self.ledger.available_cash(order.portfolio_id),
            Reservation::Holdings { asset, .. } => {
                self.ledger.available_quantity(order.portfolio_id, asset)
            },
        }
        .map_err(|e| ledger_failure(order, e))?;

        if available < requirement.amount() {
            return Err(refusal(
                order,
                requirement,
                LedgerError::Insufficient {
                    required: requirement.amount(),
                    available,
                },
                now,
            ));
        }
        Ok(())
    }

    /// `check_buying_power` that also holds the requirement in the ledger,
    /// atomically, so concurrent orders from one portfolio cannot both
    /// spend the same balance.
    pub fn reserve_buying_power(
        &self,
        order: &Order,
        book: &OrderBook,
        last_price: Option<Price>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let requirement = self.requirement(order, book, last_price)?;
        self.ledger
            .reserve(order.id, order.portfolio_id, requirement)
            .map_err(|err| refusal(order, requirement, err, now))
    }

    /// Reserve for a replacement with the original's hold given back first.
    /// If the replacement does not fit, the original keeps its hold.
    pub fn reserve_replacement(
        &self,
        replacement: &Order,
        original: &Order,
        book: &OrderBook,
        last_price: Option<Price>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let requirement = self.requirement(replacement, book, last_price)?;
        self.ledger
            .release(original.id)
            .map_err(|e| ledger_failure(original, e))?;

        match self
            .ledger
            .reserve(replacement.id, replacement.portfolio_id, requirement)
        {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some(kept) = self.reservation(original)? {
                    self.ledger
                        .hold(original.id, original.portfolio_id, kept)
                        .map_err(|e| ledger_failure(original, e))?;
                }
                Err(refusal(replacement, requirement, err, now))
            },
        }
    }

    /// `prepare` followed by `check_buying_power`
    pub fn validate(
        &self,
        request: &OrderRequest,
        book: &OrderBook,
        last_price: Option<Price>,
        now: DateTime<Utc>,
    ) -> Result<Order, EngineError> {
        let order = self.prepare(request, now)?;
        self.check_buying_power(&order, book, last_price, now)?;
        Ok(order)
    }

    /// Hold a live order keeps: its remaining quantity for a SELL, its
    /// remaining notional at the limit (or stop) price plus fee for a BUY.
    /// `None` once the order can no longer trade from the book.
    pub fn reservation(&self, order: &Order) -> Result<Option<Reservation>, EngineError> {
        if order.is_terminal() || !(order.rests_in_book() || order.is_awaiting_trigger()) {
            return Ok(None);
        }
        let quantity = order.remaining_quantity();
        match (order.side, reserve_price(&order.order_type)) {
            (Side::Sell, _) => Ok(Some(Reservation::Holdings {
                asset: order.asset_id,
                quantity,
            })),
            (Side::Buy, Some(price)) => Ok(Some(Reservation::Cash(
                self.with_fee(numeric::notional(price, quantity)?)?,
            ))),
            (Side::Buy, None) => Ok(None),
        }
    }

    /// What an incoming order needs: holdings for a SELL, the estimated
    /// cost including fee for a BUY.
    ///
    /// MARKET orders walk the asks; quantity the book cannot cover is priced
    /// at the last trade. Stops use their limit price, else the stop price.
    fn requirement(
        &self,
        order: &Order,
        book: &OrderBook,
        last_price: Option<Price>,
    ) -> Result<Reservation, EngineError> {
        let quantity = order.remaining_quantity();
        if order.side == Side::Sell {
            return Ok(Reservation::Holdings {
                asset: order.asset_id,
                quantity,
            });
        }

        let notional = match reserve_price(&order.order_type) {
            Some(price) => numeric::notional(price, quantity)?,
            None => {
                let estimate = book.cost_to_fill(order.side, quantity)?;
                let uncovered = match last_price {
                    Some(last) => numeric::notional(last, estimate.unfilled)?,
                    None => Decimal::ZERO,
                };
                estimate
                    .cost
                    .checked_add(uncovered)
                    .ok_or(NumericError::Overflow)?
            },
        };
        Ok(Reservation::Cash(self.with_fee(notional)?))
    }

    fn with_fee(&self, notional: Decimal) -> Result<Decimal, NumericError> {
        let fee = numeric::notional(notional, self.fee_rate)?;
        notional.checked_add(fee).ok_or(NumericError::Overflow)
    }
}

/// Price a BUY's hold is measured at; `None` for MARKET
fn reserve_price(order_type: &OrderType) -> Option<Price> {
    match *order_type {
        OrderType::Limit { price } | OrderType::StopLimit { price, .. } => Some(price),
        OrderType::Stop { stop_price } | OrderType::TrailingStop { stop_price } => Some(stop_price),
        OrderType::Market => None,
    }
}

fn check_price(
    required: bool,
    supplied: Option<Price>,
    tick_size: Option<Price>,
    code: RejectCode,
    label: &str,
) -> Result<Option<Price>, Rejection> {
    match (required, supplied) {
        (false, None) => Ok(None),
        (false, Some(_)) => Err(Rejection::new(
            RejectCode::UnexpectedPrice,
            format!("{label} is not used by this order type"),
        )),
        (true, None) => Err(Rejection::new(code, format!("{label} is required"))),
        (true, Some(price)) if price <= Decimal::ZERO => Err(Rejection::new(
            code,
            format!("{label} must be positive, got {price}"),
        )),
        (true, Some(price)) => match tick_size {
            Some(tick) if !numeric::is_multiple_of(price, tick) => Err(Rejection::new(
                RejectCode::InvalidTickSize,
                format!("{label} {price} is not a multiple of tick size {tick}"),
            )),
            _ => Ok(Some(price)),
        },
    }
}

fn insufficient(order: &Order, code: RejectCode, message: String, now: DateTime<Utc>) -> EngineError {
    let mut rejected = order.clone();
    match rejected.reject(now) {
        Ok(()) => Rejection::new(code, message).with_order(rejected).into(),
        Err(_) => Rejection::new(code, message).into(),
    }
}

fn refusal(order: &Order, requirement: Reservation, err: LedgerError, now: DateTime<Utc>) -> EngineError {
    match (err, requirement) {
        (LedgerError::Insufficient { required, available }, Reservation::Cash(_)) => insufficient(
            order,
            RejectCode::InsufficientFunds,
            format!("order needs {required}, portfolio has {available}"),
            now,
        ),
        (LedgerError::Insufficient { required, available }, Reservation::Holdings { .. }) => {
            insufficient(
                order,
                RejectCode::InsufficientHoldings,
                format!("order sells {required}, portfolio holds {available}"),
                now,
            )
        },
        (other, _) => ledger_failure(order, other),
    }
}

fn ledger_failure(order: &Order, err: LedgerError) -> EngineError {
    match err {
        LedgerError::UnknownPortfolio(portfolio) => Rejection::new(
            RejectCode::UnknownPortfolio,
            format!("portfolio {portfolio} does not exist for order {}", order.id),
        )
        .into(),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::resting;
    use crate::domain::{Asset, AssetId, OrderStatus, PortfolioId};
    use crate::interfaces::InMemoryLedger;

    fn dec(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn validator() -> (OrderValidator, Arc<InMemoryLedger>) {
        let assets = Arc::new(AssetCatalog::with_assets([
            Asset::new(AssetId(1), "ACME")
                .with_tick_size(Decimal::new(1, 2))
                .with_lot_size(dec(1)),
            Asset::new(AssetId(2), "HALT").suspended(),
        ]));
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.deposit(PortfolioId(1), dec(1_000));
        ledger.credit_position(PortfolioId(1), AssetId(1), dec(10));
        (OrderValidator::new(assets, ledger.clone()), ledger)
    }

    fn code_of(result: Result<Order, Rejection>) -> RejectCode {
        result.unwrap_err().code
    }

    #[test]
    fn test_prepare_resolves_order_type() {
        let (validator, _) = validator();
        let request = OrderRequest::stop_limit(PortfolioId(1), AssetId(1), Side::Sell, dec(5), dec(94), dec(95));

        let order = validator.prepare(&request, Utc::now()).unwrap();
        assert_eq!(
            order.order_type,
            OrderType::StopLimit {
                price: dec(94),
                stop_price: dec(95)
            }
        );
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_asset_checks() {
        let (validator, _) = validator();
        let unknown = OrderRequest::limit(PortfolioId(1), AssetId(9), Side::Buy, dec(1), dec(10));
        let halted = OrderRequest::limit(PortfolioId(1), AssetId(2), Side::Buy, dec(1), dec(10));

        assert_eq!(code_of(validator.prepare(&unknown, Utc::now())), RejectCode::UnknownAsset);
        assert_eq!(code_of(validator.prepare(&halted, Utc::now())), RejectCode::AssetNotTradable);
    }

    #[test]
    fn test_quantity_and_price_checks() {
        let (validator, _) = validator();
        let now = Utc::now();
        let base = OrderRequest::limit(PortfolioId(1), AssetId(1), Side::Buy, dec(1), dec(10));

        let mut zero = base.clone();
        zero.quantity = Decimal::ZERO;
        assert_eq!(code_of(validator.prepare(&zero, now)), RejectCode::InvalidQuantity);

        let mut fractional = base.clone();
        fractional.quantity = Decimal::new(15, 1);
        assert_eq!(code_of(validator.prepare(&fractional, now)), RejectCode::InvalidLotSize);

        let missing = base.clone().with_price(None);
        assert_eq!(code_of(validator.prepare(&missing, now)), RejectCode::InvalidPrice);

        let negative = base.clone().with_price(Some(dec(-1)));
        assert_eq!(code_of(validator.prepare(&negative, now)), RejectCode::InvalidPrice);

        let off_tick = base.clone().with_price(Some(Decimal::new(10005, 3)));
        assert_eq!(code_of(validator.prepare(&off_tick, now)), RejectCode::InvalidTickSize);

        let stray_stop = base.with_stop_price(Some(dec(9)));
        assert_eq!(code_of(validator.prepare(&stray_stop, now)), RejectCode::UnexpectedPrice);

        let market_with_price = OrderRequest::market(PortfolioId(1), AssetId(1), Side::Buy, dec(1))
            .with_price(Some(dec(10)));
        assert_eq!(
            code_of(validator.prepare(&market_with_price, now)),
            RejectCode::UnexpectedPrice
        );

        let stop_without_trigger = OrderRequest::stop(PortfolioId(1), AssetId(1), Side::Sell, dec(1), dec(9))
            .with_stop_price(None);
        assert_eq!(
            code_of(validator.prepare(&stop_without_trigger, now)),
            RejectCode::InvalidStopPrice
        );
    }

    #[test]
    fn test_time_in_force_matrix() {
        assert!(is_time_in_force_legal(OrderKind::Limit, TimeInForce::FillOrKill));
        assert!(is_time_in_force_legal(OrderKind::Market, TimeInForce::Day));
        assert!(!is_time_in_force_legal(OrderKind::Market, TimeInForce::GoodTillCancel));
        assert!(!is_time_in_force_legal(OrderKind::Stop, TimeInForce::ImmediateOrCancel));
        assert!(is_time_in_force_legal(OrderKind::TrailingStop, TimeInForce::Day));

        let (validator, _) = validator();
        let request = OrderRequest::market(PortfolioId(1), AssetId(1), Side::Buy, dec(1))
            .with_time_in_force(TimeInForce::GoodTillCancel);
        assert_eq!(
            code_of(validator.prepare(&request, Utc::now())),
            RejectCode::IllegalTimeInForce
        );
    }

    #[test]
    fn test_insufficient_funds_rejects_the_order() {
        let (validator, _) = validator();
        let book = OrderBook::new(AssetId(1));
        let request = OrderRequest::limit(PortfolioId(1), AssetId(1), Side::Buy, dec(11), dec(100));

        let err = validator
            .validate(&request, &book, None, Utc::now())
            .unwrap_err();
        let rejection = err.rejection().unwrap();
        assert_eq!(rejection.code, RejectCode::InsufficientFunds);
        let record = rejection.order.as_ref().unwrap();
        assert_eq!(record.status(), OrderStatus::Rejected);
        assert!(record.execution_date().is_some());
    }

    #[test]
    fn test_insufficient_holdings() {
        let (validator, _) = validator();
        let book = OrderBook::new(AssetId(1));
        let request = OrderRequest::limit(PortfolioId(1), AssetId(1), Side::Sell, dec(11), dec(100));

        let err = validator
            .validate(&request, &book, None, Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_HOLDINGS");
    }

    #[test]
    fn test_market_buy_cost_walks_the_book() {
        let (validator, _) = validator();
        let mut book = OrderBook::new(AssetId(1));
        let mut ask = resting(Side::Sell, 90, 5, 1);
        ask.portfolio_id = PortfolioId(2);
        book.insert(ask).unwrap();

        // 5 @ 90 from the book + 6 @ 95 last trade = 1020 > 1000
        let request = OrderRequest::market(PortfolioId(1), AssetId(1), Side::Buy, dec(11));
        let err = validator
            .validate(&request, &book, Some(dec(95)), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");

        // 5 @ 90 + 5 @ 95 = 925
        let request = OrderRequest::market(PortfolioId(1), AssetId(1), Side::Buy, dec(10));
        assert!(validator
            .validate(&request, &book, Some(dec(95)), Utc::now())
            .is_ok());
    }

    #[test]
    fn test_unknown_portfolio_and_outage() {
        let (validator, ledger) = validator();
        let book = OrderBook::new(AssetId(1));
        let request = OrderRequest::limit(PortfolioId(7), AssetId(1), Side::Buy, dec(1), dec(1));
        let err = validator
            .validate(&request, &book, None, Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_PORTFOLIO");

        ledger.set_unavailable(Some("down".into()));
        let request = OrderRequest::limit(PortfolioId(1), AssetId(1), Side::Buy, dec(1), dec(1));
        let err = validator
            .validate(&request, &book, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::Ledger(LedgerError::Unavailable(_))));
    }

    #[test]
    fn test_reservations_stack_until_funds_run_out() {
        let (validator, ledger) = validator();
        let book = OrderBook::new(AssetId(1));
        let request = OrderRequest::limit(PortfolioId(1), AssetId(1), Side::Buy, dec(4), dec(100));
        let now = Utc::now();

        let first = validator.prepare(&request, now).unwrap();
        let second = validator.prepare(&request, now).unwrap();
        let third = validator.prepare(&request, now).unwrap();
        validator.reserve_buying_power(&first, &book, None, now).unwrap();
        validator.reserve_buying_power(&second, &book, None, now).unwrap();

        // 1000 cash, 800 already held: a third 400 does not fit
        let err = validator
            .reserve_buying_power(&third, &book, None, now)
            .unwrap_err();
        let rejection = err.rejection().unwrap();
        assert_eq!(rejection.code, RejectCode::InsufficientFunds);
        assert_eq!(rejection.message, "order needs 400, portfolio has 200");
        assert_eq!(ledger.held(third.id), None);

        // the pure check sees the holds too
        assert!(validator.check_buying_power(&third, &book, None, now).is_err());
        ledger.release(first.id).unwrap();
        assert!(validator.check_buying_power(&third, &book, None, now).is_ok());
    }

    #[test]
    fn test_sell_reservations_share_holdings() {
        let (validator, _) = validator();
        let book = OrderBook::new(AssetId(1));
        let now = Utc::now();
        let sell = |qty| {
            let request = OrderRequest::limit(PortfolioId(1), AssetId(1), Side::Sell, dec(qty), dec(100));
            validator.prepare(&request, now).unwrap()
        };

        validator.reserve_buying_power(&sell(6), &book, None, now).unwrap();
        let err = validator
            .reserve_buying_power(&sell(6), &book, None, now)
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_HOLDINGS");
    }

    #[test]
    fn test_replacement_gets_the_original_hold_back() {
        let (validator, ledger) = validator();
        let book = OrderBook::new(AssetId(1));
        let now = Utc::now();
        let original = validator
            .prepare(&OrderRequest::limit(PortfolioId(1), AssetId(1), Side::Buy, dec(8), dec(100)), now)
            .unwrap();
        validator.reserve_buying_power(&original, &book, None, now).unwrap();

        // 900 fits only once the original's 800 is given back
        let bigger = validator
            .prepare(&OrderRequest::limit(PortfolioId(1), AssetId(1), Side::Buy, dec(9), dec(100)), now)
            .unwrap();
        validator
            .reserve_replacement(&bigger, &original, &book, None, now)
            .unwrap();
        assert_eq!(ledger.held(original.id), None);
        assert_eq!(ledger.held(bigger.id), Some(Reservation::Cash(dec(900))));

        // too big: the live order keeps its hold
        let huge = validator
            .prepare(&OrderRequest::limit(PortfolioId(1), AssetId(1), Side::Buy, dec(11), dec(100)), now)
            .unwrap();
        let err = validator
            .reserve_replacement(&huge, &bigger, &book, None, now)
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(ledger.held(bigger.id), Some(Reservation::Cash(dec(900))));
        assert_eq!(ledger.held(huge.id), None);
    }

    #[test]
    fn test_buy_cost_includes_fee() {
        let (validator, _) = validator();
        let validator = validator.with_fee_rate(Decimal::new(1, 2));
        let book = OrderBook::new(AssetId(1));
        let now = Utc::now();

        // 10 @ 99 = 990, +1% = 999.9
        let fits = OrderRequest::limit(PortfolioId(1), AssetId(1), Side::Buy, dec(10), dec(99));
        assert!(validator.validate(&fits, &book, None, now).is_ok());
        // 10 @ 100 = 1000, +1% = 1010
        let over = OrderRequest::limit(PortfolioId(1), AssetId(1), Side::Buy, dec(10), dec(100));
        assert_eq!(
            validator.validate(&over, &book, None, now).unwrap_err().code(),
            "INSUFFICIENT_FUNDS"
        );
    }
}
