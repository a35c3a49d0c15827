// ============================================================================
// Portfolio Ledger Interface
// Cash balances and holdings owned outside the engine
// ============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{AssetId, OrderId, PortfolioId, TradeId};
use crate::numeric::{self, NumericError, Price, Quantity};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("unknown portfolio {0}")]
    UnknownPortfolio(PortfolioId),

    #[error("ledger rejected settlement: {0}")]
    Rejected(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("requires {required}, {available} available")]
    Insufficient { required: Decimal, available: Decimal },

    #[error(transparent)]
    Numeric(#[from] NumericError),
}

/// Post-trade position and balance deltas of one match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub trade_id: TradeId,
    pub asset_id: AssetId,
    pub buyer: PortfolioId,
    pub seller: PortfolioId,
    pub quantity: Quantity,
    pub price: Price,
    pub buyer_commission: Decimal,
    pub seller_commission: Decimal,
}

impl Settlement {
    /// Cash leaving the buyer: notional plus the buyer's commission
    pub fn buyer_debit(&self) -> Result<Decimal, NumericError> {
        numeric::notional(self.price, self.quantity)?
            .checked_add(self.buyer_commission)
            .ok_or(NumericError::Overflow)
    }

    /// Cash reaching the seller: notional minus the seller's commission
    pub fn seller_credit(&self) -> Result<Decimal, NumericError> {
        numeric::notional(self.price, self.quantity)?
            .checked_sub(self.seller_commission)
            .ok_or(NumericError::Overflow)
    }
}

/// What a live order keeps aside until it fills or leaves the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Cash a BUY may spend, fees included
    Cash(Decimal),
    /// Quantity a SELL may deliver
    Holdings { asset: AssetId, quantity: Quantity },
}

impl Reservation {
    pub fn amount(&self) -> Decimal {
        match self {
            Reservation::Cash(amount) => *amount,
            Reservation::Holdings { quantity, .. } => *quantity,
        }
    }

    /// Both draw on the same balance
    fn same_pool(&self, other: &Reservation) -> bool {
        match (self, other) {
            (Reservation::Cash(_), Reservation::Cash(_)) => true,
            (
                Reservation::Holdings { asset: a, .. },
                Reservation::Holdings { asset: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

/// Contract the engine needs from the portfolio/position ledger
pub trait PortfolioLedger: Send + Sync {
    /// Cash available for new BUY orders: balance less every cash hold
    fn available_cash(&self, portfolio: PortfolioId) -> Result<Decimal, LedgerError>;

    /// Holdings available for new SELL orders: position less every hold on it
    fn available_quantity(
        &self,
        portfolio: PortfolioId,
        asset: AssetId,
    ) -> Result<Quantity, LedgerError>;

    /// Hold `reservation` for an order if the portfolio can cover it, in
    /// place of any hold the order already has. Check and hold are atomic;
    /// a shortfall is `LedgerError::Insufficient`.
    fn reserve(
        &self,
        order_id: OrderId,
        portfolio: PortfolioId,
        reservation: Reservation,
    ) -> Result<(), LedgerError>;

    /// Set an order's hold without checking the balance. Used to shrink
    /// holds after fills and to restore them on recovery.
    fn hold(
        &self,
        order_id: OrderId,
        portfolio: PortfolioId,
        reservation: Reservation,
    ) -> Result<(), LedgerError>;

    /// Drop an order's hold, if it has one
    fn release(&self, order_id: OrderId) -> Result<(), LedgerError>;

    /// Apply the deltas of one match. Must be all-or-nothing.
    fn settle(&self, settlement: &Settlement) -> Result<(), LedgerError>;
}

// ============================================================================
// In-Memory Ledger
// ============================================================================

#[derive(Debug, Default, Clone)]
struct Account {
    cash: Decimal,
    positions: HashMap<AssetId, Quantity>,
    /// Sum of cash holds
    cash_held: Decimal,
    /// Sum of holdings holds per asset
    positions_held: HashMap<AssetId, Quantity>,
}

impl Account {
    fn balance(&self, pool: &Reservation) -> Decimal {
        match pool {
            Reservation::Cash(_) => self.cash,
            Reservation::Holdings { asset, .. } => {
                self.positions.get(asset).copied().unwrap_or_default()
            },
        }
    }

    fn held(&mut self, pool: &Reservation) -> &mut Decimal {
        match pool {
            Reservation::Cash(_) => &mut self.cash_held,
            Reservation::Holdings { asset, .. } => self.positions_held.entry(*asset).or_default(),
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<PortfolioId, Account>,
    holds: HashMap<OrderId, (PortfolioId, Reservation)>,
    unavailable: Option<String>,
}

impl LedgerState {
    /// Balance in the pool `like` draws on, less the holds on that pool.
    /// `except` leaves one order's own hold out of the sum.
    fn available(
        &self,
        portfolio: PortfolioId,
        like: &Reservation,
        except: Option<OrderId>,
    ) -> Result<Decimal, LedgerError> {
        let account = self
            .accounts
            .get(&portfolio)
            .ok_or(LedgerError::UnknownPortfolio(portfolio))?;
        let held = match like {
            Reservation::Cash(_) => account.cash_held,
            Reservation::Holdings { asset, .. } => {
                account.positions_held.get(asset).copied().unwrap_or_default()
            },
        };
        let own = except
            .and_then(|id| self.holds.get(&id))
            .filter(|(owner, reservation)| *owner == portfolio && reservation.same_pool(like))
            .map(|(_, reservation)| reservation.amount())
            .unwrap_or_default();

        Ok(account
            .balance(like)
            .checked_sub(held)
            .and_then(|free| free.checked_add(own))
            .ok_or(NumericError::Overflow)?)
    }

    /// Replace an order's hold; `None` drops it
    fn set_hold(
        &mut self,
        order_id: OrderId,
        portfolio: PortfolioId,
        reservation: Option<Reservation>,
    ) -> Result<(), LedgerError> {
        if reservation.is_some() && !self.accounts.contains_key(&portfolio) {
            return Err(LedgerError::UnknownPortfolio(portfolio));
        }

        if let Some((owner, previous)) = self.holds.remove(&order_id) {
            if let Some(account) = self.accounts.get_mut(&owner) {
                let held = account.held(&previous);
                *held = held
                    .checked_sub(previous.amount())
                    .ok_or(NumericError::Overflow)?;
            }
        }

        if let Some(reservation) = reservation {
            let account = self
                .accounts
                .get_mut(&portfolio)
                .ok_or(LedgerError::UnknownPortfolio(portfolio))?;
            let held = account.held(&reservation);
            *held = held
                .checked_add(reservation.amount())
                .ok_or(NumericError::Overflow)?;
            self.holds.insert(order_id, (portfolio, reservation));
        }
        Ok(())
    }
}

/// Reference ledger held in memory
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a portfolio with no cash and no holdings
    pub fn open(&self, portfolio: PortfolioId) {
        self.state.write().accounts.entry(portfolio).or_default();
    }

    pub fn deposit(&self, portfolio: PortfolioId, amount: Decimal) {
        self.state
            .write()
            .accounts
            .entry(portfolio)
            .or_default()
            .cash += amount;
    }

    pub fn credit_position(&self, portfolio: PortfolioId, asset: AssetId, quantity: Quantity) {
        *self
            .state
            .write()
            .accounts
            .entry(portfolio)
            .or_default()
            .positions
            .entry(asset)
            .or_default() += quantity;
    }

    pub fn cash(&self, portfolio: PortfolioId) -> Option<Decimal> {
        self.state.read().accounts.get(&portfolio).map(|a| a.cash)
    }

    pub fn position(&self, portfolio: PortfolioId, asset: AssetId) -> Option<Quantity> {
        let state = self.state.read();
        let account = state.accounts.get(&portfolio)?;
        Some(account.positions.get(&asset).copied().unwrap_or_default())
    }

    /// Current hold of an order
    pub fn held(&self, order_id: OrderId) -> Option<Reservation> {
        self.state
            .read()
            .holds
            .get(&order_id)
            .map(|(_, reservation)| *reservation)
    }

    /// Simulate an outage: every call fails until cleared with `None`
    pub fn set_unavailable(&self, reason: Option<String>) {
        self.state.write().unavailable = reason;
    }

    fn check_available(state: &LedgerState) -> Result<(), LedgerError> {
        match &state.unavailable {
            Some(reason) => Err(LedgerError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

impl PortfolioLedger for InMemoryLedger {
    fn available_cash(&self, portfolio: PortfolioId) -> Result<Decimal, LedgerError> {
        let state = self.state.read();
        Self::check_available(&state)?;
        state.available(portfolio, &Reservation::Cash(Decimal::ZERO), None)
    }

    fn available_quantity(
        &self,
        portfolio: PortfolioId,
        asset: AssetId,
    ) -> Result<Quantity, LedgerError> {
        let state = self.state.read();
        Self::check_available(&state)?;
        let like = Reservation::Holdings {
            asset,
            quantity: Decimal::ZERO,
        };
        state.available(portfolio, &like, None)
    }

    fn reserve(
        &self,
        order_id: OrderId,
        portfolio: PortfolioId,
        reservation: Reservation,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        Self::check_available(&state)?;

        let available = state.available(portfolio, &reservation, Some(order_id))?;
        if available < reservation.amount() {
            return Err(LedgerError::Insufficient {
                required: reservation.amount(),
                available,
            });
        }
        state.set_hold(order_id, portfolio, Some(reservation))
    }

    fn hold(
        &self,
        order_id: OrderId,
        portfolio: PortfolioId,
        reservation: Reservation,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        Self::check_available(&state)?;
        state.set_hold(order_id, portfolio, Some(reservation))
    }

    fn release(&self, order_id: OrderId) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        Self::check_available(&state)?;
        let portfolio = match state.holds.get(&order_id) {
            Some((owner, _)) => *owner,
            None => return Ok(()),
        };
        state.set_hold(order_id, portfolio, None)
    }

    fn settle(&self, settlement: &Settlement) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        Self::check_available(&state)?;

        for portfolio in [settlement.buyer, settlement.seller] {
            if !state.accounts.contains_key(&portfolio) {
                return Err(LedgerError::UnknownPortfolio(portfolio));
            }
        }

        // compute every delta before touching any account
        let debit = settlement.buyer_debit()?;
        let credit = settlement.seller_credit()?;

        let buyer = state
            .accounts
            .get_mut(&settlement.buyer)
            .ok_or(LedgerError::UnknownPortfolio(settlement.buyer))?;
        buyer.cash -= debit;
        *buyer.positions.entry(settlement.asset_id).or_default() += settlement.quantity;

        let seller = state
            .accounts
            .get_mut(&settlement.seller)
            .ok_or(LedgerError::UnknownPortfolio(settlement.seller))?;
        seller.cash += credit;
        let delivered = seller.positions.entry(settlement.asset_id).or_default();
        *delivered -= settlement.quantity;
        if *delivered < Decimal::ZERO {
            tracing::warn!(
                portfolio = %settlement.seller,
                asset = %settlement.asset_id,
                position = %delivered,
                "settlement left a short position"
            );
        }

        let buyer_cash = state
            .accounts
            .get(&settlement.buyer)
            .map(|account| account.cash)
            .unwrap_or_default();
        if buyer_cash < Decimal::ZERO {
            tracing::warn!(
                portfolio = %settlement.buyer,
                cash = %buyer_cash,
                "settlement overdrew cash beyond its hold"
            );
        }

        Ok(())
    }
}
