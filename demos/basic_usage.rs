// ============================================================================
// Basic Usage Example
// ============================================================================

use std::sync::Arc;

use order_matching_engine::prelude::*;
use rust_decimal::Decimal;

fn main() -> Result<(), EngineError> {
    println!("=== Matching Engine Example ===\n");

    let btc = AssetId(1);
    let buyer = PortfolioId(1);
    let seller = PortfolioId(2);

    let ledger = Arc::new(InMemoryLedger::new());
    ledger.deposit(buyer, Decimal::from(10_000_000));
    ledger.credit_position(seller, btc, Decimal::from(100));
    let store = Arc::new(InMemoryOrderStore::new());

    let engine = MatchingEngineBuilder::new()
        .asset(Asset::new(btc, "BTC-USD"))
        .ledger(ledger.clone())
        .store(store.clone())
        .event_handler(Arc::new(LoggingEventHandler))
        .build()?;

    println!("Created matching engine for BTC-USD\n");

    // Add sell orders at different prices
    println!("Adding sell orders...");
    for i in 0i64..5 {
        engine.submit(OrderRequest::limit(
            seller,
            btc,
            Side::Sell,
            Decimal::ONE,
            Decimal::from(50_000 + i * 100),
        ))?;
    }

    // Add buy orders
    println!("Adding buy orders...");
    for i in 0i64..5 {
        engine.submit(OrderRequest::limit(
            buyer,
            btc,
            Side::Buy,
            Decimal::ONE,
            Decimal::from(49_900 - i * 100),
        ))?;
    }

    let view = MarketDataView::new(&engine);

    println!("\n=== Order Book Depth ===");
    println!("\nBids:");
    for level in view.depth(btc, Side::Buy, Some(5))? {
        println!("  {} @ {} ({} orders)", level.quantity, level.price, level.order_count);
    }
    println!("\nAsks:");
    for level in view.depth(btc, Side::Sell, Some(5))? {
        println!("  {} @ {} ({} orders)", level.quantity, level.price, level.order_count);
    }

    let top = view.top_of_book(btc)?;
    println!("\nSpread: {:?}", top.spread);
    println!("Mid Price: {:?}", top.mid_price);

    // Crosses the first two ask levels, the rest is cancelled
    println!("\n=== Submitting IOC Order ===");
    let outcome = engine.submit(
        OrderRequest::limit(buyer, btc, Side::Buy, Decimal::from(3), Decimal::from(50_100))
            .with_time_in_force(TimeInForce::ImmediateOrCancel),
    )?;

    println!("\nDisposition: {:?}", outcome.disposition);
    for execution in &outcome.executions {
        println!(
            "  Filled {} @ {} ({:?})",
            execution.executed_quantity, execution.execution_price, execution.liquidity
        );
    }
    println!("Order {} is {:?}", outcome.order.id, outcome.order.status());

    // Market data after the trade
    println!("\n=== Final Order Book ===");
    let top = view.top_of_book(btc)?;
    println!("Best ask: {:?}", top.best_ask.map(|level| level.price));
    println!("Last price: {:?}", top.last_price);

    let analytics = ExecutionAnalytics::new(store);
    println!(
        "Fill ratio: {}",
        analytics.fill_ratio(outcome.order.id)?
    );
    println!("Buyer position: {:?}", ledger.position(buyer, btc));

    Ok(())
}
