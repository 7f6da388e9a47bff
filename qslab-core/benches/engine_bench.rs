//! Criterion benchmarks for qslab hot paths.
//!
//! Benchmarks:
//! 1. Clock iteration (daily and hourly over one year)
//! 2. Broker update with a queue of market orders
//! 3. Ledger fills (open, add, reduce, flip)
//! 4. Full weekly backtest over one year

use chrono::{DateTime, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use qslab_core::calendar::{self, MARKET_CLOSE, MARKET_OPEN};
use qslab_core::domain::{Order, PortfolioId, Transaction};
use qslab_core::observer::NullObserver;
use qslab_core::pipeline::{FixedSignalsAlpha, StaticUniverse, Weights};
use qslab_core::{
    BacktestSession, Portfolio, Quote, QuoteBook, RebalanceFrequency, SessionSettings,
    SimulatedBroker, SimulatedExchange, SimulationClock,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn year() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2019, 12, 31, 23, 59, 0).unwrap(),
    )
}

fn make_quotes(assets: &[&str]) -> QuoteBook {
    let (start, end) = year();
    let mut book = QuoteBook::new();
    for (i, day) in calendar::business_days(start.date_naive(), end.date_naive()).enumerate() {
        for (k, asset) in assets.iter().enumerate() {
            let p = 100.0 + (i as f64 * 0.1 + k as f64).sin() * 10.0;
            book.insert(*asset, calendar::at(day, MARKET_OPEN), Quote::new(p - 0.01, p + 0.01));
            book.insert(*asset, calendar::at(day, MARKET_CLOSE), Quote::new(p - 0.02, p + 0.02));
        }
    }
    book
}

// ── 1. Clock ─────────────────────────────────────────────────────────

fn bench_clock(c: &mut Criterion) {
    let (start, end) = year();
    let daily = SimulationClock::daily(start, end, true, true).unwrap();
    let hourly = SimulationClock::hourly(start, end, false, false).unwrap();

    let mut group = c.benchmark_group("clock");
    group.bench_function("daily_year", |b| b.iter(|| black_box(daily.iter().count())));
    group.bench_function("hourly_year", |b| b.iter(|| black_box(hourly.iter().count())));
    group.finish();
}

// ── 2. Broker update ─────────────────────────────────────────────────

fn bench_broker_update(c: &mut Criterion) {
    let assets = ["EQ:A", "EQ:B", "EQ:C", "EQ:D"];
    let quotes = Arc::new(make_quotes(&assets));
    let (start, _) = year();
    let ts = Utc.with_ymd_and_hms(2019, 1, 2, 15, 0, 0).unwrap();

    let mut group = c.benchmark_group("broker_update");
    for n in [10usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut broker = SimulatedBroker::new(
                    start,
                    Box::new(SimulatedExchange::new()),
                    quotes.clone(),
                    None,
                );
                let id = PortfolioId::new("bench");
                broker.create_portfolio(id.clone(), "bench").unwrap();
                broker.subscribe_funds(&id, 1e9).unwrap();
                for i in 0..n {
                    let qty = if i % 3 == 0 { -5.0 } else { 10.0 };
                    broker
                        .submit_order(&id, Order::market(ts, assets[i % assets.len()], qty))
                        .unwrap();
                }
                black_box(broker.update(ts).unwrap().len())
            })
        });
    }
    group.finish();
}

// ── 3. Ledger ────────────────────────────────────────────────────────

fn bench_ledger(c: &mut Criterion) {
    let ts = Utc.with_ymd_and_hms(2019, 1, 2, 15, 0, 0).unwrap();
    let fills: Vec<Transaction> = (0..1_000)
        .map(|i| Transaction {
            timestamp: ts,
            asset: "EQ:A".into(),
            quantity: [100.0, 50.0, -80.0, -120.0, 60.0][i % 5],
            price: 100.0 + (i as f64 * 0.01),
            commission: 1.0,
        })
        .collect();

    c.bench_function("ledger_1000_fills", |b| {
        b.iter(|| {
            let mut portfolio = Portfolio::new(PortfolioId::new("bench"), "bench");
            portfolio.deposit(ts, 1e7).unwrap();
            for txn in &fills {
                portfolio.transact(txn.clone());
            }
            black_box(portfolio.total_equity())
        })
    });
}

// ── 4. Full backtest ─────────────────────────────────────────────────

fn bench_backtest(c: &mut Criterion) {
    let quotes = Arc::new(make_quotes(&["EQ:ABC", "EQ:DEF"]));
    let (start, end) = year();

    c.bench_function("weekly_backtest_year", |b| {
        b.iter(|| {
            let mut settings = SessionSettings::new(start, end, RebalanceFrequency::Weekly);
            settings.rebalance_weekday = Some("WED".into());
            settings.long_only = true;
            settings.cash_buffer_percentage = Some(0.05);
            let result = BacktestSession::builder(settings, quotes.clone())
                .universe(Box::new(StaticUniverse::new(["EQ:ABC", "EQ:DEF"])))
                .alpha(Box::new(FixedSignalsAlpha::new(Weights::from([
                    ("EQ:ABC".to_string(), 0.6),
                    ("EQ:DEF".to_string(), 0.4),
                ]))))
                .observer(Box::new(NullObserver))
                .build()
                .unwrap()
                .run()
                .unwrap();
            black_box(result.final_equity())
        })
    });
}

criterion_group!(
    benches,
    bench_clock,
    bench_broker_update,
    bench_ledger,
    bench_backtest
);
criterion_main!(benches);
