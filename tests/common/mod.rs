//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use wallet_ledger::api::{AppState, HttpMetrics};
use wallet_ledger::auth::{AuthService, InMemoryCredentialsStore};
use wallet_ledger::domain::{Balance, Currency};
use wallet_ledger::handlers::TransferHandler;
use wallet_ledger::ledger::InMemoryLedgerRepository;

pub const ALICE: i64 = 1;
pub const BOB: i64 = 2;
pub const ALICE_SGD: i64 = 1;
pub const BOB_SGD: i64 = 2;
pub const ALICE_USD: i64 = 3;

pub const TEST_SIGNING_KEY: &str = "integration-test-key";

/// Alice holds 1000.00 SGD and 50.00 USD, Bob holds 25.25 SGD
pub fn seeded_ledger() -> Arc<InMemoryLedgerRepository> {
    ledger_with(dec!(1000.00), dec!(25.25))
}

pub fn ledger_with(alice_sgd: Decimal, bob_sgd: Decimal) -> Arc<InMemoryLedgerRepository> {
    Arc::new(InMemoryLedgerRepository::with_balances([
        Balance::new(ALICE_SGD, ALICE, Currency::Sgd, alice_sgd),
        Balance::new(BOB_SGD, BOB, Currency::Sgd, bob_sgd),
        Balance::new(ALICE_USD, ALICE, Currency::Usd, dec!(50.00)),
    ]))
}

pub fn transfer_handler(ledger: &Arc<InMemoryLedgerRepository>) -> TransferHandler {
    TransferHandler::new(ledger.clone())
}

/// App state over the in-memory ledger with logins alice/alice-pw and bob/bob-pw
pub fn app_state(ledger: &Arc<InMemoryLedgerRepository>) -> Arc<AppState> {
    let credentials = InMemoryCredentialsStore::new();
    credentials.insert("alice", "alice-pw", ALICE).unwrap();
    credentials.insert("bob", "bob-pw", BOB).unwrap();
    let auth = AuthService::new(Arc::new(credentials), TEST_SIGNING_KEY, 60);

    Arc::new(AppState::new(
        ledger.clone(),
        auth,
        HttpMetrics::new().unwrap(),
    ))
}

/// Connect to `DATABASE_URL`, reset the wallet tables and seed the same
/// users and balances as `seeded_ledger`
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let mut tx = pool.begin().await.expect("Failed to begin transaction");

    sqlx::query(
        "TRUNCATE TABLE balance_transactions, transactions, balances, credentials, users RESTART IDENTITY CASCADE",
    )
    .execute(&mut *tx)
    .await
    .expect("Failed to clean up DB");

    sqlx::query("INSERT INTO users (id, username) VALUES ($1, 'alice'), ($2, 'bob')")
        .bind(ALICE)
        .bind(BOB)
        .execute(&mut *tx)
        .await
        .expect("Failed to seed users");

    sqlx::query(
        r#"
        INSERT INTO balances (id, owner_user_id, currency, amount, locked)
        VALUES ($1, $4, 'SGD', 1000.00, false),
               ($2, $5, 'SGD', 25.25, false),
               ($3, $4, 'USD', 50.00, false)
        "#,
    )
    .bind(ALICE_SGD)
    .bind(BOB_SGD)
    .bind(ALICE_USD)
    .bind(ALICE)
    .bind(BOB)
    .execute(&mut *tx)
    .await
    .expect("Failed to seed balances");

    tx.commit().await.expect("Failed to commit transaction");

    pool
}
