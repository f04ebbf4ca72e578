use std::path::Path;
use std::str::FromStr;

use centim_core::{Categorization, CategorizationMethod, Category, Money, Transaction};
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            merchant TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            balance_cents INTEGER,
            transaction_date TEXT NOT NULL,
            effective_date TEXT,
            category TEXT,
            confidence REAL,
            categorization_method TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS merchant_mappings (
            merchant TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            confidence REAL NOT NULL,
            is_manual INTEGER NOT NULL DEFAULT 0,
            aliases TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transaction_patterns (
            position INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern TEXT NOT NULL,
            category TEXT NOT NULL,
            confidence REAL NOT NULL,
            is_regex INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS similarity_cache (
            merchant TEXT PRIMARY KEY,
            neighbors TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// The persistence boundary for categorized transactions. Monetary decimals
/// become integer minor units (cents) here and only here.
pub async fn insert_transactions(
    pool: &DbPool,
    transactions: &[Transaction],
) -> Result<u64, sqlx::Error> {
    let mut db_tx = pool.begin().await?;
    let mut inserted = 0u64;

    for tx in transactions {
        sqlx::query(
            r#"
            INSERT INTO transactions
                (merchant, amount_cents, balance_cents, transaction_date,
                 effective_date, category, confidence, categorization_method)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tx.merchant)
        .bind(tx.amount.to_cents())
        .bind(tx.balance.map(Money::to_cents))
        .bind(tx.transaction_date)
        .bind(tx.effective_date)
        .bind(tx.category().map(Category::as_str))
        .bind(tx.confidence().map(f64::from))
        .bind(tx.method().map(CategorizationMethod::as_str))
        .execute(&mut *db_tx)
        .await?;
        inserted += 1;
    }

    db_tx.commit().await?;
    Ok(inserted)
}

type TransactionRow = (
    String,
    i64,
    Option<i64>,
    NaiveDate,
    Option<NaiveDate>,
    Option<String>,
    Option<f64>,
    Option<String>,
);

pub async fn get_transactions(pool: &DbPool) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT merchant, amount_cents, balance_cents, transaction_date,
               effective_date, category, confidence, categorization_method
        FROM transactions
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let categorization = match (row.5, row.6, row.7) {
                (Some(category), Some(confidence), Some(method)) => {
                    match (Category::from_str(&category), CategorizationMethod::from_str(&method)) {
                        (Ok(category), Ok(method)) => {
                            Some(Categorization::new(category, confidence as f32, method))
                        }
                        _ => None,
                    }
                }
                _ => None,
            };

            Transaction {
                merchant: row.0,
                amount: Money::from_cents(row.1),
                balance: row.2.map(Money::from_cents),
                transaction_date: row.3,
                effective_date: row.4,
                categorization,
            }
        })
        .collect())
}
