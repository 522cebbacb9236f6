//! Postgres window store against a real database.
//!
//! Each test creates its own database under `DATABASE_URL`; without that
//! variable the tests return early.

use std::time::Duration;

use sqlx::{Connection, Executor, PgConnection};
use url::Url;

use api_shield::security::rate_limit::{
    DurableRateLimiter, PgWindowStore, RateLimitSettings, RateLimiter, WindowStore,
};

const WINDOW_MS: u64 = 60_000;

fn admin_url() -> Option<String> {
    let url = std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty());
    if url.is_none() {
        eprintln!("DATABASE_URL not set, skipping Postgres store test");
    }
    url
}

fn fresh_name() -> String {
    format!("shield_test_{:016x}", rand::random::<u64>())
}

fn database_url(base: &str, name: &str) -> String {
    let mut url = Url::parse(base).expect("DATABASE_URL is not a valid URL");
    url.set_path(&format!("/{name}"));
    url.to_string()
}

async fn create_database(base: &str, name: &str) {
    let mut connection = PgConnection::connect(base)
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, name))
        .await
        .expect("Failed to create database.");
}

fn connect(base: &str, name: &str) -> PgWindowStore {
    PgWindowStore::connect_lazy(&database_url(base, name), Duration::from_secs(5)).unwrap()
}

async fn fresh_store() -> Option<PgWindowStore> {
    let base = admin_url()?;
    let name = fresh_name();
    create_database(&base, &name).await;
    Some(connect(&base, &name))
}

#[tokio::test]
async fn test_n_then_reject_then_slide() {
    let Some(store) = fresh_store().await else { return };
    store.migrate().await.unwrap();
    store.migrate().await.unwrap();

    let now = 10_000_000;
    for _ in 0..3 {
        assert!(store.check_and_record("ip", now, WINDOW_MS, 3).await.unwrap());
    }
    assert!(!store.check_and_record("ip", now, WINDOW_MS, 3).await.unwrap());
    assert_eq!(store.count_since("ip", now - WINDOW_MS).await.unwrap(), 3);

    // Other identifiers are independent.
    assert!(store.check_and_record("other", now, WINDOW_MS, 3).await.unwrap());

    // Entries at `now` fall out once `now + window` is reached.
    assert!(store.check_and_record("ip", now + WINDOW_MS, WINDOW_MS, 3).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_checks_stay_at_quota() {
    let Some(store) = fresh_store().await else { return };
    let now = 10_000_000;

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store.check_and_record("burst", now, WINDOW_MS, 5).await.unwrap()
            })
        })
        .collect();

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 5);
    assert_eq!(store.count_since("burst", 0).await.unwrap(), 5);
}

#[tokio::test]
async fn test_purge_and_clear() {
    let Some(store) = fresh_store().await else { return };

    for ts in [1_000, 2_000, 3_000] {
        assert!(store.check_and_record("ip", ts, WINDOW_MS, 10).await.unwrap());
    }

    assert_eq!(store.purge_before(2_000).await.unwrap(), 2);
    assert_eq!(store.count_since("ip", 0).await.unwrap(), 1);

    assert_eq!(store.clear("ip").await.unwrap(), 1);
    assert_eq!(store.count_since("ip", 0).await.unwrap(), 0);
}

#[tokio::test]
async fn test_schema_created_once_database_appears() {
    let Some(base) = admin_url() else { return };
    let name = fresh_name();
    let store = connect(&base, &name);

    // The database does not exist yet, as if Postgres were down at startup.
    assert!(store.migrate().await.is_err());

    create_database(&base, &name).await;
    assert!(store.check_and_record("ip", 10_000_000, WINDOW_MS, 1).await.unwrap());
}

#[tokio::test]
async fn test_durable_limiter_over_postgres() {
    let Some(store) = fresh_store().await else { return };
    let settings = RateLimitSettings {
        window: Duration::from_millis(WINDOW_MS),
        max_requests: 2,
    };
    let limiter = DurableRateLimiter::new(store, settings, Duration::from_secs(5));

    assert!(limiter.check_limit("ip").await);
    assert!(limiter.check_limit("ip").await);
    assert!(!limiter.check_limit("ip").await);
    assert_eq!(limiter.remaining("ip").await, 0);

    limiter.reset("ip").await;
    assert_eq!(limiter.remaining("ip").await, 2);
}
