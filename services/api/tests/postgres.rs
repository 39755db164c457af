//! Runs against a real Postgres. Set `DATABASE_URL` and use
//! `cargo test -p api --test postgres -- --ignored`.

use std::sync::Arc;

use api_lib::adapters::DbAdapter;
use ats_gate_core::{
    domain::{AnalysisCategory, NewUsageRecord},
    ports::{IdentityStore, UsageLedger},
};
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn adapter() -> DbAdapter {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .unwrap();
    let db = DbAdapter::new(pool);
    db.run_migrations().await.unwrap();
    db
}

fn record(account_id: Uuid, n: usize) -> NewUsageRecord {
    NewUsageRecord {
        account_id,
        category: AnalysisCategory::Evaluation,
        context_text: format!("jd {n}"),
        result_text: format!("result {n}"),
        created_at: Utc::now(),
    }
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn concurrent_appends_stop_at_quota() {
    let db = Arc::new(adapter().await);
    let identity = format!("{}@race.test", Uuid::new_v4());
    let account = db.create_account(&identity, "hash", Utc::now()).await.unwrap();

    let mut handles = Vec::new();
    for n in 0..12 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.append_within_quota(record(account.id, n), 5).await
        }));
    }
    let mut used = Vec::new();
    for handle in handles {
        if let Some(recorded) = handle.await.unwrap().unwrap() {
            used.push(recorded.usage.used);
        }
    }
    used.sort_unstable();

    assert_eq!(used, vec![1, 2, 3, 4, 5]);
    assert_eq!(db.count_for_account(account.id).await.unwrap(), 5);
    let listed = db.list_for_account(account.id).await.unwrap();
    assert_eq!(listed.len(), 5);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn duplicate_identity_is_a_conflict() {
    let db = adapter().await;
    let identity = format!("{}@dup.test", Uuid::new_v4());
    db.create_account(&identity, "hash", Utc::now()).await.unwrap();
    let err = db
        .create_account(&identity, "hash2", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, ats_gate_core::ports::PortError::Conflict(_)));
}
