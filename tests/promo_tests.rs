mod common;

use common::{MockPanel, TestApp};
use chrono::{Duration, Utc};
use resellkit::domain::agent::Role;
use resellkit::error::ResellError;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_redeem_is_case_insensitive_and_once_per_agent() {
    let app = TestApp::new(MockPanel::new());
    app.add_agent(1, Role::Reseller).await;
    app.promos.create("Sale25", dec!(25), None, None).await.unwrap();

    let discount = app.promos.redeem("sale25", 1).await.unwrap();
    assert_eq!(discount, dec!(25));

    let err = app.promos.redeem("SALE25", 1).await.unwrap_err();
    assert!(matches!(err, ResellError::PromoAlreadyUsed));
}

#[tokio::test]
async fn test_limited_code_never_over_issues_under_contention() {
    let app = TestApp::new(MockPanel::new());
    for id in 1..=20 {
        app.add_agent(id, Role::Reseller).await;
    }
    app.promos.create("FIRST3", dec!(10), Some(3), None).await.unwrap();

    let mut handles = Vec::new();
    for id in 1..=20 {
        let promos = app.promos.clone();
        handles.push(tokio::spawn(async move { promos.redeem("FIRST3", id).await }));
    }
    let mut successes = 0;
    let mut exhausted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(ResellError::PromoExhausted) => exhausted += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 3);
    assert_eq!(exhausted, 17);
}

#[tokio::test]
async fn test_expired_code_reads_as_not_found() {
    let app = TestApp::new(MockPanel::new());
    app.add_agent(1, Role::Reseller).await;
    app.promos
        .create("OLD", dec!(10), None, Some(Utc::now() - Duration::hours(1)))
        .await
        .unwrap();

    let err = app.promos.redeem("OLD", 1).await.unwrap_err();
    assert!(matches!(err, ResellError::PromoNotFound));
}

#[tokio::test]
async fn test_deactivated_code_reads_as_not_found() {
    let app = TestApp::new(MockPanel::new());
    app.add_agent(1, Role::Reseller).await;
    app.promos.create("PAUSED", dec!(10), None, None).await.unwrap();
    app.promos.deactivate("paused").await.unwrap();

    let err = app.promos.redeem("PAUSED", 1).await.unwrap_err();
    assert!(matches!(err, ResellError::PromoNotFound));
}

#[tokio::test]
async fn test_duplicate_code_rejected() {
    let app = TestApp::new(MockPanel::new());
    app.promos.create("TWICE", dec!(10), None, None).await.unwrap();
    let err = app.promos.create("twice", dec!(20), None, None).await.unwrap_err();
    assert!(matches!(err, ResellError::Validation(_)));
}
