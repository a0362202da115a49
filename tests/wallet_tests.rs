mod common;

use common::{MockPanel, TestApp};
use resellkit::domain::agent::{Role, reasons};
use resellkit::domain::money::{Amount, Balance};
use resellkit::error::ResellError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_ledger_sum_matches_balance() {
    let app = TestApp::new(MockPanel::new());
    app.add_agent(1, Role::Reseller).await;

    app.wallet
        .credit(1, Amount::new(dec!(50)).unwrap(), reasons::TOPUP_MANUAL, "")
        .await
        .unwrap();
    app.wallet
        .debit(1, Amount::new(dec!(12.5)).unwrap(), reasons::ORDER_CHARGE, "")
        .await
        .unwrap();
    app.wallet
        .credit(1, Amount::new(dec!(12.5)).unwrap(), reasons::ORDER_REFUND, "")
        .await
        .unwrap();

    let entries = app.wallet.history(1, 100).await.unwrap();
    let sum: Decimal = entries.iter().map(|e| e.amount).sum();
    assert_eq!(Balance::new(sum), app.wallet.balance_of(1).await.unwrap());
    assert_eq!(sum, dec!(50));
}

#[tokio::test]
async fn test_overdraft_is_rejected_with_amounts() {
    let app = TestApp::new(MockPanel::new());
    app.add_agent(1, Role::Reseller).await;
    app.wallet
        .credit(1, Amount::new(dec!(10)).unwrap(), reasons::TOPUP_MANUAL, "")
        .await
        .unwrap();

    let err = app
        .wallet
        .debit(1, Amount::new(dec!(10.01)).unwrap(), reasons::ORDER_CHARGE, "")
        .await
        .unwrap_err();
    match err {
        ResellError::InsufficientBalance { required, available } => {
            assert_eq!(required, dec!(10.01));
            assert_eq!(available, dec!(10));
        }
        other => panic!("unexpected error: {other}"),
    }
    // The failed debit left no ledger row.
    assert_eq!(app.wallet.history(1, 100).await.unwrap().len(), 1);
    assert_eq!(app.wallet.balance_of(1).await.unwrap(), Balance::new(dec!(10)));
}

#[tokio::test]
async fn test_concurrent_debits_never_overdraw() {
    let app = TestApp::new(MockPanel::new());
    app.add_agent(1, Role::Reseller).await;
    app.wallet
        .credit(1, Amount::new(dec!(100)).unwrap(), reasons::TOPUP_MANUAL, "")
        .await
        .unwrap();

    // 10 tasks each try to take 60; the balance covers exactly one.
    let mut handles = Vec::new();
    for _ in 0..10 {
        let wallet = app.wallet.clone();
        handles.push(tokio::spawn(async move {
            wallet
                .debit(1, Amount::new(dec!(60)).unwrap(), reasons::ORDER_CHARGE, "")
                .await
        }));
    }
    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(app.wallet.balance_of(1).await.unwrap(), Balance::new(dec!(40)));
}

#[tokio::test]
async fn test_history_is_newest_first_and_limited() {
    let app = TestApp::new(MockPanel::new());
    app.add_agent(1, Role::Reseller).await;
    for i in 1..=5 {
        app.wallet
            .credit(
                1,
                Amount::new(Decimal::from(i)).unwrap(),
                reasons::TOPUP_MANUAL,
                "",
            )
            .await
            .unwrap();
    }
    let entries = app.wallet.history(1, 3).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].amount, dec!(5));
    assert_eq!(entries[2].amount, dec!(3));
}
