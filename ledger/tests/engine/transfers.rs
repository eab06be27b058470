use payloads::{CategoryId, TransactionKind, requests};
use rust_decimal::dec;

use ledger::store::StoreError;

use crate::helpers::{AIRLINE_CATEGORY, spawn_engine};

#[tokio::test]
async fn test_internal_transfer_moves_funds_and_accrues_bonus()
-> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let bob = app.seed_individual("+10000000002");
    let alice_account = app.seed_account(&alice, dec!(1000));
    let bob_account = app.seed_account(&bob, dec!(500));

    let receipt = app
        .engine
        .internal_transfer(
            &alice,
            &requests::InternalTransfer {
                source: alice_account,
                destination: bob_account,
                amount: dec!(300),
            },
        )
        .await?;

    assert_eq!(app.balance(&alice_account).await, dec!(700));
    assert_eq!(app.balance(&bob_account).await, dec!(800));

    // Both sides see the same immutable record.
    let log = app
        .engine
        .account_transactions(
            &alice,
            &requests::ListTransactions {
                account: alice_account,
                limit: 10,
                offset: 0,
            },
        )
        .await?;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].transaction_id, receipt.transaction_id);
    assert_eq!(log[0].amount, dec!(300));
    assert_eq!(log[0].kind, TransactionKind::InternalTransfer);
    assert_eq!(log[0].category, CategoryId::TRANSFERS);
    assert_eq!(log[0].source, Some(alice_account));
    assert_eq!(log[0].destination, Some(bob_account));

    // Sender accrues 0.5% of the amount, rounded to cents.
    let wallet = app.engine.bonus_wallet(&alice).await?;
    assert_eq!(wallet.balance, dec!(1.50));
    assert_eq!(wallet.operations.len(), 1);
    app.assert_bonus_log_consistent(&alice).await;

    // The recipient accrues nothing.
    assert_eq!(app.engine.bonus_wallet(&bob).await?.balance, dec!(0));

    Ok(())
}

#[tokio::test]
async fn test_internal_transfer_to_business_uses_declared_category()
-> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let airline = app.seed_business("+10000000002", Some("airline"));
    let alice_account = app.seed_account(&alice, dec!(1000));
    let airline_account = app.seed_account(&airline, dec!(0));

    app.engine
        .internal_transfer(
            &alice,
            &requests::InternalTransfer {
                source: alice_account,
                destination: airline_account,
                amount: dec!(100),
            },
        )
        .await?;

    let log = app
        .engine
        .account_transactions(
            &alice,
            &requests::ListTransactions {
                account: alice_account,
                limit: 10,
                offset: 0,
            },
        )
        .await?;
    assert_eq!(log[0].category, AIRLINE_CATEGORY);

    Ok(())
}

#[tokio::test]
async fn test_unknown_business_category_falls_back_to_transfers()
-> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let shop = app.seed_business("+10000000002", Some("barber"));
    let alice_account = app.seed_account(&alice, dec!(1000));
    let shop_account = app.seed_account(&shop, dec!(0));

    app.engine
        .internal_transfer(
            &alice,
            &requests::InternalTransfer {
                source: alice_account,
                destination: shop_account,
                amount: dec!(100),
            },
        )
        .await?;

    let log = app
        .engine
        .account_transactions(
            &alice,
            &requests::ListTransactions {
                account: alice_account,
                limit: 10,
                offset: 0,
            },
        )
        .await?;
    assert_eq!(log[0].category, CategoryId::TRANSFERS);

    Ok(())
}

#[tokio::test]
async fn test_transfer_requires_source_ownership() -> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let bob = app.seed_individual("+10000000002");
    let alice_account = app.seed_account(&alice, dec!(1000));
    let bob_account = app.seed_account(&bob, dec!(500));

    let result = app
        .engine
        .internal_transfer(
            &bob,
            &requests::InternalTransfer {
                source: alice_account,
                destination: bob_account,
                amount: dec!(100),
            },
        )
        .await;

    assert!(matches!(result, Err(StoreError::Forbidden)));
    assert_eq!(app.balance(&alice_account).await, dec!(1000));

    Ok(())
}

#[tokio::test]
async fn test_insufficient_funds_leaves_state_untouched() -> anyhow::Result<()>
{
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let bob = app.seed_individual("+10000000002");
    let alice_account = app.seed_account(&alice, dec!(1000));
    let bob_account = app.seed_account(&bob, dec!(500));

    let result = app
        .engine
        .internal_transfer(
            &alice,
            &requests::InternalTransfer {
                source: alice_account,
                destination: bob_account,
                amount: dec!(2000),
            },
        )
        .await;

    assert!(matches!(result, Err(StoreError::InsufficientFunds)));
    assert_eq!(app.balance(&alice_account).await, dec!(1000));
    assert_eq!(app.balance(&bob_account).await, dec!(500));
    assert!(
        app.engine
            .account_transactions(
                &alice,
                &requests::ListTransactions {
                    account: alice_account,
                    limit: 10,
                    offset: 0,
                },
            )
            .await?
            .is_empty()
    );
    assert_eq!(app.engine.bonus_wallet(&alice).await?.balance, dec!(0));

    Ok(())
}

#[tokio::test]
async fn test_self_transfer_is_rejected() -> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let alice_account = app.seed_account(&alice, dec!(1000));

    let result = app
        .engine
        .internal_transfer(
            &alice,
            &requests::InternalTransfer {
                source: alice_account,
                destination: alice_account,
                amount: dec!(100),
            },
        )
        .await;

    assert!(matches!(result, Err(StoreError::InvalidAccount)));
    assert_eq!(app.balance(&alice_account).await, dec!(1000));

    Ok(())
}

#[tokio::test]
async fn test_non_positive_amounts_are_rejected() -> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let bob = app.seed_individual("+10000000002");
    let alice_account = app.seed_account(&alice, dec!(1000));
    let bob_account = app.seed_account(&bob, dec!(500));

    for amount in [dec!(0), dec!(-50)] {
        let result = app
            .engine
            .internal_transfer(
                &alice,
                &requests::InternalTransfer {
                    source: alice_account,
                    destination: bob_account,
                    amount,
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::AmountMustBePositive)));
    }

    Ok(())
}

#[tokio::test]
async fn test_transfer_to_closed_account_is_rejected() -> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let bob = app.seed_individual("+10000000002");
    let alice_account = app.seed_account(&alice, dec!(1000));
    let bob_account = app.seed_account(&bob, dec!(500));

    app.engine
        .close_account(
            &bob,
            &requests::CloseAccount {
                account: bob_account,
            },
        )
        .await?;

    let result = app
        .engine
        .internal_transfer(
            &alice,
            &requests::InternalTransfer {
                source: alice_account,
                destination: bob_account,
                amount: dec!(100),
            },
        )
        .await;

    assert!(matches!(result, Err(StoreError::InvalidAccount)));

    Ok(())
}

#[tokio::test]
async fn test_transaction_ids_are_unique() -> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let bob = app.seed_individual("+10000000002");
    let alice_account = app.seed_account(&alice, dec!(1000));
    let bob_account = app.seed_account(&bob, dec!(500));

    let request = requests::InternalTransfer {
        source: alice_account,
        destination: bob_account,
        amount: dec!(10),
    };
    let first = app.engine.internal_transfer(&alice, &request).await?;
    let second = app.engine.internal_transfer(&alice, &request).await?;

    assert_ne!(first.transaction_id, second.transaction_id);

    Ok(())
}

#[tokio::test]
async fn test_phone_transfer_to_individual() -> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let bob = app.seed_individual("+10000000002");
    let alice_account = app.seed_account(&alice, dec!(1000));
    let bob_account = app.seed_account(&bob, dec!(0));

    let receipt = app
        .engine
        .phone_transfer(
            &alice,
            &requests::PhoneTransfer {
                source: alice_account,
                recipient_phone: "+10000000002".to_string(),
                amount: dec!(200),
            },
        )
        .await?;

    assert_eq!(app.balance(&alice_account).await, dec!(800));
    assert_eq!(app.balance(&bob_account).await, dec!(200));

    let log = app
        .engine
        .account_transactions(
            &alice,
            &requests::ListTransactions {
                account: alice_account,
                limit: 10,
                offset: 0,
            },
        )
        .await?;
    assert_eq!(log[0].transaction_id, receipt.transaction_id);
    assert_eq!(log[0].kind, TransactionKind::P2p);
    assert_eq!(log[0].category, CategoryId::OTHER);
    assert_eq!(log[0].recipient_phone, Some("+10000000002".to_string()));

    // Half of the 1% commission, so 1.00 on a 200 transfer.
    assert_eq!(app.engine.bonus_wallet(&alice).await?.balance, dec!(1.00));

    Ok(())
}

#[tokio::test]
async fn test_phone_transfer_to_business_records_p2b() -> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let airline = app.seed_business("+10000000002", Some("airline"));
    let alice_account = app.seed_account(&alice, dec!(1000));
    let airline_account = app.seed_account_with(
        &airline,
        payloads::AccountKind::BusinessPrimary,
        dec!(0),
        app.time_source.now(),
    );

    app.engine
        .phone_transfer(
            &alice,
            &requests::PhoneTransfer {
                source: alice_account,
                recipient_phone: "+10000000002".to_string(),
                amount: dec!(200),
            },
        )
        .await?;

    assert_eq!(app.balance(&airline_account).await, dec!(200));

    let log = app
        .engine
        .account_transactions(
            &alice,
            &requests::ListTransactions {
                account: alice_account,
                limit: 10,
                offset: 0,
            },
        )
        .await?;
    assert_eq!(log[0].kind, TransactionKind::P2b);
    assert_eq!(log[0].category, AIRLINE_CATEGORY);

    Ok(())
}

#[tokio::test]
async fn test_phone_transfer_lands_in_oldest_primary_account()
-> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let bob = app.seed_individual("+10000000002");
    let alice_account = app.seed_account(&alice, dec!(1000));

    // Savings cannot receive phone transfers even when older.
    let t0 = app.time_source.now();
    let savings = app.seed_account_with(
        &bob,
        payloads::AccountKind::Savings,
        dec!(0),
        t0 - jiff::Span::new().hours(3),
    );
    let older_checking = app.seed_account_with(
        &bob,
        payloads::AccountKind::Checking,
        dec!(0),
        t0 - jiff::Span::new().hours(2),
    );
    let newer_checking = app.seed_account_with(
        &bob,
        payloads::AccountKind::Checking,
        dec!(0),
        t0 - jiff::Span::new().hours(1),
    );

    app.engine
        .phone_transfer(
            &alice,
            &requests::PhoneTransfer {
                source: alice_account,
                recipient_phone: "+10000000002".to_string(),
                amount: dec!(100),
            },
        )
        .await?;

    assert_eq!(app.balance(&savings).await, dec!(0));
    assert_eq!(app.balance(&older_checking).await, dec!(100));
    assert_eq!(app.balance(&newer_checking).await, dec!(0));

    Ok(())
}

#[tokio::test]
async fn test_phone_transfer_unknown_phone() -> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let alice_account = app.seed_account(&alice, dec!(1000));

    for phone in ["+19999999999", "", &"9".repeat(100)] {
        let result = app
            .engine
            .phone_transfer(
                &alice,
                &requests::PhoneTransfer {
                    source: alice_account,
                    recipient_phone: phone.to_string(),
                    amount: dec!(100),
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::RecipientNotFound)));
    }
    assert_eq!(app.balance(&alice_account).await, dec!(1000));

    Ok(())
}

#[tokio::test]
async fn test_phone_transfer_recipient_without_primary_account()
-> anyhow::Result<()> {
    let app = spawn_engine();
    let alice = app.seed_individual("+10000000001");
    let bob = app.seed_individual("+10000000002");
    let alice_account = app.seed_account(&alice, dec!(1000));
    app.seed_account_with(
        &bob,
        payloads::AccountKind::Savings,
        dec!(0),
        app.time_source.now(),
    );

    let result = app
        .engine
        .phone_transfer(
            &alice,
            &requests::PhoneTransfer {
                source: alice_account,
                recipient_phone: "+10000000002".to_string(),
                amount: dec!(100),
            },
        )
        .await;

    assert!(matches!(result, Err(StoreError::NoActiveAccount)));

    Ok(())
}
