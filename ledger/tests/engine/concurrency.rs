use std::sync::Arc;

use payloads::requests;
use rust_decimal::dec;

use ledger::store::{LedgerStore, StoreError};

use crate::helpers::spawn_engine;

#[tokio::test]
async fn test_parallel_transfers_conserve_funds() -> anyhow::Result<()> {
    let app = Arc::new(spawn_engine());
    let alice = app.seed_individual("+10000000001");
    let bob = app.seed_individual("+10000000002");
    let alice_account = app.seed_account(&alice, dec!(1000));
    let bob_account = app.seed_account(&bob, dec!(1000));

    // Ten transfers in each direction, all for 50. Even the worst
    // interleaving keeps both balances funded, so every task must succeed.
    let mut handles = Vec::new();
    for i in 0..20 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let (principal, source, destination) = if i % 2 == 0 {
                (alice, alice_account, bob_account)
            } else {
                (bob, bob_account, alice_account)
            };
            app.engine
                .internal_transfer(
                    &principal,
                    &requests::InternalTransfer {
                        source,
                        destination,
                        amount: dec!(50),
                    },
                )
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(app.balance(&alice_account).await, dec!(1000));
    assert_eq!(app.balance(&bob_account).await, dec!(1000));

    // Each sender accrued 0.25 per transfer over ten transfers.
    assert_eq!(app.engine.bonus_wallet(&alice).await?.balance, dec!(2.50));
    assert_eq!(app.engine.bonus_wallet(&bob).await?.balance, dec!(2.50));
    app.assert_bonus_log_consistent(&alice).await;
    app.assert_bonus_log_consistent(&bob).await;

    Ok(())
}

#[tokio::test]
async fn test_concurrent_purchase_sells_ticket_once() -> anyhow::Result<()> {
    let app = Arc::new(spawn_engine());
    let alice = app.seed_individual("+10000000001");
    let bob = app.seed_individual("+10000000002");
    let alice_account = app.seed_account(&alice, dec!(1000));
    let bob_account = app.seed_account(&bob, dec!(1000));
    let ticket = app.seed_ticket(dec!(200));

    let buyers = [(alice, alice_account), (bob, bob_account)];
    let mut handles = Vec::new();
    for (principal, account) in buyers {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            app.engine
                .purchase_ticket(
                    &principal,
                    &requests::PurchaseTicket {
                        ticket,
                        account,
                        use_bonus: false,
                    },
                )
                .await
        }));
    }
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await?);
    }

    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(StoreError::ItemUnavailable)
    )));

    // Only the winner paid.
    let total = app.balance(&alice_account).await
        + app.balance(&bob_account).await;
    assert_eq!(total, dec!(1800));

    let sold = app
        .engine
        .store()
        .ticket(&ticket)
        .await?
        .expect("ticket exists");
    assert!(sold.is_sold);

    Ok(())
}
