//! End-to-end ledger behaviour under concurrency, plus a model-based property.

use std::collections::HashMap;
use std::time::Duration;

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use corebank_common::{ErrorKind, TransactionId};
use corebank_ledger::{
    LedgerConfig, LedgerService, NewAccount, PaymentMethod, TransactionType,
};

fn ledger() -> LedgerService {
    LedgerService::builder(LedgerConfig::default())
        .build()
        .expect("default config is valid")
}

async fn open(ledger: &LedgerService, balance: Decimal) -> String {
    let account = ledger
        .registry()
        .create(NewAccount::new("Scenario Holder", "CHECKING"))
        .await
        .unwrap();
    let number = account.account_number.to_string();
    if balance > Decimal::ZERO {
        ledger
            .engine()
            .deposit(&number, balance, PaymentMethod::BankTransfer)
            .await
            .unwrap();
    }
    number
}

async fn balance(ledger: &LedgerService, number: &str) -> Decimal {
    ledger.registry().get(number).await.unwrap().balance
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_deposits_are_never_lost() {
    let ledger = ledger();
    let number = open(&ledger, Decimal::ZERO).await;

    let handles: Vec<_> = (0..200)
        .map(|_| {
            let ledger = ledger.clone();
            let number = number.clone();
            tokio::spawn(async move {
                ledger
                    .engine()
                    .deposit(&number, dec!(1.25), PaymentMethod::CreditCard)
                    .await
            })
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    assert_eq!(balance(&ledger, &number).await, dec!(250.00));
    let reconciliation = ledger.engine().reconcile(&number).await.unwrap();
    assert!(reconciliation.is_balanced());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_withdrawals_never_overdraw() {
    let ledger = ledger();
    let number = open(&ledger, dec!(500.00)).await;

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let ledger = ledger.clone();
            let number = number.clone();
            tokio::spawn(async move {
                ledger
                    .engine()
                    .withdraw(&number, dec!(10.00), PaymentMethod::Paypal)
                    .await
            })
        })
        .collect();

    let mut committed = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(_) => committed += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::InsufficientFunds),
        }
    }

    assert_eq!(committed, 50);
    assert_eq!(balance(&ledger, &number).await, Decimal::ZERO);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn opposite_transfers_do_not_deadlock_and_conserve_money() {
    let ledger = ledger();
    let a = open(&ledger, dec!(1000.00)).await;
    let b = open(&ledger, dec!(1000.00)).await;

    let handles: Vec<_> = (0..200)
        .map(|i| {
            let ledger = ledger.clone();
            let (from, to) = if i % 2 == 0 {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            };
            tokio::spawn(async move {
                ledger
                    .engine()
                    .transfer(&from, &to, dec!(3.33), PaymentMethod::BankTransfer)
                    .await
            })
        })
        .collect();

    let results = tokio::time::timeout(Duration::from_secs(10), futures::future::join_all(handles))
        .await
        .expect("transfers must not deadlock");
    for result in results {
        result.unwrap().unwrap();
    }

    // equal numbers each way
    assert_eq!(balance(&ledger, &a).await, dec!(1000.00));
    assert_eq!(balance(&ledger, &b).await, dec!(1000.00));
    assert!(ledger.engine().reconcile(&a).await.unwrap().is_balanced());
    assert!(ledger.engine().reconcile(&b).await.unwrap().is_balanced());
}

#[tokio::test]
async fn account_lifecycle_end_to_end() {
    let ledger = ledger();
    let number = open(&ledger, dec!(20.00)).await;

    let err = ledger.registry().close(&number).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    ledger
        .engine()
        .withdraw(&number, dec!(20.00), PaymentMethod::Paypal)
        .await
        .unwrap();
    ledger.registry().close(&number).await.unwrap();

    // closed but still owns its history
    let err = ledger.registry().delete(&number).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = ledger
        .engine()
        .deposit(&number, dec!(1), PaymentMethod::Paypal)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let history = ledger.engine().transactions_for_account(&number).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].transaction_type, TransactionType::Deposit);
    assert_eq!(history[1].transaction_type, TransactionType::Withdrawal);
}

#[derive(Debug, Clone)]
enum Op {
    Deposit(usize, i64),
    Withdraw(usize, i64),
    Transfer(usize, usize, i64),
    Reverse(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 1..20_000i64).prop_map(|(a, c)| Op::Deposit(a, c)),
        (0..3usize, 1..20_000i64).prop_map(|(a, c)| Op::Withdraw(a, c)),
        (0..3usize, 0..3usize, 1..20_000i64).prop_map(|(a, b, c)| Op::Transfer(a, b, c)),
        (0..64usize).prop_map(Op::Reverse),
    ]
}

/// Reversible record as the model sees it.
struct ModelRecord {
    id: TransactionId,
    account: usize,
    deposit: bool,
    amount: Decimal,
    reversed: bool,
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn ledger_matches_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
        tokio_test::block_on(async {
            let ledger = ledger();
            let mut numbers = Vec::new();
            for _ in 0..3 {
                numbers.push(open(&ledger, Decimal::ZERO).await);
            }
            let mut model = [Decimal::ZERO; 3];
            let mut records: Vec<ModelRecord> = Vec::new();
            let engine = ledger.engine();

            for op in ops {
                match op {
                    Op::Deposit(a, cents) => {
                        let amount = Decimal::new(cents, 2);
                        let tx = engine
                            .deposit(&numbers[a], amount, PaymentMethod::Paypal)
                            .await
                            .unwrap();
                        model[a] += amount;
                        records.push(ModelRecord { id: tx.id, account: a, deposit: true, amount, reversed: false });
                    }
                    Op::Withdraw(a, cents) => {
                        let amount = Decimal::new(cents, 2);
                        let result = engine.withdraw(&numbers[a], amount, PaymentMethod::Paypal).await;
                        if model[a] >= amount {
                            let tx = result.unwrap();
                            model[a] -= amount;
                            records.push(ModelRecord { id: tx.id, account: a, deposit: false, amount, reversed: false });
                        } else {
                            assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientFunds);
                        }
                    }
                    Op::Transfer(a, b, cents) => {
                        let amount = Decimal::new(cents, 2);
                        let result = engine
                            .transfer(&numbers[a], &numbers[b], amount, PaymentMethod::BankTransfer)
                            .await;
                        if a == b {
                            assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidOperation);
                        } else if model[a] >= amount {
                            result.unwrap();
                            model[a] -= amount;
                            model[b] += amount;
                        } else {
                            assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientFunds);
                        }
                    }
                    Op::Reverse(i) => {
                        if records.is_empty() {
                            continue;
                        }
                        let index = i % records.len();
                        let record = &mut records[index];
                        let result = engine.reverse_transaction(record.id).await;
                        if record.reversed {
                            assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidOperation);
                        } else if record.deposit && model[record.account] < record.amount {
                            assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientFunds);
                        } else {
                            result.unwrap();
                            if record.deposit {
                                model[record.account] -= record.amount;
                            } else {
                                model[record.account] += record.amount;
                            }
                            record.reversed = true;
                        }
                    }
                }
            }

            for (i, number) in numbers.iter().enumerate() {
                let actual = balance(&ledger, number).await;
                assert!(actual >= Decimal::ZERO);
                assert_eq!(actual, model[i]);
                let reconciliation = engine.reconcile(number).await.unwrap();
                assert!(reconciliation.is_balanced());
            }

            let by_id: HashMap<_, _> = engine
                .all_transactions()
                .await
                .unwrap()
                .into_iter()
                .map(|t| (t.id, t))
                .collect();
            for record in &records {
                assert!(by_id.contains_key(&record.id));
            }
        });
    }
}
