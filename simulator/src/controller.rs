//! Simulation controller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use corebank_common::{LedgerError, TransactionId};
use corebank_ledger::{
    AccountStatus, AccountUpdate, LedgerService, NewAccount, PaymentMethod, TransactionType,
};

use crate::metrics::SimulationMetrics;
use crate::scenario::{Operation, Scenario};

const PAYMENT_METHODS: [PaymentMethod; 3] = [
    PaymentMethod::Paypal,
    PaymentMethod::CreditCard,
    PaymentMethod::BankTransfer,
];

/// Final state of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub scenario: String,
    pub accounts: usize,
    pub initial_total: Decimal,
    pub final_total: Decimal,
    /// Accounts whose balance disagrees with their transaction log.
    pub unbalanced_accounts: Vec<String>,
    pub metrics: SimulationMetrics,
}

impl SimulationReport {
    /// Whether every ledger invariant held.
    pub fn is_consistent(&self, scenario: &Scenario) -> bool {
        self.unbalanced_accounts.is_empty()
            && self.final_total >= Decimal::ZERO
            && (!scenario.conserves_total() || self.final_total == self.initial_total)
    }
}

/// Controls the simulation.
pub struct SimulationController {
    /// Ledger under load.
    ledger: LedgerService,
    /// Base seed; worker `n` uses `seed + n`.
    seed: u64,
    /// Simulated account numbers.
    accounts: Vec<String>,
    /// Sum of opening balances.
    initial_total: Decimal,
    /// Simulation metrics.
    metrics: Arc<Mutex<SimulationMetrics>>,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(ledger: LedgerService, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self {
            ledger,
            seed,
            accounts: Vec::new(),
            initial_total: Decimal::ZERO,
            metrics: Arc::new(Mutex::new(SimulationMetrics::new())),
        }
    }

    /// Open `count` accounts and fund each with `initial_balance`.
    pub async fn initialize(&mut self, count: usize, initial_balance: Decimal) -> anyhow::Result<()> {
        info!(accounts = count, "Initializing simulation");

        let mut rng = StdRng::seed_from_u64(self.seed);
        for i in 0..count {
            let account = self
                .ledger
                .registry()
                .create(
                    NewAccount::new(format!("Holder {i}"), "CHECKING")
                        .with_email(format!("holder{i}@example.com")),
                )
                .await?;
            let number = account.account_number.to_string();

            // Interest between 0.5% and 5%
            let rate = Decimal::new(rng.gen_range(5..=50), 1);
            self.ledger
                .registry()
                .update(
                    &number,
                    AccountUpdate {
                        holder_name: account.holder_name.clone(),
                        email: account.email.clone(),
                        interest_rate: Some(rate),
                    },
                )
                .await?;

            if initial_balance > Decimal::ZERO {
                self.ledger
                    .engine()
                    .deposit(&number, initial_balance, PaymentMethod::BankTransfer)
                    .await?;
                self.initial_total += initial_balance;
            }
            self.accounts.push(number);
        }

        info!(total = %self.initial_total, "Accounts funded");
        Ok(())
    }

    /// Run `operations` operations of `scenario` spread over `workers` tasks.
    pub async fn run_scenario(
        &self,
        scenario: &Scenario,
        workers: usize,
        operations: usize,
    ) -> anyhow::Result<()> {
        if self.accounts.len() < 2 {
            return Err(anyhow::anyhow!("At least two accounts are required"));
        }
        info!(
            scenario = %scenario.name,
            description = %scenario.description,
            workers,
            operations,
            "Running scenario"
        );

        let remaining = Arc::new(AtomicUsize::new(operations));
        let accounts = Arc::new(self.accounts.clone());
        let mut handles = Vec::with_capacity(workers);

        for worker in 0..workers.max(1) {
            let ledger = self.ledger.clone();
            let scenario = scenario.clone();
            let accounts = accounts.clone();
            let remaining = remaining.clone();
            let metrics = self.metrics.clone();
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(worker as u64 + 1));

            handles.push(tokio::spawn(async move {
                // Deposits and withdrawals this worker may later reverse.
                let mut reversible: Vec<TransactionId> = Vec::new();

                while take_ticket(&remaining) {
                    let operation = scenario.pick(&mut rng);
                    let started = Instant::now();
                    let outcome =
                        execute(&ledger, operation, &accounts, &mut reversible, &mut rng).await;
                    let latency_us = started.elapsed().as_micros() as u64;

                    match outcome {
                        Ok(()) => metrics.lock().record_success(operation, latency_us),
                        Err(e) => {
                            debug!(?operation, code = e.error_code(), error = %e, "Operation rejected");
                            metrics.lock().record_rejection(e.error_code());
                        }
                    }
                }
            }));
        }

        for result in futures::future::join_all(handles).await {
            result?;
        }
        Ok(())
    }

    /// Reconcile every account and summarise the run.
    pub async fn report(&self, scenario: &Scenario) -> anyhow::Result<SimulationReport> {
        let mut final_total = Decimal::ZERO;
        let mut unbalanced_accounts = Vec::new();

        for number in &self.accounts {
            let reconciliation = self.ledger.engine().reconcile(number).await?;
            if !reconciliation.is_balanced() {
                warn!(
                    account = %number,
                    expected = %reconciliation.expected,
                    actual = %reconciliation.actual,
                    "Account does not reconcile"
                );
                unbalanced_accounts.push(number.clone());
            }
            final_total += reconciliation.actual;
        }

        let active = self
            .ledger
            .registry()
            .list_by_status(AccountStatus::Active)
            .await?;
        debug!(active = active.len(), "Active accounts");

        Ok(SimulationReport {
            scenario: scenario.name.clone(),
            accounts: self.accounts.len(),
            initial_total: self.initial_total,
            final_total,
            unbalanced_accounts,
            metrics: self.metrics.lock().clone(),
        })
    }
}

fn take_ticket(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn random_amount<R: Rng>(rng: &mut R) -> Decimal {
    // 0.01 to 250.00
    Decimal::new(rng.gen_range(1..=25_000), 2)
}

async fn execute(
    ledger: &LedgerService,
    operation: Operation,
    accounts: &[String],
    reversible: &mut Vec<TransactionId>,
    rng: &mut StdRng,
) -> Result<(), LedgerError> {
    let engine = ledger.engine();
    let account = &accounts[rng.gen_range(0..accounts.len())];
    let method = PAYMENT_METHODS[rng.gen_range(0..PAYMENT_METHODS.len())];

    match operation {
        Operation::Deposit => {
            let tx = engine.deposit(account, random_amount(rng), method).await?;
            reversible.push(tx.id);
        }
        Operation::Withdraw => {
            let tx = engine.withdraw(account, random_amount(rng), method).await?;
            reversible.push(tx.id);
        }
        Operation::Transfer => {
            let mut to = &accounts[rng.gen_range(0..accounts.len())];
            while to == account {
                to = &accounts[rng.gen_range(0..accounts.len())];
            }
            engine.transfer(account, to, random_amount(rng), method).await?;
        }
        Operation::Interest => {
            engine.apply_interest(account).await?;
        }
        Operation::Reverse => {
            if reversible.is_empty() {
                // nothing to reverse yet, fall back to a deposit
                let tx = engine.deposit(account, random_amount(rng), method).await?;
                reversible.push(tx.id);
                return Ok(());
            }
            let id = reversible.swap_remove(rng.gen_range(0..reversible.len()));
            let reversal = engine.reverse_transaction(id).await?;
            debug_assert_eq!(reversal.transaction_type, TransactionType::Reversal);
        }
    }
    Ok(())
}
