//! In-process store used by the test suites
//!
//! Behaves like the Postgres repositories, including the conditional terminal
//! transition and the all-or-nothing settlement. Writes can be made to fail
//! to exercise error paths.

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::order_repository::{Order, OrderLine};
use crate::database::repository::{OrderStore, TransactionStore};
use crate::database::transaction_repository::{
    NewPaymentTransaction, PaymentTransaction, Settlement, TerminalUpdate, TransactionStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    transactions: HashMap<Uuid, PaymentTransaction>,
    orders: HashMap<Uuid, Order>,
    lines: HashMap<Uuid, Vec<OrderLine>>,
    stock: HashMap<Uuid, i32>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
    fail_order_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: Order, lines: Vec<OrderLine>) {
        let mut state = self.lock();
        state.lines.insert(order.id, lines);
        state.orders.insert(order.id, order);
    }

    pub fn set_stock(&self, variant_id: Uuid, stock: i32) {
        self.lock().stock.insert(variant_id, stock);
    }

    pub fn stock(&self, variant_id: Uuid) -> Option<i32> {
        self.lock().stock.get(&variant_id).copied()
    }

    pub fn order(&self, id: Uuid) -> Option<Order> {
        self.lock().orders.get(&id).cloned()
    }

    pub fn transaction(&self, id: Uuid) -> Option<PaymentTransaction> {
        self.lock().transactions.get(&id).cloned()
    }

    pub fn transactions_for_order(&self, order_id: Uuid) -> Vec<PaymentTransaction> {
        let mut found: Vec<_> = self
            .lock()
            .transactions
            .values()
            .filter(|tx| tx.order_id == order_id)
            .cloned()
            .collect();
        found.sort_by_key(|tx| tx.created_at);
        found
    }

    /// Overwrite a transaction's creation time, for age-based tests
    pub fn backdate_transaction(&self, id: Uuid, created_at: DateTime<Utc>) {
        if let Some(tx) = self.lock().transactions.get_mut(&id) {
            tx.created_at = created_at;
        }
    }

    /// Make every subsequent write fail with a query error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make settlements fail at the order update, after the transaction
    /// row would have been written
    pub fn fail_order_writes(&self, fail: bool) {
        self.fail_order_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::QueryError {
                message: "writes disabled".to_string(),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn create(
        &self,
        new: &NewPaymentTransaction,
    ) -> Result<PaymentTransaction, DatabaseError> {
        self.check_writable()?;
        let mut state = self.lock();

        if state.transactions.contains_key(&new.id) {
            return Err(DatabaseError::new(
                DatabaseErrorKind::UniqueConstraintViolation {
                    column: "id".to_string(),
                    value: new.id.to_string(),
                },
            ));
        }
        if !state.orders.contains_key(&new.order_id) {
            return Err(DatabaseError::new(DatabaseErrorKind::ForeignKeyViolation {
                table: "payment_transactions".to_string(),
                column: "order_id".to_string(),
            }));
        }

        let now = Utc::now();
        let tx = PaymentTransaction {
            id: new.id,
            order_id: new.order_id,
            provider: new.provider.clone(),
            amount: new.amount,
            currency: new.currency.clone(),
            status: TransactionStatus::Pending,
            card_last_four: new.card_last_four.clone(),
            card_holder_name: new.card_holder_name.clone(),
            is_3d_secure: new.is_3d_secure,
            md_status: None,
            bank_response_code: None,
            bank_response_message: None,
            bank_auth_code: None,
            bank_host_ref_num: None,
            bank_transaction_id: None,
            bank_eci: None,
            bank_cavv: None,
            error_code: None,
            error_message: None,
            raw_request: Some(new.raw_request.clone()),
            raw_response: None,
            created_at: now,
            updated_at: now,
        };
        state.transactions.insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentTransaction>, DatabaseError> {
        Ok(self.lock().transactions.get(&id).cloned())
    }

    async fn find_latest_for_order(
        &self,
        order_id: Uuid,
        provider: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        let state = self.lock();
        let latest = state
            .transactions
            .values()
            .filter(|tx| tx.order_id == order_id && tx.provider == provider)
            .max_by_key(|tx| (tx.status == TransactionStatus::Pending, tx.created_at))
            .cloned();
        Ok(latest)
    }

    async fn mark_terminal(
        &self,
        id: Uuid,
        update: &TerminalUpdate,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        self.check_writable()?;
        let mut state = self.lock();

        let Some(tx) = state.transactions.get_mut(&id) else {
            return Ok(None);
        };
        if tx.status.is_terminal() {
            return Ok(None);
        }

        apply_terminal(tx, update);
        Ok(Some(tx.clone()))
    }

    async fn settle(
        &self,
        settlement: &Settlement,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        self.check_writable()?;
        let mut state = self.lock();

        let pending = state
            .transactions
            .get(&settlement.transaction_id)
            .is_some_and(|tx| tx.status == TransactionStatus::Pending);
        if !pending {
            return Ok(None);
        }
        // Fails before anything is touched, like a rolled back transaction.
        if self.fail_order_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::QueryError {
                message: "order writes disabled".to_string(),
            }));
        }

        let order_updated = match state.orders.get_mut(&settlement.order_id) {
            Some(order) if !order.is_paid() => {
                order.status = settlement.order.status.clone();
                order.payment_status = Some(settlement.order.payment_status.clone());
                order.payment_transaction_id = Some(settlement.order.payment_transaction_id);
                true
            }
            _ => false,
        };
        if order_updated {
            for decrement in &settlement.stock {
                if let Some(stock) = state.stock.get_mut(&decrement.variant_id) {
                    *stock = (*stock - decrement.quantity).max(0);
                }
            }
        }

        let Some(tx) = state.transactions.get_mut(&settlement.transaction_id) else {
            return Ok(None);
        };
        apply_terminal(tx, &settlement.update);
        Ok(Some(tx.clone()))
    }

    async fn find_stale_pending(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>, DatabaseError> {
        let mut stale: Vec<_> = self
            .lock()
            .transactions
            .values()
            .filter(|tx| tx.status == TransactionStatus::Pending && tx.created_at < before)
            .cloned()
            .collect();
        stale.sort_by_key(|tx| tx.created_at);
        Ok(stale)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        Ok(self.lock().orders.get(&id).cloned())
    }

    async fn find_by_order_no(&self, order_no: &str) -> Result<Option<Order>, DatabaseError> {
        Ok(self
            .lock()
            .orders
            .values()
            .find(|order| order.order_no == order_no)
            .cloned())
    }

    async fn lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, DatabaseError> {
        Ok(self.lock().lines.get(&order_id).cloned().unwrap_or_default())
    }

    async fn set_payment_method(&self, order_id: Uuid, method: &str) -> Result<(), DatabaseError> {
        self.check_writable()?;
        if let Some(order) = self.lock().orders.get_mut(&order_id) {
            order.payment_method = Some(method.to_string());
        }
        Ok(())
    }
}

fn apply_terminal(tx: &mut PaymentTransaction, update: &TerminalUpdate) {
    let response = &update.response;
    tx.status = update.status;
    tx.md_status = response.md_status.clone();
    tx.bank_response_code = response.response_code.clone();
    tx.bank_response_message = response.response_message.clone();
    tx.bank_auth_code = response.auth_code.clone();
    tx.bank_host_ref_num = response.host_ref_num.clone();
    tx.bank_transaction_id = response.provider_transaction_id.clone();
    tx.bank_eci = response.eci.clone();
    tx.bank_cavv = response.cavv.clone();
    tx.error_code = response.error_code.clone();
    tx.error_message = response.error_message.clone();
    tx.raw_response = Some(update.raw_response.clone());
    tx.updated_at = Utc::now();
}
