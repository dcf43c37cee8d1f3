use crate::database::error::DatabaseError;
use crate::database::order_repository::{Order, OrderLine};
use crate::database::transaction_repository::{
    NewPaymentTransaction, PaymentTransaction, Settlement, TerminalUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence boundary for payment attempts
///
/// Implemented by [`PgTransactionRepository`](crate::database::transaction_repository::PgTransactionRepository)
/// and [`InMemoryStore`](crate::database::memory::InMemoryStore).
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a new transaction in `pending` state
    async fn create(&self, new: &NewPaymentTransaction)
        -> Result<PaymentTransaction, DatabaseError>;

    /// Find a transaction by its ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentTransaction>, DatabaseError>;

    /// Most recent pending transaction `provider` opened for an order, or its
    /// most recent one of any state when nothing is pending
    async fn find_latest_for_order(
        &self,
        order_id: Uuid,
        provider: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError>;

    /// Move a pending transaction to a terminal state.
    ///
    /// Returns `None` when the transaction was no longer pending, in which case
    /// nothing was written.
    async fn mark_terminal(
        &self,
        id: Uuid,
        update: &TerminalUpdate,
    ) -> Result<Option<PaymentTransaction>, DatabaseError>;

    /// Apply a callback's transaction, order and stock writes atomically.
    ///
    /// Returns `None`, having written nothing, when the transaction was no
    /// longer pending. On error nothing is written either.
    async fn settle(
        &self,
        settlement: &Settlement,
    ) -> Result<Option<PaymentTransaction>, DatabaseError>;

    /// Pending transactions created before `before`
    async fn find_stale_pending(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>, DatabaseError>;
}

/// Persistence boundary for the order fields the payment core touches
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError>;

    async fn find_by_order_no(&self, order_no: &str) -> Result<Option<Order>, DatabaseError>;

    async fn lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, DatabaseError>;

    async fn set_payment_method(&self, order_id: Uuid, method: &str)
        -> Result<(), DatabaseError>;
}
