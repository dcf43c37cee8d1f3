//! Payment provider trait definitions
//!
//! Defines the common interface that all payment providers must implement.
//! Providers only translate between the provider's wire format and the
//! crate's types; order and transaction state changes live in
//! [`PaymentService`](crate::payments::service::PaymentService).

use crate::database::order_repository::{Order, OrderLine};
use crate::database::transaction_repository::TransactionStatus;
use crate::error::AppResult;
use crate::payments::types::{
    CallbackOutcome, CallbackRequest, ClientContext, InitiatePaymentRequest, Initiation,
    OrderStatusLabels,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Everything a provider needs to start a payment
#[derive(Debug, Clone, Copy)]
pub struct InitiationContext<'a> {
    pub transaction_id: Uuid,
    pub order: &'a Order,
    pub lines: &'a [OrderLine],
    pub request: &'a InitiatePaymentRequest,
    pub client: &'a ClientContext,
    /// Charge amount in minor units, already resolved and rounded
    pub amount_minor: i64,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Stable identifier stored on transactions (`"garanti"`, `"paytr"`)
    fn name(&self) -> &'static str;

    /// Reject requests missing provider-required fields.
    ///
    /// Runs before any lookup or persistence.
    fn validate(&self, request: &InitiatePaymentRequest) -> AppResult<()>;

    /// Build the signed redirect for a payment attempt.
    ///
    /// Called before the transaction row exists; an error here leaves nothing
    /// behind.
    async fn initiate(&self, ctx: InitiationContext<'_>) -> AppResult<Initiation>;

    /// Authenticate and interpret an inbound callback.
    ///
    /// Returns a `SignatureMismatch` error when the payload is not authentic.
    fn parse_callback(&self, callback: &CallbackRequest) -> AppResult<CallbackOutcome>;

    /// Order labels written for a terminal transaction status
    fn order_labels(&self, status: TransactionStatus) -> OrderStatusLabels;

    /// Value written to the order's `payment_method` once a payment is
    /// initiated, if the provider tags orders at all
    fn order_payment_method(&self) -> Option<&'static str> {
        None
    }
}
