//! Provider-agnostic payment orchestration
//!
//! [`PaymentService`] owns every state change of the payment core: it opens
//! `pending` transactions, applies verified callbacks exactly once and expires
//! abandoned attempts. Providers only build requests and interpret callbacks.

use crate::database::order_repository::{Order, OrderPaymentUpdate, StockDecrement};
use crate::database::repository::{OrderStore, TransactionStore};
use crate::database::transaction_repository::{
    NewPaymentTransaction, PaymentTransaction, ProviderResponse, Settlement, TerminalUpdate,
    TransactionStatus,
};
use crate::error::{AppError, AppResult};
use crate::payments::amount::{
    installment_options, resolve_charge_amount, to_minor_units, InstallmentOption,
};
use crate::payments::traits::{InitiationContext, PaymentProvider};
use crate::payments::types::{
    CallbackRequest, ClientContext, InitiatePaymentRequest, InitiatedPayment, SettlementResult,
    TransactionLocator,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Currency every transaction is recorded in
pub const TRANSACTION_CURRENCY: &str = "TRY";

/// `error_code` written by the stale-pending sweep
pub const TIMEOUT_ERROR_CODE: &str = "timeout";

pub struct PaymentService {
    transactions: Arc<dyn TransactionStore>,
    orders: Arc<dyn OrderStore>,
}

impl PaymentService {
    pub fn new(transactions: Arc<dyn TransactionStore>, orders: Arc<dyn OrderStore>) -> Self {
        Self {
            transactions,
            orders,
        }
    }

    /// Start a payment attempt.
    ///
    /// The provider step runs before anything is written, so a rejected
    /// request or a failed token call leaves no transaction behind.
    pub async fn initiate(
        &self,
        provider: &dyn PaymentProvider,
        request: &InitiatePaymentRequest,
        client: &ClientContext,
    ) -> AppResult<InitiatedPayment> {
        provider.validate(request)?;

        let order_id = parse_order_id(request.order_id.as_deref())?;
        let order = self.load_order(order_id).await?;
        if order.is_paid() {
            warn!(
                "Refusing {} payment for already paid order {}",
                provider.name(),
                order.order_no
            );
            return Err(AppError::conflict("Order is already paid"));
        }
        let lines = self.orders.lines(order.id).await?;

        let amount = resolve_charge_amount(request.total_amount, order.grand_total);
        let amount_minor = to_minor_units(amount)?;
        if amount_minor == 0 {
            return Err(AppError::validation("Payment amount must be greater than zero"));
        }

        let transaction_id = Uuid::new_v4();
        let initiation = provider
            .initiate(InitiationContext {
                transaction_id,
                order: &order,
                lines: &lines,
                request,
                client,
                amount_minor,
            })
            .await?;

        let snapshot = initiation.snapshot;
        let transaction = self
            .transactions
            .create(&NewPaymentTransaction {
                id: transaction_id,
                order_id: order.id,
                provider: provider.name().to_string(),
                amount,
                currency: TRANSACTION_CURRENCY.to_string(),
                card_last_four: snapshot.card_last_four,
                card_holder_name: snapshot.card_holder_name,
                is_3d_secure: snapshot.is_3d_secure,
                raw_request: snapshot.raw_request,
            })
            .await
            .map_err(|e| {
                error!(
                    "Failed to persist {} transaction for order {}: {}",
                    provider.name(),
                    order.order_no,
                    e
                );
                AppError::from(e).with_context(format!("order {}", order.order_no))
            })?;

        if let Some(method) = provider.order_payment_method() {
            if let Err(e) = self.orders.set_payment_method(order.id, method).await {
                warn!(
                    "Could not tag order {} with payment method {}: {}",
                    order.order_no, method, e
                );
            }
        }

        info!(
            "Payment initiated: provider={}, order_no={}, transaction_id={}, amount={}",
            provider.name(),
            order.order_no,
            transaction.id,
            amount
        );

        Ok(InitiatedPayment {
            transaction_id: transaction.id,
            instruction: initiation.instruction,
        })
    }

    /// Apply a provider callback.
    ///
    /// Only the call that moves the transaction out of `pending` updates the
    /// order and stock, all in one store transaction; every later delivery is
    /// reported as `replayed`. A failed write leaves the transaction `pending`
    /// so the provider's retry can apply it again.
    pub async fn settle(
        &self,
        provider: &dyn PaymentProvider,
        callback: &CallbackRequest,
    ) -> AppResult<SettlementResult> {
        let outcome = provider.parse_callback(callback)?;
        if !outcome.status.is_terminal() {
            return Err(AppError::validation("callback did not carry a final status"));
        }

        let (transaction, order) = self.locate(provider, &outcome.locator).await?;

        if transaction.status.is_terminal() {
            warn!(
                "Ignoring callback for settled transaction: transaction_id={}, status={}",
                transaction.id, transaction.status
            );
            return Ok(replayed(&transaction, order.as_ref()));
        }

        let labels = provider.order_labels(outcome.status);
        let stock = if outcome.status == TransactionStatus::Success && outcome.decrements_stock {
            self.stock_decrements(transaction.order_id).await?
        } else {
            Vec::new()
        };

        let settlement = Settlement {
            transaction_id: transaction.id,
            update: TerminalUpdate {
                status: outcome.status,
                response: outcome.response,
                raw_response: outcome.raw_response,
            },
            order_id: transaction.order_id,
            order: OrderPaymentUpdate {
                status: labels.status.to_string(),
                payment_status: labels.payment_status.to_string(),
                payment_transaction_id: transaction.id,
            },
            stock,
        };

        let applied = self.transactions.settle(&settlement).await.map_err(|e| {
            error!("Settlement of transaction {} rolled back: {}", transaction.id, e);
            AppError::from(e).with_context(format!("transaction {}", transaction.id))
        })?;

        let settled = match applied {
            Some(settled) => settled,
            None => {
                // Lost the race against a concurrent delivery.
                warn!(
                    "Transaction {} settled concurrently, skipping side effects",
                    transaction.id
                );
                let current = self
                    .transactions
                    .find_by_id(transaction.id)
                    .await?
                    .unwrap_or(transaction);
                return Ok(replayed(&current, order.as_ref()));
            }
        };

        info!(
            "Payment settled: provider={}, transaction_id={}, order_id={}, status={}",
            provider.name(),
            settled.id,
            settled.order_id,
            settled.status
        );

        Ok(SettlementResult {
            transaction_id: settled.id,
            order_id: settled.order_id,
            order_no: order.map(|o| o.order_no),
            status: settled.status,
            response_code: settled.bank_response_code,
            response_message: settled
                .bank_response_message
                .or(settled.error_message),
            replayed: false,
        })
    }

    /// Fail `pending` transactions older than `ttl`. Orders and stock are
    /// left alone. Returns how many transactions were expired.
    pub async fn expire_stale(&self, ttl: Duration) -> AppResult<usize> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AppError::validation(format!("pending TTL out of range: {}", e)))?;
        let cutoff = Utc::now() - ttl;

        let stale = self.transactions.find_stale_pending(cutoff).await?;
        let mut expired = 0;

        for transaction in stale {
            let update = TerminalUpdate {
                status: TransactionStatus::Failed,
                response: ProviderResponse {
                    error_code: Some(TIMEOUT_ERROR_CODE.to_string()),
                    error_message: Some("Payment was not completed in time".to_string()),
                    ..Default::default()
                },
                raw_response: serde_json::json!({
                    "reason": TIMEOUT_ERROR_CODE,
                    "expired_at": Utc::now(),
                }),
            };

            match self.transactions.mark_terminal(transaction.id, &update).await {
                Ok(Some(_)) => expired += 1,
                Ok(None) => {}
                Err(e) => error!("Failed to expire transaction {}: {}", transaction.id, e),
            }
        }

        if expired > 0 {
            info!("Expired {} stale pending transactions", expired);
        }

        Ok(expired)
    }

    /// Installment quotes for an order's grand total
    pub async fn installment_options(&self, order_id: &str) -> AppResult<Vec<InstallmentOption>> {
        let order_id = parse_order_id(Some(order_id))?;
        let order = self.load_order(order_id).await?;
        Ok(installment_options(order.grand_total))
    }

    async fn load_order(&self, order_id: Uuid) -> AppResult<Order> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order", order_id))
    }

    async fn locate(
        &self,
        provider: &dyn PaymentProvider,
        locator: &TransactionLocator,
    ) -> AppResult<(PaymentTransaction, Option<Order>)> {
        match locator {
            TransactionLocator::Id(id) => {
                let transaction = self
                    .transactions
                    .find_by_id(*id)
                    .await?
                    .filter(|tx| tx.provider == provider.name())
                    .ok_or_else(|| AppError::not_found("Transaction", id))?;
                let order = self.orders.find_by_id(transaction.order_id).await?;
                Ok((transaction, order))
            }
            TransactionLocator::LatestForOrderNo(order_no) => {
                let order = self
                    .orders
                    .find_by_order_no(order_no)
                    .await?
                    .ok_or_else(|| AppError::not_found("Order", order_no))?;
                let transaction = self
                    .transactions
                    .find_latest_for_order(order.id, provider.name())
                    .await?
                    .ok_or_else(|| AppError::not_found("Transaction", order_no))?;
                Ok((transaction, Some(order)))
            }
        }
    }

    async fn stock_decrements(&self, order_id: Uuid) -> AppResult<Vec<StockDecrement>> {
        let lines = self.orders.lines(order_id).await?;
        Ok(lines
            .into_iter()
            .filter_map(|line| {
                line.variant_id.map(|variant_id| StockDecrement {
                    variant_id,
                    quantity: line.quantity,
                })
            })
            .collect())
    }
}

fn parse_order_id(order_id: Option<&str>) -> AppResult<Uuid> {
    let raw = order_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::validation("orderId is required"))?;
    Uuid::parse_str(raw).map_err(|_| AppError::validation(format!("orderId '{}' is not valid", raw)))
}

fn replayed(transaction: &PaymentTransaction, order: Option<&Order>) -> SettlementResult {
    SettlementResult {
        transaction_id: transaction.id,
        order_id: transaction.order_id,
        order_no: order.map(|o| o.order_no.clone()),
        status: transaction.status,
        response_code: transaction.bank_response_code.clone(),
        response_message: transaction
            .bank_response_message
            .clone()
            .or_else(|| transaction.error_message.clone()),
        replayed: true,
    }
}
