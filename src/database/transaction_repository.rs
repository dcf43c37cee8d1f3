use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::order_repository::{
    apply_payment_update, decrement_variant_stock, OrderPaymentUpdate, StockDecrement,
};
use crate::database::repository::TransactionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor, PgPool};
use std::fmt;
use tracing::{error, warn};
use uuid::Uuid;

/// Payment transaction status
///
/// `Pending` is the only non-terminal state; a transaction never leaves
/// `Success` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = DatabaseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(DatabaseError::new(DatabaseErrorKind::DecodeError {
                message: format!("unknown transaction status '{}'", other),
            })),
        }
    }
}

/// Payment transaction entity
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub amount: Decimal,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: TransactionStatus,
    pub card_last_four: Option<String>,
    pub card_holder_name: Option<String>,
    pub is_3d_secure: bool,
    pub md_status: Option<String>,
    pub bank_response_code: Option<String>,
    pub bank_response_message: Option<String>,
    pub bank_auth_code: Option<String>,
    pub bank_host_ref_num: Option<String>,
    pub bank_transaction_id: Option<String>,
    pub bank_eci: Option<String>,
    pub bank_cavv: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub raw_request: Option<serde_json::Value>,
    pub raw_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values captured when a payment attempt is opened
#[derive(Debug, Clone)]
pub struct NewPaymentTransaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub amount: Decimal,
    pub currency: String,
    pub card_last_four: Option<String>,
    pub card_holder_name: Option<String>,
    pub is_3d_secure: bool,
    pub raw_request: serde_json::Value,
}

/// Provider diagnostics written together with the terminal status
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub md_status: Option<String>,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    pub auth_code: Option<String>,
    pub host_ref_num: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub eci: Option<String>,
    pub cavv: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TerminalUpdate {
    pub status: TransactionStatus,
    pub response: ProviderResponse,
    pub raw_response: serde_json::Value,
}

/// Every write a callback causes, applied as one unit
///
/// The order labels and stock are only written when the transaction is
/// still `pending`; stock is skipped when the order was already paid.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub transaction_id: Uuid,
    pub update: TerminalUpdate,
    pub order_id: Uuid,
    pub order: OrderPaymentUpdate,
    pub stock: Vec<StockDecrement>,
}

const COLUMNS: &str = "id, order_id, provider, amount, currency, status, card_last_four, \
     card_holder_name, is_3d_secure, md_status, bank_response_code, bank_response_message, \
     bank_auth_code, bank_host_ref_num, bank_transaction_id, bank_eci, bank_cavv, error_code, \
     error_message, raw_request, raw_response, created_at, updated_at";

/// Postgres-backed [`TransactionStore`]
pub struct PgTransactionRepository {
    pool: PgPool,
}

impl PgTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Conditional `pending` -> terminal transition; `None` when the row was
/// not pending
async fn mark_terminal_with<'e, E>(
    executor: E,
    id: Uuid,
    update: &TerminalUpdate,
) -> Result<Option<PaymentTransaction>, DatabaseError>
where
    E: PgExecutor<'e>,
{
    let response = &update.response;

    sqlx::query_as::<_, PaymentTransaction>(&format!(
        "UPDATE payment_transactions
         SET status = $1, md_status = $2, bank_response_code = $3,
             bank_response_message = $4, bank_auth_code = $5, bank_host_ref_num = $6,
             bank_transaction_id = $7, bank_eci = $8, bank_cavv = $9, error_code = $10,
             error_message = $11, raw_response = $12, updated_at = NOW()
         WHERE id = $13 AND status = 'pending'
         RETURNING {}",
        COLUMNS
    ))
    .bind(update.status.as_str())
    .bind(&response.md_status)
    .bind(&response.response_code)
    .bind(&response.response_message)
    .bind(&response.auth_code)
    .bind(&response.host_ref_num)
    .bind(&response.provider_transaction_id)
    .bind(&response.eci)
    .bind(&response.cavv)
    .bind(&response.error_code)
    .bind(&response.error_message)
    .bind(&update.raw_response)
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(DatabaseError::from_sqlx)
}

#[async_trait]
impl TransactionStore for PgTransactionRepository {
    async fn create(
        &self,
        new: &NewPaymentTransaction,
    ) -> Result<PaymentTransaction, DatabaseError> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "INSERT INTO payment_transactions
             (id, order_id, provider, amount, currency, status, card_last_four,
              card_holder_name, is_3d_secure, raw_request, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
             RETURNING {}",
            COLUMNS
        ))
        .bind(new.id)
        .bind(new.order_id)
        .bind(&new.provider)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(TransactionStatus::Pending.as_str())
        .bind(&new.card_last_four)
        .bind(&new.card_holder_name)
        .bind(new.is_3d_secure)
        .bind(&new.raw_request)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentTransaction>, DatabaseError> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {} FROM payment_transactions WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_latest_for_order(
        &self,
        order_id: Uuid,
        provider: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {} FROM payment_transactions WHERE order_id = $1 AND provider = $2
             ORDER BY (status = 'pending') DESC, created_at DESC
             LIMIT 1",
            COLUMNS
        ))
        .bind(order_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn mark_terminal(
        &self,
        id: Uuid,
        update: &TerminalUpdate,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        // The status guard makes the transition single-winner under retries.
        mark_terminal_with(&self.pool, id, update).await
    }

    async fn settle(
        &self,
        settlement: &Settlement,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin settlement transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

        let Some(settled) =
            mark_terminal_with(&mut *tx, settlement.transaction_id, &settlement.update).await?
        else {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(None);
        };

        let order_updated =
            apply_payment_update(&mut *tx, settlement.order_id, &settlement.order).await?;
        if order_updated {
            for decrement in &settlement.stock {
                decrement_variant_stock(&mut *tx, decrement).await?;
            }
        } else {
            warn!(
                "Order {} is already paid, leaving it and its stock untouched for transaction {}",
                settlement.order_id, settled.id
            );
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit settlement of {}: {}", settled.id, e);
            DatabaseError::from_sqlx(e)
        })?;

        Ok(Some(settled))
    }

    async fn find_stale_pending(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>, DatabaseError> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {} FROM payment_transactions
             WHERE status = 'pending' AND created_at < $1
             ORDER BY created_at ASC",
            COLUMNS
        ))
        .bind(before)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Success,
            TransactionStatus::Failed,
        ] {
            let decoded = TransactionStatus::try_from(status.as_str().to_string()).unwrap();
            assert_eq!(decoded, status);
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let result = TransactionStatus::try_from("refunded".to_string());
        assert!(result.is_err());
    }

    #[test]
    fn test_only_pending_is_non_terminal() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Success.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }
}
