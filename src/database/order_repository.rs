use crate::database::error::DatabaseError;
use crate::database::repository::OrderStore;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgExecutor, PgPool};
use tracing::warn;
use uuid::Uuid;

/// The slice of an order the payment core reads
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_no: String,
    pub grand_total: Decimal,
    pub status: String,
    pub payment_status: Option<String>,
    pub payment_transaction_id: Option<Uuid>,
    pub payment_method: Option<String>,
    pub guest_email: Option<String>,
    pub guest_name: Option<String>,
    pub guest_phone: Option<String>,
    pub shipping_address: Option<serde_json::Value>,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some(PAID_PAYMENT_STATUS)
    }
}

/// One line item of an order
#[derive(Debug, Clone, FromRow)]
pub struct OrderLine {
    pub product_name: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub variant_id: Option<Uuid>,
}

/// Fields written on an order when a payment settles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPaymentUpdate {
    pub status: String,
    pub payment_status: String,
    pub payment_transaction_id: Uuid,
}

/// Stock to take off a variant when a payment succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDecrement {
    pub variant_id: Uuid,
    pub quantity: i32,
}

/// `payment_status` of an order whose payment went through
pub const PAID_PAYMENT_STATUS: &str = "paid";

const COLUMNS: &str = "id, order_no, grand_total, status, payment_status, payment_transaction_id, \
     payment_method, guest_email, guest_name, guest_phone, shipping_address";

/// Postgres-backed [`OrderStore`]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!("SELECT {} FROM orders WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_order_no(&self, order_no: &str) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE order_no = $1",
            COLUMNS
        ))
        .bind(order_no)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, DatabaseError> {
        sqlx::query_as::<_, OrderLine>(
            "SELECT product_name, quantity, unit_price, variant_id
             FROM order_items WHERE order_id = $1
             ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn set_payment_method(&self, order_id: Uuid, method: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE orders SET payment_method = $1, updated_at = NOW() WHERE id = $2")
            .bind(method)
            .bind(order_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }
}

/// Write the settlement labels onto an order.
///
/// A paid order is never overwritten. Returns whether the row was updated.
pub(crate) async fn apply_payment_update<'e, E>(
    executor: E,
    order_id: Uuid,
    update: &OrderPaymentUpdate,
) -> Result<bool, DatabaseError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE orders
         SET status = $1, payment_status = $2, payment_transaction_id = $3, updated_at = NOW()
         WHERE id = $4 AND payment_status IS DISTINCT FROM $5",
    )
    .bind(&update.status)
    .bind(&update.payment_status)
    .bind(update.payment_transaction_id)
    .bind(order_id)
    .bind(PAID_PAYMENT_STATUS)
    .execute(executor)
    .await
    .map_err(DatabaseError::from_sqlx)?;

    Ok(result.rows_affected() > 0)
}

/// Subtract stock from a variant, flooring at zero
pub(crate) async fn decrement_variant_stock<'e, E>(
    executor: E,
    decrement: &StockDecrement,
) -> Result<(), DatabaseError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE product_variants
         SET stock = GREATEST(stock - $1, 0), updated_at = NOW()
         WHERE id = $2",
    )
    .bind(decrement.quantity)
    .bind(decrement.variant_id)
    .execute(executor)
    .await
    .map_err(DatabaseError::from_sqlx)?;

    if result.rows_affected() == 0 {
        warn!(
            "Stock decrement matched no variant: variant_id={}",
            decrement.variant_id
        );
    }

    Ok(())
}
