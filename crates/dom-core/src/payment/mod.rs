//! Payments received against contracts. Append-only: a payment is
//! never edited or deleted, corrections are new rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: i64,
    pub contract_id: i64,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub method: String,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub contract_id: i64,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub method: String,
    pub reference: Option<String>,
}

#[derive(Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, payment: &NewPayment) -> Result<i64> {
        if payment.amount <= 0.0 {
            warn!(contract_id = payment.contract_id, "Payment rejected: non-positive amount");
            return Err(CoreError::single_validation(
                "payment amount must be greater than zero",
            ));
        }

        let mut tx = self.pool.begin().await?;
        let contract: Option<i64> = sqlx::query_scalar("SELECT id FROM contracts WHERE id = ?")
            .bind(payment.contract_id)
            .fetch_optional(&mut *tx)
            .await?;
        if contract.is_none() {
            return Err(CoreError::not_found("contract", payment.contract_id));
        }

        let method = payment.method.trim();
        let result = sqlx::query(
            "INSERT INTO payments (contract_id, amount, payment_date, method, reference, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(payment.contract_id)
        .bind(payment.amount)
        .bind(payment.payment_date)
        .bind(if method.is_empty() { "cash" } else { method })
        .bind(&payment.reference)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let id = result.last_insert_rowid();
        info!(
            payment_id = id,
            contract_id = payment.contract_id,
            amount = payment.amount,
            "Payment recorded"
        );
        Ok(id)
    }

    pub async fn list_for_contract(&self, contract_id: i64) -> Result<Vec<Payment>> {
        let payments = sqlx::query_as(
            "SELECT * FROM payments WHERE contract_id = ?
             ORDER BY payment_date DESC, id DESC",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    /// Sum of all payments ever recorded, zero when there are none.
    pub async fn total_collected(&self) -> Result<f64> {
        let total: f64 = sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM payments")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}
