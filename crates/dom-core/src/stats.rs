//! Read-side statistics, recomputed from the store on every call.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::contract::ContractStatus;
use crate::error::Result;

/// One overview snapshot. Revenue figures only count contracts stored
/// as Active; `expired_active_contracts` counts those that are past
/// their end date but never terminated.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub individual_clients: i64,
    pub corporate_clients: i64,
    pub active_contracts: i64,
    pub pending_contracts: i64,
    pub suspended_contracts: i64,
    pub terminated_contracts: i64,
    pub expired_active_contracts: i64,
    pub expiring_soon: i64,
    pub monthly_recurring_revenue: f64,
    pub total_potential_revenue: f64,
    pub total_collected: f64,
}

/// Active-contract count and monthly revenue per service type.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceTypeCount {
    pub service_type: String,
    pub contracts: i64,
    pub monthly_total: f64,
}

#[derive(Clone)]
pub struct StatsReader {
    pool: SqlitePool,
}

impl StatsReader {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Compute the overview against an explicit `today`, counting as
    /// "expiring soon" the active contracts ending within
    /// `expiry_window_days` of it.
    pub async fn overview(&self, today: NaiveDate, expiry_window_days: i64) -> Result<Statistics> {
        let individual_clients: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM individual_clients")
                .fetch_one(&self.pool)
                .await?;
        let corporate_clients: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM corporate_clients")
                .fetch_one(&self.pool)
                .await?;

        let mut by_status = [0i64; 4];
        for (i, status) in [
            ContractStatus::Active,
            ContractStatus::Pending,
            ContractStatus::Suspended,
            ContractStatus::Terminated,
        ]
        .into_iter()
        .enumerate()
        {
            by_status[i] = sqlx::query_scalar("SELECT COUNT(*) FROM contracts WHERE status = ?")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        }

        let expired_active_contracts: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM contracts WHERE status = 'active' AND end_date < ?",
        )
        .bind(today)
        .fetch_one(&self.pool)
        .await?;

        let horizon = today + Duration::days(expiry_window_days);
        let expiring_soon: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM contracts
             WHERE status = 'active' AND end_date >= ? AND end_date <= ?",
        )
        .bind(today)
        .bind(horizon)
        .fetch_one(&self.pool)
        .await?;

        let monthly_recurring_revenue: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(monthly_amount), 0) FROM contracts WHERE status = 'active'",
        )
        .fetch_one(&self.pool)
        .await?;
        let total_potential_revenue: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(monthly_amount * duration_months), 0)
             FROM contracts WHERE status = 'active'",
        )
        .fetch_one(&self.pool)
        .await?;
        let total_collected: f64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM payments")
                .fetch_one(&self.pool)
                .await?;

        debug!(individual_clients, corporate_clients, "Statistics computed");
        Ok(Statistics {
            individual_clients,
            corporate_clients,
            active_contracts: by_status[0],
            pending_contracts: by_status[1],
            suspended_contracts: by_status[2],
            terminated_contracts: by_status[3],
            expired_active_contracts,
            expiring_soon,
            monthly_recurring_revenue,
            total_potential_revenue,
            total_collected,
        })
    }

    /// Distribution of active contracts per service type, busiest first.
    pub async fn active_by_service_type(&self) -> Result<Vec<ServiceTypeCount>> {
        let rows = sqlx::query_as(
            "SELECT service_type,
                    COUNT(*) AS contracts,
                    COALESCE(SUM(monthly_amount), 0) AS monthly_total
             FROM contracts
             WHERE status = 'active'
             GROUP BY service_type
             ORDER BY contracts DESC, service_type",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
