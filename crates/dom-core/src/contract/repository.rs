//! Contract persistence operations.

use chrono::{Duration, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::client::ClientKind;
use crate::contract::entity::{
    end_date_from, Contract, ContractDetails, ContractPatch, ContractStatus, DeleteOutcome,
    NewContract,
};
use crate::error::{CoreError, Result};

/// Shared SELECT joining each contract with its client's display
/// fields, whichever table the client lives in.
const DETAILS_SELECT: &str = r#"
SELECT c.*,
    CASE c.client_kind
        WHEN 'individual' THEN i.surname || ' ' || i.given_name
        ELSE m.legal_name
    END AS client_name,
    CASE c.client_kind
        WHEN 'individual' THEN i.identity_number
        ELSE m.tax_id
    END AS client_identifier,
    CASE c.client_kind
        WHEN 'individual' THEN i.phone
        ELSE m.phone
    END AS client_phone
FROM contracts c
LEFT JOIN individual_clients i
    ON c.client_kind = 'individual' AND c.client_id = i.id
LEFT JOIN corporate_clients m
    ON c.client_kind = 'corporate' AND c.client_id = m.id
"#;

#[derive(Clone)]
pub struct ContractRepository {
    pool: SqlitePool,
}

impl ContractRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, form: &NewContract) -> Result<i64> {
        let errors = form.validate();
        if !errors.is_empty() {
            warn!(count = errors.len(), "Contract rejected by validation");
            return Err(CoreError::validation(errors));
        }

        let mut tx = self.pool.begin().await?;
        if !client_exists(&mut tx, form.client_id, form.client_kind).await? {
            return Err(CoreError::not_found("client", form.client_id));
        }
        ensure_number_unique(&mut tx, &form.contract_number, None).await?;

        let end_date = form
            .end_date
            .unwrap_or_else(|| end_date_from(form.start_date, form.duration_months));

        let result = sqlx::query(
            "INSERT INTO contracts
                (contract_number, client_id, client_kind, service_type,
                 start_date, end_date, duration_months, monthly_amount,
                 opening_fee, deposit, included_services, conditions,
                 status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(form.contract_number.trim())
        .bind(form.client_id)
        .bind(form.client_kind)
        .bind(form.service_type.trim())
        .bind(form.start_date)
        .bind(end_date)
        .bind(form.duration_months)
        .bind(form.monthly_amount)
        .bind(form.opening_fee)
        .bind(form.deposit)
        .bind(&form.included_services)
        .bind(&form.conditions)
        .bind(form.status)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let id = result.last_insert_rowid();
        info!(
            contract_id = id,
            contract_number = %form.contract_number,
            client_id = form.client_id,
            kind = %form.client_kind,
            "Contract created"
        );
        Ok(id)
    }

    // ---- reads ----

    pub async fn find(&self, id: i64) -> Result<Option<ContractDetails>> {
        let details = sqlx::query_as(&format!("{} WHERE c.id = ?", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(details)
    }

    pub async fn list(&self) -> Result<Vec<ContractDetails>> {
        let contracts =
            sqlx::query_as(&format!("{} ORDER BY c.start_date DESC, c.id DESC", DETAILS_SELECT))
                .fetch_all(&self.pool)
                .await?;
        Ok(contracts)
    }

    /// Substring search over contract number and client name.
    pub async fn search(&self, term: &str) -> Result<Vec<ContractDetails>> {
        let pattern = format!("%{}%", term.trim());
        let contracts = sqlx::query_as(&format!(
            "{} WHERE c.contract_number LIKE ?1
                OR i.surname LIKE ?1 OR i.given_name LIKE ?1
                OR m.legal_name LIKE ?1
             ORDER BY c.id",
            DETAILS_SELECT
        ))
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;
        debug!(term, count = contracts.len(), "Contract search");
        Ok(contracts)
    }

    pub async fn list_by_status(&self, status: ContractStatus) -> Result<Vec<ContractDetails>> {
        let contracts = sqlx::query_as(&format!(
            "{} WHERE c.status = ? ORDER BY c.end_date, c.id",
            DETAILS_SELECT
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(contracts)
    }

    /// Active contracts whose end date falls within `days` of `today`,
    /// soonest first. Already-expired contracts are not included.
    pub async fn expiring_within(&self, days: i64, today: NaiveDate) -> Result<Vec<ContractDetails>> {
        let horizon = today + Duration::days(days);
        let contracts = sqlx::query_as(&format!(
            "{} WHERE c.status = 'active' AND c.end_date >= ? AND c.end_date <= ?
             ORDER BY c.end_date, c.id",
            DETAILS_SELECT
        ))
        .bind(today)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;
        Ok(contracts)
    }

    // ---- update ----

    /// Apply a partial update, returning the changed field names. The
    /// end date is always recomputed from the merged start date and
    /// duration, so edits to either move it consistently.
    pub async fn update(&self, id: i64, patch: &ContractPatch) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let current: Contract = sqlx::query_as("SELECT * FROM contracts WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::not_found("contract", id))?;

        let mut merged = current.clone();
        let mut errors = Vec::new();

        if let Some(number) = &patch.contract_number {
            merged.contract_number = number.trim().to_string();
            if merged.contract_number.is_empty() {
                errors.push("contract number is required".to_string());
            }
        }
        if let Some(client_id) = patch.client_id {
            merged.client_id = client_id;
        }
        if let Some(kind) = patch.client_kind {
            merged.client_kind = kind;
        }
        if let Some(service_type) = &patch.service_type {
            merged.service_type = service_type.trim().to_string();
            if merged.service_type.is_empty() {
                errors.push("service type is required".to_string());
            }
        }
        if let Some(start_date) = patch.start_date {
            merged.start_date = start_date;
        }
        if let Some(duration) = patch.duration_months {
            merged.duration_months = duration;
            if duration <= 0 {
                errors.push("duration must be at least one month".to_string());
            }
        }
        if let Some(amount) = patch.monthly_amount {
            merged.monthly_amount = amount;
            if amount <= 0.0 {
                errors.push("monthly amount must be greater than zero".to_string());
            }
        }
        if let Some(fee) = patch.opening_fee {
            merged.opening_fee = fee;
            if fee < 0.0 {
                errors.push("opening fee cannot be negative".to_string());
            }
        }
        if let Some(deposit) = patch.deposit {
            merged.deposit = deposit;
            if deposit < 0.0 {
                errors.push("deposit cannot be negative".to_string());
            }
        }
        if let Some(services) = &patch.included_services {
            merged.included_services = non_empty(services);
        }
        if let Some(conditions) = &patch.conditions {
            merged.conditions = non_empty(conditions);
        }
        if let Some(status) = patch.status {
            merged.status = status;
        }

        if !errors.is_empty() {
            warn!(contract_id = id, count = errors.len(), "Contract update rejected");
            return Err(CoreError::validation(errors));
        }

        // end_date is derived, never patched directly. An explicitly
        // supplied creation end date survives until a date field moves.
        if patch.start_date.is_some() || patch.duration_months.is_some() {
            merged.end_date = end_date_from(merged.start_date, merged.duration_months);
        }

        if (merged.client_id, merged.client_kind) != (current.client_id, current.client_kind)
            && !client_exists(&mut tx, merged.client_id, merged.client_kind).await?
        {
            return Err(CoreError::not_found("client", merged.client_id));
        }

        let mut changed = Vec::new();
        if merged.contract_number != current.contract_number {
            changed.push("contract_number");
        }
        if merged.client_id != current.client_id {
            changed.push("client_id");
        }
        if merged.client_kind != current.client_kind {
            changed.push("client_kind");
        }
        if merged.service_type != current.service_type {
            changed.push("service_type");
        }
        if merged.start_date != current.start_date {
            changed.push("start_date");
        }
        if merged.end_date != current.end_date {
            changed.push("end_date");
        }
        if merged.duration_months != current.duration_months {
            changed.push("duration_months");
        }
        if merged.monthly_amount != current.monthly_amount {
            changed.push("monthly_amount");
        }
        if merged.opening_fee != current.opening_fee {
            changed.push("opening_fee");
        }
        if merged.deposit != current.deposit {
            changed.push("deposit");
        }
        if merged.included_services != current.included_services {
            changed.push("included_services");
        }
        if merged.conditions != current.conditions {
            changed.push("conditions");
        }
        if merged.status != current.status {
            changed.push("status");
        }

        if changed.is_empty() {
            debug!(contract_id = id, "Contract update is a no-op");
            return Ok(Vec::new());
        }

        if merged.contract_number != current.contract_number {
            ensure_number_unique(&mut tx, &merged.contract_number, Some(id)).await?;
        }

        sqlx::query(
            "UPDATE contracts
             SET contract_number = ?, client_id = ?, client_kind = ?,
                 service_type = ?, start_date = ?, end_date = ?,
                 duration_months = ?, monthly_amount = ?, opening_fee = ?,
                 deposit = ?, included_services = ?, conditions = ?, status = ?
             WHERE id = ?",
        )
        .bind(&merged.contract_number)
        .bind(merged.client_id)
        .bind(merged.client_kind)
        .bind(&merged.service_type)
        .bind(merged.start_date)
        .bind(merged.end_date)
        .bind(merged.duration_months)
        .bind(merged.monthly_amount)
        .bind(merged.opening_fee)
        .bind(merged.deposit)
        .bind(&merged.included_services)
        .bind(&merged.conditions)
        .bind(merged.status)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(contract_id = id, changed = changed.len(), "Contract updated");
        Ok(changed.into_iter().map(str::to_string).collect())
    }

    // ---- deletion ----

    /// Delete a contract. With recorded payments the financial trail
    /// must survive, so the row is kept and forced to `terminated`;
    /// without payments the row is removed.
    pub async fn delete(&self, id: i64) -> Result<DeleteOutcome> {
        let mut tx = self.pool.begin().await?;
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM contracts WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(CoreError::not_found("contract", id));
        }

        let payments: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE contract_id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        let outcome = if payments > 0 {
            sqlx::query("UPDATE contracts SET status = 'terminated' WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            info!(contract_id = id, payments, "Contract terminated instead of deleted");
            DeleteOutcome::Terminated
        } else {
            sqlx::query("DELETE FROM contracts WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            info!(contract_id = id, "Contract deleted");
            DeleteOutcome::Deleted
        };
        tx.commit().await?;
        Ok(outcome)
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

async fn client_exists(
    conn: &mut SqliteConnection,
    client_id: i64,
    kind: ClientKind,
) -> Result<bool> {
    let table = match kind {
        ClientKind::Individual => "individual_clients",
        ClientKind::Corporate => "corporate_clients",
    };
    let found: Option<i64> = sqlx::query_scalar(&format!("SELECT id FROM {} WHERE id = ?", table))
        .bind(client_id)
        .fetch_optional(conn)
        .await?;
    Ok(found.is_some())
}

async fn ensure_number_unique(
    conn: &mut SqliteConnection,
    number: &str,
    exclude_id: Option<i64>,
) -> Result<()> {
    let clash: Option<i64> =
        sqlx::query_scalar("SELECT id FROM contracts WHERE contract_number = ? AND id != ?")
            .bind(number)
            .bind(exclude_id.unwrap_or(-1))
            .fetch_optional(conn)
            .await?;
    if clash.is_some() {
        warn!(contract_number = number, "Contract number conflict");
        return Err(CoreError::duplicate("contract", "contract_number", number));
    }
    Ok(())
}
