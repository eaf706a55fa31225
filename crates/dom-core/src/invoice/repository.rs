//! Invoice persistence operations.

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::client::ClientKind;
use crate::error::{CoreError, Result};
use crate::invoice::entity::{
    compute_amounts, Invoice, InvoiceDetails, InvoicePatch, InvoiceStatus, NewInvoice,
};
use crate::validation;

const DETAILS_SELECT: &str = r#"
SELECT v.*,
    CASE v.client_kind
        WHEN 'individual' THEN i.surname || ' ' || i.given_name
        ELSE m.legal_name
    END AS client_name
FROM invoices v
LEFT JOIN individual_clients i
    ON v.client_kind = 'individual' AND v.client_id = i.id
LEFT JOIN corporate_clients m
    ON v.client_kind = 'corporate' AND v.client_id = m.id
"#;

#[derive(Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an invoice. Tax and total are computed here from the
    /// pre-tax amount and rate, whatever the caller may have displayed.
    pub async fn create(&self, form: &NewInvoice) -> Result<i64> {
        let errors = form.validate();
        if !errors.is_empty() {
            warn!(count = errors.len(), "Invoice rejected by validation");
            return Err(CoreError::validation(errors));
        }

        let mut tx = self.pool.begin().await?;
        let contract: Option<i64> = sqlx::query_scalar("SELECT id FROM contracts WHERE id = ?")
            .bind(form.contract_id)
            .fetch_optional(&mut *tx)
            .await?;
        if contract.is_none() {
            return Err(CoreError::not_found("contract", form.contract_id));
        }
        if !client_exists(&mut tx, form.client_id, form.client_kind).await? {
            return Err(CoreError::not_found("client", form.client_id));
        }
        ensure_number_unique(&mut tx, &form.invoice_number, None).await?;

        let (tax_amount, total_amount) = compute_amounts(form.pre_tax_amount, form.tax_rate);

        let result = sqlx::query(
            "INSERT INTO invoices
                (invoice_number, contract_id, client_id, client_kind,
                 invoice_date, due_date, period_start, period_end,
                 pre_tax_amount, tax_rate, tax_amount, total_amount,
                 description, payment_method, status, payment_date, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(form.invoice_number.trim())
        .bind(form.contract_id)
        .bind(form.client_id)
        .bind(form.client_kind)
        .bind(form.invoice_date)
        .bind(form.due_date)
        .bind(form.period_start)
        .bind(form.period_end)
        .bind(form.pre_tax_amount)
        .bind(form.tax_rate)
        .bind(tax_amount)
        .bind(total_amount)
        .bind(&form.description)
        .bind(form.payment_method.trim())
        .bind(form.status)
        .bind(form.payment_date)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let id = result.last_insert_rowid();
        info!(
            invoice_id = id,
            invoice_number = %form.invoice_number,
            total = total_amount,
            "Invoice created"
        );
        Ok(id)
    }

    // ---- reads ----

    pub async fn find(&self, id: i64) -> Result<Option<Invoice>> {
        let invoice = sqlx::query_as("SELECT * FROM invoices WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }

    pub async fn list(&self) -> Result<Vec<InvoiceDetails>> {
        let invoices = sqlx::query_as(&format!(
            "{} ORDER BY v.invoice_date DESC, v.id DESC",
            DETAILS_SELECT
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(invoices)
    }

    /// Invoices whose stored status matches. Callers wanting the
    /// overdue view should filter on `effective_status` instead.
    pub async fn list_by_status(&self, status: InvoiceStatus) -> Result<Vec<InvoiceDetails>> {
        let invoices = sqlx::query_as(&format!(
            "{} WHERE v.status = ? ORDER BY v.due_date, v.id",
            DETAILS_SELECT
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(invoices)
    }

    // ---- update ----

    /// Apply a partial update against an explicit `today`, which
    /// supplies the default payment date when the status moves to
    /// paid without one. Returns the changed field names.
    pub async fn update(
        &self,
        id: i64,
        patch: &InvoicePatch,
        today: NaiveDate,
    ) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let current: Invoice = sqlx::query_as("SELECT * FROM invoices WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::not_found("invoice", id))?;

        let mut merged = current.clone();
        let mut errors = Vec::new();

        if let Some(number) = &patch.invoice_number {
            merged.invoice_number = number.trim().to_string();
            if merged.invoice_number.is_empty() {
                errors.push("invoice number is required".to_string());
            }
        }
        if let Some(date) = patch.invoice_date {
            merged.invoice_date = date;
        }
        if let Some(date) = patch.due_date {
            merged.due_date = date;
        }
        if let Some(date) = patch.period_start {
            merged.period_start = Some(date);
        }
        if let Some(date) = patch.period_end {
            merged.period_end = Some(date);
        }
        if let Some(amount) = patch.pre_tax_amount {
            merged.pre_tax_amount = amount;
            if amount <= 0.0 {
                errors.push("pre-tax amount must be greater than zero".to_string());
            }
        }
        if let Some(rate) = patch.tax_rate {
            merged.tax_rate = rate;
            if rate < 0.0 {
                errors.push("tax rate cannot be negative".to_string());
            }
        }
        if let Some(description) = &patch.description {
            let trimmed = description.trim();
            merged.description = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        if let Some(method) = &patch.payment_method {
            merged.payment_method = method.trim().to_string();
            if merged.payment_method.is_empty() {
                errors.push("payment method is required".to_string());
            }
        }
        if let Some(status) = patch.status {
            merged.status = status;
        }
        if let Some(raw) = &patch.payment_date {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                merged.payment_date = None;
            } else {
                match validation::parse_iso_date(trimmed) {
                    Some(date) => merged.payment_date = Some(date),
                    None => errors.push(format!("'{}' is not a YYYY-MM-DD date", trimmed)),
                }
            }
        }

        // Chronology re-checked whenever either date moved.
        if (patch.invoice_date.is_some() || patch.due_date.is_some())
            && merged.due_date < merged.invoice_date
        {
            errors.push("due date cannot precede the invoice date".to_string());
        }

        if !errors.is_empty() {
            warn!(invoice_id = id, count = errors.len(), "Invoice update rejected");
            return Err(CoreError::validation(errors));
        }

        // Payment date exists exactly when the invoice is paid: a paid
        // invoice without one gets today's date, anything else loses
        // whatever date the patch or the stored row carried.
        if merged.status == InvoiceStatus::Paid {
            if merged.payment_date.is_none() {
                merged.payment_date = Some(today);
            }
        } else {
            merged.payment_date = None;
        }

        let (tax_amount, total_amount) = compute_amounts(merged.pre_tax_amount, merged.tax_rate);
        merged.tax_amount = tax_amount;
        merged.total_amount = total_amount;

        let mut changed = Vec::new();
        if merged.invoice_number != current.invoice_number {
            changed.push("invoice_number");
        }
        if merged.invoice_date != current.invoice_date {
            changed.push("invoice_date");
        }
        if merged.due_date != current.due_date {
            changed.push("due_date");
        }
        if merged.period_start != current.period_start {
            changed.push("period_start");
        }
        if merged.period_end != current.period_end {
            changed.push("period_end");
        }
        if merged.pre_tax_amount != current.pre_tax_amount {
            changed.push("pre_tax_amount");
        }
        if merged.tax_rate != current.tax_rate {
            changed.push("tax_rate");
        }
        if merged.tax_amount != current.tax_amount {
            changed.push("tax_amount");
        }
        if merged.total_amount != current.total_amount {
            changed.push("total_amount");
        }
        if merged.description != current.description {
            changed.push("description");
        }
        if merged.payment_method != current.payment_method {
            changed.push("payment_method");
        }
        if merged.status != current.status {
            changed.push("status");
        }
        if merged.payment_date != current.payment_date {
            changed.push("payment_date");
        }

        if changed.is_empty() {
            debug!(invoice_id = id, "Invoice update is a no-op");
            return Ok(Vec::new());
        }

        if merged.invoice_number != current.invoice_number {
            ensure_number_unique(&mut tx, &merged.invoice_number, Some(id)).await?;
        }

        sqlx::query(
            "UPDATE invoices
             SET invoice_number = ?, invoice_date = ?, due_date = ?,
                 period_start = ?, period_end = ?, pre_tax_amount = ?,
                 tax_rate = ?, tax_amount = ?, total_amount = ?,
                 description = ?, payment_method = ?, status = ?,
                 payment_date = ?
             WHERE id = ?",
        )
        .bind(&merged.invoice_number)
        .bind(merged.invoice_date)
        .bind(merged.due_date)
        .bind(merged.period_start)
        .bind(merged.period_end)
        .bind(merged.pre_tax_amount)
        .bind(merged.tax_rate)
        .bind(merged.tax_amount)
        .bind(merged.total_amount)
        .bind(&merged.description)
        .bind(&merged.payment_method)
        .bind(merged.status)
        .bind(merged.payment_date)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(invoice_id = id, changed = changed.len(), "Invoice updated");
        Ok(changed.into_iter().map(str::to_string).collect())
    }

    // ---- deletion ----

    /// Invoices carry no dependents, so deletion is unconditional.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("invoice", id));
        }
        info!(invoice_id = id, "Invoice deleted");
        Ok(())
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
        sqlx::query_scalar("SELECT id FROM invoices WHERE invoice_number = ? AND id != ?")
            .bind(number)
            .bind(exclude_id.unwrap_or(-1))
            .fetch_optional(conn)
            .await?;
    if clash.is_some() {
        warn!(invoice_number = number, "Invoice number conflict");
        return Err(CoreError::duplicate("invoice", "invoice_number", number));
    }
    Ok(())
}
