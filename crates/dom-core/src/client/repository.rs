//! Client persistence operations.
//!
//! Updates follow a strict discipline: load the stored row, merge the
//! patch onto it, validate everything, drop no-op fields, re-check
//! unique keys excluding the row itself, write one UPDATE, and append
//! one change-history row per field that actually changed, all inside
//! a single transaction.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::audit;
use crate::client::entity::{
    Client, ClientKind, CorporateClient, CorporatePatch, IndividualClient, IndividualPatch,
    NewCorporateClient, NewIndividualClient,
};
use crate::error::{CoreError, Result};
use crate::validation;

/// A recorded field change: name, old value, new value.
type FieldChange = (&'static str, Option<String>, Option<String>);

#[derive(Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
}

impl ClientRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ---- creation ----

    pub async fn create_individual(&self, form: &NewIndividualClient) -> Result<i64> {
        let form = form.normalized();
        let errors = form.validate();
        if !errors.is_empty() {
            warn!(count = errors.len(), "Individual client rejected by validation");
            return Err(CoreError::validation(errors));
        }

        let mut tx = self.pool.begin().await?;
        ensure_unique(
            &mut tx,
            "individual_clients",
            "identity_number",
            &form.identity_number,
            None,
        )
        .await?;

        let result = sqlx::query(
            "INSERT INTO individual_clients
                (surname, given_name, sex, identity_number, phone, email,
                 address, birth_date, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&form.surname)
        .bind(&form.given_name)
        .bind(&form.sex)
        .bind(&form.identity_number)
        .bind(&form.phone)
        .bind(&form.email)
        .bind(&form.address)
        .bind(form.birth_date)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let id = result.last_insert_rowid();
        info!(client_id = id, identity_number = %form.identity_number, "Individual client created");
        Ok(id)
    }

    pub async fn create_corporate(&self, form: &NewCorporateClient) -> Result<i64> {
        let form = form.normalized();
        let errors = form.validate();
        if !errors.is_empty() {
            warn!(count = errors.len(), "Corporate client rejected by validation");
            return Err(CoreError::validation(errors));
        }

        let mut tx = self.pool.begin().await?;
        ensure_unique(&mut tx, "corporate_clients", "tax_id", &form.tax_id, None).await?;

        let result = sqlx::query(
            "INSERT INTO corporate_clients
                (legal_name, tax_id, registration_number, legal_form, phone,
                 email, address, rep_surname, rep_given_name,
                 rep_identity_number, rep_capacity, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&form.legal_name)
        .bind(&form.tax_id)
        .bind(&form.registration_number)
        .bind(&form.legal_form)
        .bind(&form.phone)
        .bind(&form.email)
        .bind(&form.address)
        .bind(&form.rep_surname)
        .bind(&form.rep_given_name)
        .bind(&form.rep_identity_number)
        .bind(&form.rep_capacity)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let id = result.last_insert_rowid();
        info!(client_id = id, tax_id = %form.tax_id, "Corporate client created");
        Ok(id)
    }

    // ---- reads ----

    pub async fn find_individual(&self, id: i64) -> Result<Option<IndividualClient>> {
        let client = sqlx::query_as("SELECT * FROM individual_clients WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(client)
    }

    pub async fn find_corporate(&self, id: i64) -> Result<Option<CorporateClient>> {
        let client = sqlx::query_as("SELECT * FROM corporate_clients WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(client)
    }

    pub async fn list_individuals(&self) -> Result<Vec<IndividualClient>> {
        let clients = sqlx::query_as(
            "SELECT * FROM individual_clients ORDER BY surname, given_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(clients)
    }

    pub async fn list_corporates(&self) -> Result<Vec<CorporateClient>> {
        let clients = sqlx::query_as("SELECT * FROM corporate_clients ORDER BY legal_name")
            .fetch_all(&self.pool)
            .await?;
        Ok(clients)
    }

    /// Kind-dispatching listing for callers holding a runtime kind.
    pub async fn list(&self, kind: ClientKind) -> Result<Vec<Client>> {
        let clients = match kind {
            ClientKind::Individual => self
                .list_individuals()
                .await?
                .into_iter()
                .map(Client::Individual)
                .collect(),
            ClientKind::Corporate => self
                .list_corporates()
                .await?
                .into_iter()
                .map(Client::Corporate)
                .collect(),
        };
        Ok(clients)
    }

    /// Case-insensitive substring search across name, identifier and
    /// phone. Searches both tables unless a kind is given; mixed
    /// results are ordered by id.
    pub async fn search(&self, term: &str, kind: Option<ClientKind>) -> Result<Vec<Client>> {
        let pattern = format!("%{}%", term.trim());
        let mut results = Vec::new();

        if kind.is_none() || kind == Some(ClientKind::Individual) {
            let rows: Vec<IndividualClient> = sqlx::query_as(
                "SELECT * FROM individual_clients
                 WHERE surname LIKE ?1 OR given_name LIKE ?1
                    OR identity_number LIKE ?1 OR phone LIKE ?1
                 ORDER BY id",
            )
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await?;
            results.extend(rows.into_iter().map(Client::Individual));
        }
        if kind.is_none() || kind == Some(ClientKind::Corporate) {
            let rows: Vec<CorporateClient> = sqlx::query_as(
                "SELECT * FROM corporate_clients
                 WHERE legal_name LIKE ?1 OR tax_id LIKE ?1 OR phone LIKE ?1
                 ORDER BY id",
            )
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await?;
            results.extend(rows.into_iter().map(Client::Corporate));
        }

        if kind.is_none() {
            results.sort_by_key(Client::id);
        }
        debug!(term, count = results.len(), "Client search");
        Ok(results)
    }

    /// Change history for one client, newest first.
    pub async fn history(
        &self,
        id: i64,
        kind: ClientKind,
    ) -> Result<Vec<audit::ChangeHistoryEntry>> {
        audit::for_client(&self.pool, id, kind).await
    }

    // ---- updates ----

    /// Apply a partial update. Returns the names of the fields that
    /// actually changed; an empty list is an accepted no-op that
    /// writes nothing, including no history rows.
    pub async fn update_individual(
        &self,
        id: i64,
        patch: &IndividualPatch,
        actor: &str,
    ) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let current: IndividualClient =
            sqlx::query_as("SELECT * FROM individual_clients WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| CoreError::not_found("client", id))?;

        let mut merged = current.clone();
        let mut errors = Vec::new();

        if let Some(raw) = &patch.surname {
            merged.surname = raw.trim().to_string();
            if merged.surname.chars().count() < 2 {
                errors.push("surname must be at least 2 characters".to_string());
            }
        }
        if let Some(raw) = &patch.given_name {
            merged.given_name = raw.trim().to_string();
            if merged.given_name.chars().count() < 2 {
                errors.push("given name must be at least 2 characters".to_string());
            }
        }
        if let Some(raw) = &patch.sex {
            merged.sex = non_empty(raw);
            if let Some(sex) = &merged.sex {
                if !matches!(sex.as_str(), "M" | "F" | "Other") {
                    errors.push("sex must be one of M, F, Other".to_string());
                }
            }
        }
        if let Some(raw) = &patch.identity_number {
            merged.identity_number = validation::canonical_identity_number(raw);
            if !validation::is_valid_identity_number(&merged.identity_number) {
                errors.push(format!(
                    "invalid identity number '{}' (expected 2 letters + 6 digits)",
                    raw.trim()
                ));
            }
        }
        if let Some(raw) = &patch.phone {
            merged.phone = raw.trim().to_string();
            if !validation::is_valid_phone(&merged.phone) {
                errors.push(format!("invalid phone number '{}'", merged.phone));
            }
        }
        if let Some(raw) = &patch.email {
            merged.email = non_empty(raw);
            if let Some(email) = &merged.email {
                if !validation::is_valid_email(email) {
                    errors.push(format!("invalid email '{}'", email));
                }
            }
        }
        if let Some(raw) = &patch.address {
            merged.address = non_empty(raw);
        }
        if let Some(raw) = &patch.birth_date {
            match non_empty(raw) {
                None => merged.birth_date = None,
                Some(value) => match validation::parse_iso_date(&value) {
                    Some(date) => merged.birth_date = Some(date),
                    None => errors.push(format!("'{}' is not a YYYY-MM-DD date", value)),
                },
            }
        }

        // Any invalid field aborts the whole update.
        if !errors.is_empty() {
            warn!(client_id = id, count = errors.len(), "Individual update rejected");
            return Err(CoreError::validation(errors));
        }

        let mut changes: Vec<FieldChange> = Vec::new();
        push_change(&mut changes, "surname", &current.surname, &merged.surname);
        push_change(&mut changes, "given_name", &current.given_name, &merged.given_name);
        push_opt_change(&mut changes, "sex", &current.sex, &merged.sex);
        push_change(
            &mut changes,
            "identity_number",
            &current.identity_number,
            &merged.identity_number,
        );
        push_change(&mut changes, "phone", &current.phone, &merged.phone);
        push_opt_change(&mut changes, "email", &current.email, &merged.email);
        push_opt_change(&mut changes, "address", &current.address, &merged.address);
        push_opt_change(
            &mut changes,
            "birth_date",
            &current.birth_date.map(|d| d.to_string()),
            &merged.birth_date.map(|d| d.to_string()),
        );

        if changes.is_empty() {
            debug!(client_id = id, "Individual update is a no-op");
            return Ok(Vec::new());
        }

        if merged.identity_number != current.identity_number {
            ensure_unique(
                &mut tx,
                "individual_clients",
                "identity_number",
                &merged.identity_number,
                Some(id),
            )
            .await?;
        }

        sqlx::query(
            "UPDATE individual_clients
             SET surname = ?, given_name = ?, sex = ?, identity_number = ?,
                 phone = ?, email = ?, address = ?, birth_date = ?
             WHERE id = ?",
        )
        .bind(&merged.surname)
        .bind(&merged.given_name)
        .bind(&merged.sex)
        .bind(&merged.identity_number)
        .bind(&merged.phone)
        .bind(&merged.email)
        .bind(&merged.address)
        .bind(merged.birth_date)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        for (field, old, new) in &changes {
            audit::append(
                &mut tx,
                id,
                ClientKind::Individual,
                field,
                old.as_deref(),
                new.as_deref(),
                actor,
            )
            .await?;
        }
        tx.commit().await?;

        info!(client_id = id, changed = changes.len(), "Individual client updated");
        Ok(changes.into_iter().map(|(f, _, _)| f.to_string()).collect())
    }

    /// Corporate counterpart of [`update_individual`](Self::update_individual).
    pub async fn update_corporate(
        &self,
        id: i64,
        patch: &CorporatePatch,
        actor: &str,
    ) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let current: CorporateClient =
            sqlx::query_as("SELECT * FROM corporate_clients WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| CoreError::not_found("client", id))?;

        let mut merged = current.clone();
        let mut errors = Vec::new();

        if let Some(raw) = &patch.legal_name {
            merged.legal_name = raw.trim().to_string();
            if merged.legal_name.chars().count() < 3 {
                errors.push("legal name must be at least 3 characters".to_string());
            }
        }
        if let Some(raw) = &patch.tax_id {
            merged.tax_id = validation::canonical_tax_id(raw);
            if !validation::is_valid_tax_id(&merged.tax_id) {
                errors.push(format!(
                    "invalid tax identifier '{}' (expected 15 digits)",
                    raw.trim()
                ));
            }
        }
        if let Some(raw) = &patch.registration_number {
            merged.registration_number = non_empty(raw);
        }
        if let Some(raw) = &patch.legal_form {
            merged.legal_form = non_empty(raw);
        }
        if let Some(raw) = &patch.phone {
            merged.phone = raw.trim().to_string();
            if !validation::is_valid_phone(&merged.phone) {
                errors.push(format!("invalid phone number '{}'", merged.phone));
            }
        }
        if let Some(raw) = &patch.email {
            merged.email = non_empty(raw);
            if let Some(email) = &merged.email {
                if !validation::is_valid_email(email) {
                    errors.push(format!("invalid email '{}'", email));
                }
            }
        }
        if let Some(raw) = &patch.address {
            merged.address = non_empty(raw);
        }
        if let Some(raw) = &patch.rep_surname {
            merged.rep_surname = non_empty(raw);
        }
        if let Some(raw) = &patch.rep_given_name {
            merged.rep_given_name = non_empty(raw);
        }
        if let Some(raw) = &patch.rep_identity_number {
            merged.rep_identity_number =
                non_empty(raw).map(|v| validation::canonical_identity_number(&v));
            if let Some(rep) = &merged.rep_identity_number {
                if !validation::is_valid_identity_number(rep) {
                    errors.push(format!("invalid representative identity number '{}'", rep));
                }
            }
        }
        if let Some(raw) = &patch.rep_capacity {
            merged.rep_capacity = non_empty(raw);
        }

        if !errors.is_empty() {
            warn!(client_id = id, count = errors.len(), "Corporate update rejected");
            return Err(CoreError::validation(errors));
        }

        let mut changes: Vec<FieldChange> = Vec::new();
        push_change(&mut changes, "legal_name", &current.legal_name, &merged.legal_name);
        push_change(&mut changes, "tax_id", &current.tax_id, &merged.tax_id);
        push_opt_change(
            &mut changes,
            "registration_number",
            &current.registration_number,
            &merged.registration_number,
        );
        push_opt_change(&mut changes, "legal_form", &current.legal_form, &merged.legal_form);
        push_change(&mut changes, "phone", &current.phone, &merged.phone);
        push_opt_change(&mut changes, "email", &current.email, &merged.email);
        push_opt_change(&mut changes, "address", &current.address, &merged.address);
        push_opt_change(&mut changes, "rep_surname", &current.rep_surname, &merged.rep_surname);
        push_opt_change(
            &mut changes,
            "rep_given_name",
            &current.rep_given_name,
            &merged.rep_given_name,
        );
        push_opt_change(
            &mut changes,
            "rep_identity_number",
            &current.rep_identity_number,
            &merged.rep_identity_number,
        );
        push_opt_change(
            &mut changes,
            "rep_capacity",
            &current.rep_capacity,
            &merged.rep_capacity,
        );

        if changes.is_empty() {
            debug!(client_id = id, "Corporate update is a no-op");
            return Ok(Vec::new());
        }

        if merged.tax_id != current.tax_id {
            ensure_unique(&mut tx, "corporate_clients", "tax_id", &merged.tax_id, Some(id))
                .await?;
        }

        sqlx::query(
            "UPDATE corporate_clients
             SET legal_name = ?, tax_id = ?, registration_number = ?,
                 legal_form = ?, phone = ?, email = ?, address = ?,
                 rep_surname = ?, rep_given_name = ?, rep_identity_number = ?,
                 rep_capacity = ?
             WHERE id = ?",
        )
        .bind(&merged.legal_name)
        .bind(&merged.tax_id)
        .bind(&merged.registration_number)
        .bind(&merged.legal_form)
        .bind(&merged.phone)
        .bind(&merged.email)
        .bind(&merged.address)
        .bind(&merged.rep_surname)
        .bind(&merged.rep_given_name)
        .bind(&merged.rep_identity_number)
        .bind(&merged.rep_capacity)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        for (field, old, new) in &changes {
            audit::append(
                &mut tx,
                id,
                ClientKind::Corporate,
                field,
                old.as_deref(),
                new.as_deref(),
                actor,
            )
            .await?;
        }
        tx.commit().await?;

        info!(client_id = id, changed = changes.len(), "Corporate client updated");
        Ok(changes.into_iter().map(|(f, _, _)| f.to_string()).collect())
    }

    // ---- deletion ----

    /// Hard delete, refused while any contract (whatever its status) or
    /// invoice still references the client.
    pub async fn delete(&self, id: i64, kind: ClientKind) -> Result<()> {
        let table = match kind {
            ClientKind::Individual => "individual_clients",
            ClientKind::Corporate => "corporate_clients",
        };

        let mut tx = self.pool.begin().await?;
        let exists: Option<i64> =
            sqlx::query_scalar(&format!("SELECT id FROM {} WHERE id = ?", table))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(CoreError::not_found("client", id));
        }

        let contracts: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM contracts WHERE client_id = ? AND client_kind = ?",
        )
        .bind(id)
        .bind(kind)
        .fetch_one(&mut *tx)
        .await?;
        let invoices: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM invoices WHERE client_id = ? AND client_kind = ?",
        )
        .bind(id)
        .bind(kind)
        .fetch_one(&mut *tx)
        .await?;

        if contracts > 0 || invoices > 0 {
            warn!(client_id = id, kind = %kind, contracts, invoices, "Client deletion blocked");
            return Err(CoreError::dependency_blocked(
                "client",
                id,
                format!("{} contract(s) and {} invoice(s) reference it", contracts, invoices),
            ));
        }

        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(client_id = id, kind = %kind, "Client deleted");
        Ok(())
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

fn push_change(changes: &mut Vec<FieldChange>, field: &'static str, old: &str, new: &str) {
    if old != new {
        changes.push((field, Some(old.to_string()), Some(new.to_string())));
    }
}

fn push_opt_change(
    changes: &mut Vec<FieldChange>,
    field: &'static str,
    old: &Option<String>,
    new: &Option<String>,
) {
    if old != new {
        changes.push((field, old.clone(), new.clone()));
    }
}

/// Fail with `Duplicate` when another row (excluding `exclude_id`)
/// already holds `value` in the unique column.
async fn ensure_unique(
    conn: &mut SqliteConnection,
    table: &'static str,
    column: &'static str,
    value: &str,
    exclude_id: Option<i64>,
) -> Result<()> {
    let clash: Option<i64> = sqlx::query_scalar(&format!(
        "SELECT id FROM {} WHERE {} = ? AND id != ?",
        table, column
    ))
    .bind(value)
    .bind(exclude_id.unwrap_or(-1))
    .fetch_optional(conn)
    .await?;

    if clash.is_some() {
        warn!(table, column, value, "Unique-key conflict");
        return Err(CoreError::duplicate("client", column, value));
    }
    Ok(())
}
