//! End-to-end repository tests on in-memory SQLite databases.

use chrono::NaiveDate;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use dom_core::client::{
    ClientKind, ClientRepository, CorporatePatch, IndividualPatch, NewCorporateClient,
    NewIndividualClient,
};
use dom_core::contract::{
    ContractRepository, ContractStatus, DeleteOutcome, NewContract,
};
use dom_core::invoice::{InvoicePatch, InvoiceRepository, InvoiceStatus, NewInvoice};
use dom_core::payment::{NewPayment, PaymentRepository};
use dom_core::stats::StatsReader;
use dom_core::{store, CoreError};

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    store::init_schema(&pool).await.unwrap();
    pool
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn individual(surname: &str, given_name: &str, identity: &str) -> NewIndividualClient {
    NewIndividualClient {
        surname: surname.to_string(),
        given_name: given_name.to_string(),
        identity_number: identity.to_string(),
        phone: "0612345678".to_string(),
        ..Default::default()
    }
}

fn corporate(legal_name: &str, tax_id: &str) -> NewCorporateClient {
    NewCorporateClient {
        legal_name: legal_name.to_string(),
        tax_id: tax_id.to_string(),
        phone: "0522334455".to_string(),
        ..Default::default()
    }
}

fn contract_for(client_id: i64, kind: ClientKind, number: &str) -> NewContract {
    NewContract {
        contract_number: number.to_string(),
        client_id,
        client_kind: kind,
        service_type: "Standard".to_string(),
        start_date: date(2025, 1, 1),
        end_date: None,
        duration_months: 12,
        monthly_amount: 300.0,
        opening_fee: 0.0,
        deposit: 0.0,
        included_services: None,
        conditions: None,
        status: ContractStatus::Active,
    }
}

fn invoice_for(
    contract_id: i64,
    client_id: i64,
    kind: ClientKind,
    number: &str,
) -> NewInvoice {
    NewInvoice {
        invoice_number: number.to_string(),
        contract_id,
        client_id,
        client_kind: kind,
        invoice_date: date(2025, 2, 1),
        due_date: date(2025, 3, 1),
        period_start: None,
        period_end: None,
        pre_tax_amount: 2000.0,
        tax_rate: 20.0,
        description: None,
        payment_method: "transfer".to_string(),
        status: InvoiceStatus::Pending,
        payment_date: None,
    }
}

// ---- clients ----

#[tokio::test]
async fn duplicate_identity_rejected_then_accepted_after_distinct_value() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool);

    let martin = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();

    // Second individual with the same identity number is refused.
    let err = clients
        .create_individual(&individual("Pierre", "Jean", "AB123456"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Duplicate { field: "identity_number", .. }
    ));

    let pierre = clients
        .create_individual(&individual("Pierre", "Jean", "CD789012"))
        .await
        .unwrap();
    assert_ne!(martin, pierre);

    // Moving Pierre onto Martin's identity is refused too.
    let patch = IndividualPatch {
        identity_number: Some("AB123456".to_string()),
        ..Default::default()
    };
    let err = clients.update_individual(pierre, &patch, "admin").await.unwrap_err();
    assert!(matches!(err, CoreError::Duplicate { .. }));

    // The failed update left no audit trail.
    let history = clients.history(pierre, ClientKind::Individual).await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn update_writes_one_history_row_per_changed_field() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool);
    let id = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();

    let patch = IndividualPatch {
        phone: Some("0698765432".to_string()),
        email: Some("paul.martin@example.com".to_string()),
        ..Default::default()
    };
    let mut changed = clients.update_individual(id, &patch, "agent").await.unwrap();
    changed.sort();
    assert_eq!(changed, vec!["email".to_string(), "phone".to_string()]);

    let history = clients.history(id, ClientKind::Individual).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|entry| entry.actor == "agent"));
    let phone_row = history.iter().find(|e| e.field == "phone").unwrap();
    assert_eq!(phone_row.old_value.as_deref(), Some("0612345678"));
    assert_eq!(phone_row.new_value.as_deref(), Some("0698765432"));
    let email_row = history.iter().find(|e| e.field == "email").unwrap();
    assert_eq!(email_row.old_value, None);
}

#[tokio::test]
async fn noop_update_is_accepted_and_writes_nothing() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool);
    let id = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();

    // Same values, plus cosmetic whitespace and lowercase identity.
    let patch = IndividualPatch {
        surname: Some("  Martin ".to_string()),
        identity_number: Some("ab123456".to_string()),
        phone: Some("0612345678".to_string()),
        ..Default::default()
    };
    let changed = clients.update_individual(id, &patch, "admin").await.unwrap();
    assert!(changed.is_empty());
    assert!(clients.history(id, ClientKind::Individual).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_field_aborts_whole_update() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool);
    let id = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();

    // One good field, one bad: nothing must be applied.
    let patch = IndividualPatch {
        surname: Some("Durand".to_string()),
        phone: Some("123".to_string()),
        ..Default::default()
    };
    let err = clients.update_individual(id, &patch, "admin").await.unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    let stored = clients.find_individual(id).await.unwrap().unwrap();
    assert_eq!(stored.surname, "Martin");
    assert_eq!(stored.phone, "0612345678");
    assert!(clients.history(id, ClientKind::Individual).await.unwrap().is_empty());
}

#[tokio::test]
async fn corporate_duplicate_tax_id_and_update() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool);
    let atlas = clients
        .create_corporate(&corporate("Atlas Services SARL", "001234567890123"))
        .await
        .unwrap();
    let err = clients
        .create_corporate(&corporate("Rif Conseil SARL", "00123 45678 90123"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Duplicate { field: "tax_id", .. }));

    let patch = CorporatePatch {
        legal_form: Some("SARL AU".to_string()),
        ..Default::default()
    };
    let changed = clients.update_corporate(atlas, &patch, "admin").await.unwrap();
    assert_eq!(changed, vec!["legal_form".to_string()]);
    let history = clients.history(atlas, ClientKind::Corporate).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn client_delete_guard_holds_for_any_contract_status() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());

    let id = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    let contract_id = contracts
        .create(&contract_for(id, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap();

    // Blocked while a contract exists, even terminated.
    let err = clients.delete(id, ClientKind::Individual).await.unwrap_err();
    assert!(matches!(err, CoreError::DependencyBlocked { .. }));

    sqlx::query("UPDATE contracts SET status = 'terminated' WHERE id = ?")
        .bind(contract_id)
        .execute(&pool)
        .await
        .unwrap();
    let err = clients.delete(id, ClientKind::Individual).await.unwrap_err();
    assert!(matches!(err, CoreError::DependencyBlocked { .. }));

    // Gone once the dependents are gone.
    assert_eq!(contracts.delete(contract_id).await.unwrap(), DeleteOutcome::Deleted);
    clients.delete(id, ClientKind::Individual).await.unwrap();

    // A second delete is a not-found, not a silent success.
    let err = clients.delete(id, ClientKind::Individual).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn client_delete_guard_counts_invoices_too() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());
    let invoices = InvoiceRepository::new(pool.clone());

    let id = clients
        .create_corporate(&corporate("Atlas Services SARL", "001234567890123"))
        .await
        .unwrap();
    let contract_id = contracts
        .create(&contract_for(id, ClientKind::Corporate, "DOM-202501-0002"))
        .await
        .unwrap();
    let invoice_id = invoices
        .create(&invoice_for(contract_id, id, ClientKind::Corporate, "INV-202502-0001"))
        .await
        .unwrap();

    assert_eq!(contracts.delete(contract_id).await.unwrap(), DeleteOutcome::Deleted);
    // The invoice alone still blocks deletion.
    let err = clients.delete(id, ClientKind::Corporate).await.unwrap_err();
    assert!(matches!(err, CoreError::DependencyBlocked { .. }));

    invoices.delete(invoice_id).await.unwrap();
    clients.delete(id, ClientKind::Corporate).await.unwrap();
}

#[tokio::test]
async fn search_spans_both_kinds_unless_filtered() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool);
    clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    clients
        .create_corporate(&corporate("Martin Conseil SARL", "001234567890123"))
        .await
        .unwrap();

    let both = clients.search("martin", None).await.unwrap();
    assert_eq!(both.len(), 2);

    let only_corporate = clients
        .search("martin", Some(ClientKind::Corporate))
        .await
        .unwrap();
    assert_eq!(only_corporate.len(), 1);
    assert_eq!(only_corporate[0].kind(), ClientKind::Corporate);

    let by_identity = clients.search("AB1234", None).await.unwrap();
    assert_eq!(by_identity.len(), 1);
}

// ---- contracts ----

#[tokio::test]
async fn contract_end_date_uses_thirty_day_months() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool);

    let client = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    let id = contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap();

    let details = contracts.find(id).await.unwrap().unwrap();
    assert_eq!(details.contract.end_date, date(2025, 12, 27));
    assert_eq!(details.client_name.as_deref(), Some("Martin Paul"));
    assert_eq!(details.client_identifier.as_deref(), Some("AB123456"));
}

#[tokio::test]
async fn contract_requires_existing_client_and_unique_number() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool);

    let err = contracts
        .create(&contract_for(42, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: "client", .. }));

    let client = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap();
    let err = contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Duplicate { field: "contract_number", .. }
    ));
}

#[tokio::test]
async fn contract_update_recomputes_end_date_and_skips_noops() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool);

    let client = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    let id = contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap();

    let patch = dom_core::contract::ContractPatch {
        duration_months: Some(6),
        ..Default::default()
    };
    let mut changed = contracts.update(id, &patch).await.unwrap();
    changed.sort();
    assert_eq!(changed, vec!["duration_months".to_string(), "end_date".to_string()]);
    let details = contracts.find(id).await.unwrap().unwrap();
    assert_eq!(details.contract.end_date, date(2025, 6, 30));

    // Re-applying the same duration changes nothing.
    let changed = contracts.update(id, &patch).await.unwrap();
    assert!(changed.is_empty());

    // Amounts are guarded on the merged values.
    let bad = dom_core::contract::ContractPatch {
        monthly_amount: Some(-5.0),
        ..Default::default()
    };
    let err = contracts.update(id, &bad).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
}

#[tokio::test]
async fn contract_delete_is_soft_with_payments_hard_without() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());
    let payments = PaymentRepository::new(pool);

    let client = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    let paid = contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap();
    let unpaid = contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0002"))
        .await
        .unwrap();

    payments
        .record(&NewPayment {
            contract_id: paid,
            amount: 300.0,
            payment_date: date(2025, 2, 1),
            method: "cash".to_string(),
            reference: None,
        })
        .await
        .unwrap();

    // Financial trail: the paid contract survives as terminated.
    assert_eq!(contracts.delete(paid).await.unwrap(), DeleteOutcome::Terminated);
    let kept = contracts.find(paid).await.unwrap().unwrap();
    assert_eq!(kept.contract.status, ContractStatus::Terminated);

    assert_eq!(contracts.delete(unpaid).await.unwrap(), DeleteOutcome::Deleted);
    assert!(contracts.find(unpaid).await.unwrap().is_none());
}

#[tokio::test]
async fn expiring_within_excludes_expired_and_inactive() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());
    let client = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();

    let mut soon = contract_for(client, ClientKind::Individual, "DOM-202501-0001");
    soon.end_date = Some(date(2025, 6, 20));
    let soon = contracts.create(&soon).await.unwrap();

    let mut expired = contract_for(client, ClientKind::Individual, "DOM-202501-0002");
    expired.end_date = Some(date(2025, 6, 1));
    contracts.create(&expired).await.unwrap();

    let mut suspended = contract_for(client, ClientKind::Individual, "DOM-202501-0003");
    suspended.end_date = Some(date(2025, 6, 25));
    suspended.status = ContractStatus::Suspended;
    contracts.create(&suspended).await.unwrap();

    let today = date(2025, 6, 15);
    let expiring = contracts.expiring_within(30, today).await.unwrap();
    assert_eq!(expiring.len(), 1);
    assert_eq!(expiring[0].contract.id, soon);
}

// ---- invoices ----

#[tokio::test]
async fn invoice_amounts_are_server_computed() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());
    let invoices = InvoiceRepository::new(pool);

    let client = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    let contract = contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap();
    let id = invoices
        .create(&invoice_for(contract, client, ClientKind::Individual, "INV-202502-0001"))
        .await
        .unwrap();

    let invoice = invoices.find(id).await.unwrap().unwrap();
    assert_eq!(invoice.tax_amount, 400.0);
    assert_eq!(invoice.total_amount, 2400.0);

    // Editing the pre-tax amount recomputes both derived figures.
    let patch = InvoicePatch {
        pre_tax_amount: Some(1000.0),
        ..Default::default()
    };
    let changed = invoices.update(id, &patch, date(2025, 2, 10)).await.unwrap();
    assert!(changed.contains(&"tax_amount".to_string()));
    assert!(changed.contains(&"total_amount".to_string()));
    let invoice = invoices.find(id).await.unwrap().unwrap();
    assert_eq!(invoice.tax_amount, 200.0);
    assert_eq!(invoice.total_amount, 1200.0);
}

#[tokio::test]
async fn overdue_is_a_read_time_projection() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());
    let invoices = InvoiceRepository::new(pool);

    let client = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    let contract = contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap();
    let id = invoices
        .create(&invoice_for(contract, client, ClientKind::Individual, "INV-202502-0001"))
        .await
        .unwrap();

    let invoice = invoices.find(id).await.unwrap().unwrap();
    // Persisted status stays pending whichever day we look at it.
    assert_eq!(invoice.status, InvoiceStatus::Pending);
    assert_eq!(invoice.effective_status(date(2025, 2, 15)), InvoiceStatus::Pending);
    assert_eq!(invoice.effective_status(date(2025, 3, 2)), InvoiceStatus::Overdue);

    let stored = invoices.list_by_status(InvoiceStatus::Pending).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(invoices
        .list_by_status(InvoiceStatus::Overdue)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn invoice_paid_transition_manages_payment_date() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());
    let invoices = InvoiceRepository::new(pool);

    let client = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    let contract = contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap();
    let id = invoices
        .create(&invoice_for(contract, client, ClientKind::Individual, "INV-202502-0001"))
        .await
        .unwrap();

    let today = date(2025, 2, 20);
    let patch = InvoicePatch {
        status: Some(InvoiceStatus::Paid),
        ..Default::default()
    };
    invoices.update(id, &patch, today).await.unwrap();
    let invoice = invoices.find(id).await.unwrap().unwrap();
    assert_eq!(invoice.payment_date, Some(today));

    // Reverting to pending clears the payment date.
    let patch = InvoicePatch {
        status: Some(InvoiceStatus::Pending),
        ..Default::default()
    };
    invoices.update(id, &patch, today).await.unwrap();
    let invoice = invoices.find(id).await.unwrap().unwrap();
    assert_eq!(invoice.payment_date, None);
}

#[tokio::test]
async fn payment_date_present_exactly_when_paid() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());
    let invoices = InvoiceRepository::new(pool);

    let client = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    let contract = contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap();

    // Creating a paid invoice without a payment date is refused.
    let mut paid = invoice_for(contract, client, ClientKind::Individual, "INV-202502-0001");
    paid.status = InvoiceStatus::Paid;
    let err = invoices.create(&paid).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    // With a date it is stored as supplied.
    paid.payment_date = Some(date(2025, 2, 10));
    let paid_id = invoices.create(&paid).await.unwrap();
    let stored = invoices.find(paid_id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Paid);
    assert_eq!(stored.payment_date, Some(date(2025, 2, 10)));

    // A pending invoice cannot carry a payment date at creation.
    let mut dated = invoice_for(contract, client, ClientKind::Individual, "INV-202502-0002");
    dated.payment_date = Some(date(2025, 2, 15));
    let err = invoices.create(&dated).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    // Patching only a payment date onto a pending invoice stores nothing.
    let pending_id = invoices
        .create(&invoice_for(contract, client, ClientKind::Individual, "INV-202502-0003"))
        .await
        .unwrap();
    let patch = InvoicePatch {
        payment_date: Some("2025-02-15".to_string()),
        ..Default::default()
    };
    let changed = invoices.update(pending_id, &patch, date(2025, 2, 20)).await.unwrap();
    assert!(changed.is_empty());
    let stored = invoices.find(pending_id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Pending);
    assert_eq!(stored.payment_date, None);

    // Cancelling a paid invoice drops the payment date with the status.
    let patch = InvoicePatch {
        status: Some(InvoiceStatus::Cancelled),
        ..Default::default()
    };
    invoices.update(paid_id, &patch, date(2025, 2, 20)).await.unwrap();
    let stored = invoices.find(paid_id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Cancelled);
    assert_eq!(stored.payment_date, None);
}

#[tokio::test]
async fn invoice_date_chronology_rechecked_on_either_date() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());
    let invoices = InvoiceRepository::new(pool);

    let client = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    let contract = contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap();
    let id = invoices
        .create(&invoice_for(contract, client, ClientKind::Individual, "INV-202502-0001"))
        .await
        .unwrap();

    // Pushing the invoice date past the stored due date must fail.
    let patch = InvoicePatch {
        invoice_date: Some(date(2025, 3, 15)),
        ..Default::default()
    };
    let err = invoices.update(id, &patch, date(2025, 2, 20)).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    // And pulling the due date before the stored invoice date.
    let patch = InvoicePatch {
        due_date: Some(date(2025, 1, 15)),
        ..Default::default()
    };
    let err = invoices.update(id, &patch, date(2025, 2, 20)).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
}

#[tokio::test]
async fn invoice_number_conflicts_on_create_and_update() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());
    let invoices = InvoiceRepository::new(pool);

    let client = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    let contract = contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap();
    invoices
        .create(&invoice_for(contract, client, ClientKind::Individual, "INV-202502-0001"))
        .await
        .unwrap();
    let second = invoices
        .create(&invoice_for(contract, client, ClientKind::Individual, "INV-202502-0002"))
        .await
        .unwrap();

    let err = invoices
        .create(&invoice_for(contract, client, ClientKind::Individual, "INV-202502-0001"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Duplicate { field: "invoice_number", .. }
    ));

    let patch = InvoicePatch {
        invoice_number: Some("INV-202502-0001".to_string()),
        ..Default::default()
    };
    let err = invoices.update(second, &patch, date(2025, 2, 20)).await.unwrap_err();
    assert!(matches!(err, CoreError::Duplicate { .. }));

    // Re-submitting its own number is a no-op, not a conflict.
    let patch = InvoicePatch {
        invoice_number: Some("INV-202502-0002".to_string()),
        ..Default::default()
    };
    let changed = invoices.update(second, &patch, date(2025, 2, 20)).await.unwrap();
    assert!(changed.is_empty());
}

// ---- payments and stats ----

#[tokio::test]
async fn payments_are_guarded_and_summed() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());
    let payments = PaymentRepository::new(pool);

    let client = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    let contract = contracts
        .create(&contract_for(client, ClientKind::Individual, "DOM-202501-0001"))
        .await
        .unwrap();

    let err = payments
        .record(&NewPayment {
            contract_id: contract,
            amount: 0.0,
            payment_date: date(2025, 2, 1),
            method: "cash".to_string(),
            reference: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    let err = payments
        .record(&NewPayment {
            contract_id: 999,
            amount: 100.0,
            payment_date: date(2025, 2, 1),
            method: "cash".to_string(),
            reference: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: "contract", .. }));

    for (amount, day) in [(300.0, 1), (300.0, 2)] {
        payments
            .record(&NewPayment {
                contract_id: contract,
                amount,
                payment_date: date(2025, 2, day),
                method: "transfer".to_string(),
                reference: Some(format!("VIR-{}", day)),
            })
            .await
            .unwrap();
    }

    assert_eq!(payments.list_for_contract(contract).await.unwrap().len(), 2);
    assert_eq!(payments.total_collected().await.unwrap(), 600.0);
}

#[tokio::test]
async fn statistics_overview_recomputes_from_store() {
    let pool = test_pool().await;
    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());
    let payments = PaymentRepository::new(pool.clone());
    let stats = StatsReader::new(pool);

    let martin = clients
        .create_individual(&individual("Martin", "Paul", "AB123456"))
        .await
        .unwrap();
    let atlas = clients
        .create_corporate(&corporate("Atlas Services SARL", "001234567890123"))
        .await
        .unwrap();

    // Active, 300/month for 12 months, expiring within the window.
    let mut active = contract_for(martin, ClientKind::Individual, "DOM-202501-0001");
    active.end_date = Some(date(2025, 7, 1));
    let active = contracts.create(&active).await.unwrap();

    // Active but already past its end date.
    let mut expired = contract_for(atlas, ClientKind::Corporate, "DOM-202501-0002");
    expired.end_date = Some(date(2025, 5, 1));
    expired.monthly_amount = 500.0;
    contracts.create(&expired).await.unwrap();

    // Suspended: excluded from revenue.
    let mut suspended = contract_for(martin, ClientKind::Individual, "DOM-202501-0003");
    suspended.status = ContractStatus::Suspended;
    contracts.create(&suspended).await.unwrap();

    payments
        .record(&NewPayment {
            contract_id: active,
            amount: 450.0,
            payment_date: date(2025, 6, 1),
            method: "cash".to_string(),
            reference: None,
        })
        .await
        .unwrap();

    let today = date(2025, 6, 15);
    let overview = stats.overview(today, 30).await.unwrap();
    assert_eq!(overview.individual_clients, 1);
    assert_eq!(overview.corporate_clients, 1);
    assert_eq!(overview.active_contracts, 2);
    assert_eq!(overview.suspended_contracts, 1);
    assert_eq!(overview.expired_active_contracts, 1);
    assert_eq!(overview.expiring_soon, 1);
    assert_eq!(overview.monthly_recurring_revenue, 800.0);
    assert_eq!(overview.total_potential_revenue, 300.0 * 12.0 + 500.0 * 12.0);
    assert_eq!(overview.total_collected, 450.0);

    let by_service = stats.active_by_service_type().await.unwrap();
    assert_eq!(by_service.len(), 1);
    assert_eq!(by_service[0].service_type, "Standard");
    assert_eq!(by_service[0].contracts, 2);
    assert_eq!(by_service[0].monthly_total, 800.0);
}
