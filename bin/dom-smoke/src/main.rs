//! End-to-end smoke test for the domiciliation core.
//!
//! Exercises the full data layer against a throwaway SQLite database:
//! validation, client CRUD with audit history, contracts, invoices,
//! payments and statistics. Exits non-zero on the first broken check,
//! so it can gate deployments.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::info;

use dom_core::client::{ClientKind, ClientRepository, IndividualPatch, NewCorporateClient, NewIndividualClient};
use dom_core::contract::{ContractStatus, ContractRepository, DeleteOutcome, NewContract};
use dom_core::invoice::{InvoiceRepository, InvoiceStatus, NewInvoice};
use dom_core::payment::{NewPayment, PaymentRepository};
use dom_core::stats::StatsReader;
use dom_core::{numbering, store, validation, CoreError};

#[derive(Parser, Debug)]
#[command(name = "dom-smoke", about = "Run the data-layer smoke test")]
struct Args {
    /// SQLite URL to run against; default is a throwaway temp file
    #[arg(long, env = "DOMICILIA_DATABASE_URL")]
    database_url: Option<String>,

    /// Take the database URL from the TOML config instead
    #[arg(long, conflicts_with = "database_url")]
    from_config: bool,

    /// Print the final statistics overview as JSON
    #[arg(long)]
    json_stats: bool,
}

struct Tally {
    passed: u32,
    failed: u32,
}

impl Tally {
    fn new() -> Self {
        Self { passed: 0, failed: 0 }
    }

    fn check(&mut self, name: &str, ok: bool) {
        if ok {
            self.passed += 1;
            println!("  ok   {}", name);
        } else {
            self.failed += 1;
            println!("  FAIL {}", name);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dom_common::logging::init_logging("dom-smoke");
    let args = Args::parse();

    let mut _tmp_guard: Option<tempfile::TempDir> = None;
    let mut actor = "smoke".to_string();
    let (url, max_connections) = if args.from_config {
        let config = dom_config::AppConfig::load().context("loading configuration")?;
        actor = config.audit.default_actor;
        (config.database.url, config.database.max_connections)
    } else {
        match args.database_url {
            Some(url) => (url, 5),
            None => {
                let dir = tempfile::tempdir().context("creating temp directory")?;
                let url = format!("sqlite://{}?mode=rwc", dir.path().join("smoke.db").display());
                _tmp_guard = Some(dir);
                (url, 5)
            }
        }
    };

    info!(%url, "Smoke test starting");
    let pool = store::connect(&url, max_connections).await?;

    let clients = ClientRepository::new(pool.clone());
    let contracts = ContractRepository::new(pool.clone());
    let invoices = InvoiceRepository::new(pool.clone());
    let payments = PaymentRepository::new(pool.clone());
    let stats = StatsReader::new(pool.clone());

    let today = Utc::now().date_naive();
    let mut tally = Tally::new();

    // -- validation rules --
    tally.check("identity number format", validation::is_valid_identity_number("AB123456"));
    tally.check("identity number rejects junk", !validation::is_valid_identity_number("12AB3456"));
    tally.check("tax id ignores spaces", validation::is_valid_tax_id("00123 45678 90123"));
    tally.check("phone local form", validation::is_valid_phone("06 12 34 56 78"));
    tally.check("phone intl form", validation::is_valid_phone("+212612345678"));
    tally.check("empty email accepted", validation::is_valid_email(""));

    // -- clients --
    let martin = clients
        .create_individual(&NewIndividualClient {
            surname: "Martin".into(),
            given_name: "Paul".into(),
            identity_number: "AB123456".into(),
            phone: "0612345678".into(),
            ..Default::default()
        })
        .await?;
    tally.check("individual created", martin > 0);

    let duplicate = clients
        .create_individual(&NewIndividualClient {
            surname: "Pierre".into(),
            given_name: "Jean".into(),
            identity_number: "AB123456".into(),
            phone: "0698765432".into(),
            ..Default::default()
        })
        .await;
    tally.check(
        "duplicate identity refused",
        matches!(duplicate, Err(CoreError::Duplicate { .. })),
    );

    let atlas = clients
        .create_corporate(&NewCorporateClient {
            legal_name: "Atlas Services SARL".into(),
            tax_id: "001234567890123".into(),
            phone: "0522334455".into(),
            ..Default::default()
        })
        .await?;
    tally.check("corporate created", atlas > 0);

    let changed = clients
        .update_individual(
            martin,
            &IndividualPatch {
                phone: Some("0698765432".into()),
                email: Some("paul.martin@example.com".into()),
                ..Default::default()
            },
            &actor,
        )
        .await?;
    tally.check("update reports changed fields", changed.len() == 2);
    let history = clients.history(martin, ClientKind::Individual).await?;
    tally.check("audit rows written", history.len() == 2);

    let noop = clients
        .update_individual(
            martin,
            &IndividualPatch {
                phone: Some("0698765432".into()),
                ..Default::default()
            },
            &actor,
        )
        .await?;
    tally.check("no-op update writes nothing", noop.is_empty());
    tally.check(
        "no-op update leaves history alone",
        clients.history(martin, ClientKind::Individual).await?.len() == 2,
    );

    // -- contracts --
    let contract = contracts
        .create(&NewContract {
            contract_number: numbering::contract_number(today),
            client_id: martin,
            client_kind: ClientKind::Individual,
            service_type: "Standard".into(),
            start_date: today,
            end_date: None,
            duration_months: 12,
            monthly_amount: 300.0,
            opening_fee: 500.0,
            deposit: 0.0,
            included_services: None,
            conditions: None,
            status: ContractStatus::Active,
        })
        .await?;
    let details = contracts
        .find(contract)
        .await?
        .context("contract just created must be readable")?;
    tally.check(
        "end date derived from 30-day months",
        details.contract.end_date == today + Duration::days(360),
    );
    tally.check(
        "contract joined with client name",
        details.client_name.as_deref() == Some("Martin Paul"),
    );

    let guard = clients.delete(martin, ClientKind::Individual).await;
    tally.check(
        "client delete blocked by contract",
        matches!(guard, Err(CoreError::DependencyBlocked { .. })),
    );

    // -- invoices --
    let invoice = invoices
        .create(&NewInvoice {
            invoice_number: numbering::invoice_number(today),
            contract_id: contract,
            client_id: martin,
            client_kind: ClientKind::Individual,
            invoice_date: today,
            due_date: today + Duration::days(30),
            period_start: None,
            period_end: None,
            pre_tax_amount: 2000.0,
            tax_rate: 20.0,
            description: Some("Annual domiciliation".into()),
            payment_method: "transfer".into(),
            status: InvoiceStatus::Pending,
            payment_date: None,
        })
        .await?;
    let stored = invoices.find(invoice).await?.context("invoice must be readable")?;
    tally.check("tax computed server-side", stored.tax_amount == 400.0);
    tally.check("total computed server-side", stored.total_amount == 2400.0);
    tally.check(
        "pending invoice not yet overdue",
        stored.effective_status(today) == InvoiceStatus::Pending,
    );
    tally.check(
        "pending invoice reads overdue past due date",
        stored.effective_status(today + Duration::days(31)) == InvoiceStatus::Overdue,
    );
    println!(
        "       invoice {} for {}",
        stored.invoice_number,
        dom_common::format_amount(stored.total_amount)
    );

    // -- payments and contract deletion --
    payments
        .record(&NewPayment {
            contract_id: contract,
            amount: 300.0,
            payment_date: today,
            method: "cash".into(),
            reference: None,
        })
        .await?;
    tally.check(
        "contract with payments terminates instead of deleting",
        contracts.delete(contract).await? == DeleteOutcome::Terminated,
    );
    tally.check(
        "terminated contract still readable",
        contracts.find(contract).await?.is_some(),
    );

    // -- statistics --
    let overview = stats.overview(today, 30).await?;
    tally.check("statistics count both client kinds", overview.individual_clients == 1 && overview.corporate_clients == 1);
    tally.check("collected total reflects payments", overview.total_collected == 300.0);
    if args.json_stats {
        println!("{}", serde_json::to_string_pretty(&overview)?);
    }

    // -- maintenance --
    let report = store::purge_orphans(&pool).await?;
    tally.check("no orphans on a consistent database", report.total() == 0);

    println!("\n{} passed, {} failed", tally.passed, tally.failed);
    if tally.failed > 0 {
        anyhow::bail!("{} smoke check(s) failed", tally.failed);
    }
    Ok(())
}
