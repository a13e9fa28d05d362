use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::StatusCode;

use leasekeep_api::app::{AppServices, build_app};
use leasekeep_core::EntityId;
use leasekeep_infra::InMemoryDataAccess;
use leasekeep_reminders::{
    AgreementStatus, ContractStatus, DataAccess, DataAccessError, DueWindow, InvoiceDue,
    InvoiceStatus, MaintenanceContractDue, MessageSender, PhoneNumber, RenderedTemplate,
    RentAgreementDue, RunnerConfig, SendError, SentMessage, TracingObserver,
};

const SECRET: &str = "cron-test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(services: AppServices) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = build_app(Arc::new(services), SECRET);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Counts queries and optionally fails them.
struct ProbeStore {
    inner: InMemoryDataAccess,
    queries: AtomicUsize,
    fail: bool,
}

impl ProbeStore {
    fn new(fail: bool) -> Self {
        Self {
            inner: InMemoryDataAccess::new(),
            queries: AtomicUsize::new(0),
            fail,
        }
    }

    fn check(&self) -> Result<(), DataAccessError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DataAccessError::Connection("database is unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DataAccess for ProbeStore {
    async fn rent_agreements_due(
        &self,
        window: DueWindow,
        statuses: &[AgreementStatus],
    ) -> Result<Vec<RentAgreementDue>, DataAccessError> {
        self.check()?;
        self.inner.rent_agreements_due(window, statuses).await
    }

    async fn maintenance_contracts_due(
        &self,
        window: DueWindow,
        statuses: &[ContractStatus],
    ) -> Result<Vec<MaintenanceContractDue>, DataAccessError> {
        self.check()?;
        self.inner.maintenance_contracts_due(window, statuses).await
    }

    async fn invoices_due(
        &self,
        window: DueWindow,
        statuses: &[InvoiceStatus],
    ) -> Result<Vec<InvoiceDue>, DataAccessError> {
        self.check()?;
        self.inner.invoices_due(window, statuses).await
    }
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_message(
        &self,
        recipient: &PhoneNumber,
        template: &RenderedTemplate,
    ) -> Result<SentMessage, SendError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(format!("{}:{}", recipient, template.template_id));
        Ok(SentMessage {
            id: format!("wamid.{}", sent.len()),
            status: "accepted".into(),
        })
    }
}

fn agreement(id: &str, end: DateTime<Utc>, phone: &str) -> RentAgreementDue {
    RentAgreementDue {
        id: EntityId::new(id).unwrap(),
        status: AgreementStatus::Active,
        end_date: end,
        renter_name: "Ayesha Khan".into(),
        renter_phone: Some(phone.into()),
        property_name: "Creek Tower".into(),
        unit_number: "1204".into(),
        last_reminded_at: None,
    }
}

fn services(store: Arc<ProbeStore>, sender: Arc<RecordingSender>) -> AppServices {
    AppServices::new(store, sender, Arc::new(TracingObserver), RunnerConfig::default())
}

fn seeded_store() -> Arc<ProbeStore> {
    let store = ProbeStore::new(false);
    let soon = Utc::now() + ChronoDuration::days(5);
    store.inner.insert_agreement(agreement("ra-1", soon, "+971 50 123 4567"));
    store.inner.insert_agreement(agreement("ra-2", soon, "12"));
    store
        .inner
        .insert_agreement(agreement("ra-3", Utc::now() + ChronoDuration::days(90), "971501234568"));
    Arc::new(store)
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn(services(seeded_store(), Arc::default())).await;

    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_or_wrong_key_is_rejected_before_any_query() {
    let store = seeded_store();
    let sender = Arc::new(RecordingSender::default());
    let srv = TestServer::spawn(services(store.clone(), sender.clone())).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/cron/reminders", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let res = client
        .get(format!("{}/cron/reminders", srv.base_url))
        .header("x-cron-key", "not-the-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(store.queries.load(Ordering::SeqCst), 0);
    assert!(sender.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn authorized_trigger_returns_run_summary() {
    let sender = Arc::new(RecordingSender::default());
    let srv = TestServer::spawn(services(seeded_store(), sender.clone())).await;

    let res = reqwest::Client::new()
        .get(format!("{}/cron/reminders", srv.base_url))
        .header("x-cron-key", SECRET)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let summary: serde_json::Value = res.json().await.unwrap();
    assert_eq!(summary["total"], 2);
    assert_eq!(summary["sent"], 1);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["failed"], 0);
    assert_eq!(summary["per_type_breakdown"]["rent_agreement"]["total"], 2);
    assert_eq!(summary["auth_expired"], false);
    assert!(summary["run_id"].is_string());

    let sent = sender.sent.lock().unwrap().clone();
    assert_eq!(sent, vec!["971501234567:lease_expiry_reminder".to_string()]);
}

#[tokio::test]
async fn dry_run_query_sends_nothing() {
    let sender = Arc::new(RecordingSender::default());
    let srv = TestServer::spawn(services(seeded_store(), sender.clone())).await;

    let res = reqwest::Client::new()
        .get(format!("{}/cron/reminders?dry_run=true", srv.base_url))
        .header("x-cron-key", SECRET)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let summary: serde_json::Value = res.json().await.unwrap();
    assert_eq!(summary["dry_run"], true);
    assert_eq!(summary["total"], 2);
    assert_eq!(summary["sent"], 0);
    assert_eq!(summary["skipped"], 2);
    assert!(sender.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn scan_failure_is_service_unavailable() {
    let store = Arc::new(ProbeStore::new(true));
    let sender = Arc::new(RecordingSender::default());
    let srv = TestServer::spawn(services(store.clone(), sender.clone())).await;

    let res = reqwest::Client::new()
        .get(format!("{}/cron/reminders", srv.base_url))
        .header("x-cron-key", SECRET)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "data_access_error");
    assert!(body["message"].as_str().unwrap().contains("unreachable"));
    // Fail-fast: the first failing query ends the scan.
    assert_eq!(store.queries.load(Ordering::SeqCst), 1);
    assert!(sender.sent.lock().unwrap().is_empty());
}
