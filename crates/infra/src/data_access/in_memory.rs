use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use leasekeep_core::EntityId;
use leasekeep_reminders::{
    AgreementStatus, CandidateKey, ContractStatus, DataAccess, DataAccessError, DueWindow,
    EntityType, InvoiceDue, InvoiceStatus, MaintenanceContractDue, RentAgreementDue,
};

#[derive(Debug, Default)]
struct Tables {
    agreements: Vec<RentAgreementDue>,
    contracts: Vec<MaintenanceContractDue>,
    invoices: Vec<InvoiceDue>,
    reminded: HashMap<CandidateKey, DateTime<Utc>>,
}

/// In-memory data store.
///
/// Intended for tests/dev. With the marker enabled, `mark_reminded` is kept in
/// memory and reflected in `last_reminded_at` of later queries.
#[derive(Debug, Default)]
pub struct InMemoryDataAccess {
    tables: RwLock<Tables>,
    marker_enabled: bool,
}

impl InMemoryDataAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marker() -> Self {
        Self {
            marker_enabled: true,
            ..Self::default()
        }
    }

    pub fn insert_agreement(&self, record: RentAgreementDue) {
        if let Ok(mut t) = self.tables.write() {
            t.agreements.push(record);
        }
    }

    pub fn insert_contract(&self, record: MaintenanceContractDue) {
        if let Ok(mut t) = self.tables.write() {
            t.contracts.push(record);
        }
    }

    pub fn insert_invoice(&self, record: InvoiceDue) {
        if let Ok(mut t) = self.tables.write() {
            t.invoices.push(record);
        }
    }

    /// When the given entity was last marked as reminded.
    pub fn reminded_at(&self, entity_type: EntityType, entity_id: &EntityId) -> Option<DateTime<Utc>> {
        let key = CandidateKey {
            entity_type,
            entity_id: entity_id.clone(),
        };
        self.tables.read().ok()?.reminded.get(&key).copied()
    }

    fn read(&self, operation: &'static str) -> Result<std::sync::RwLockReadGuard<'_, Tables>, DataAccessError> {
        self.tables
            .read()
            .map_err(|_| DataAccessError::query(operation, "lock poisoned"))
    }

    fn marker(&self, t: &Tables, entity_type: EntityType, id: &EntityId) -> Option<DateTime<Utc>> {
        if !self.marker_enabled {
            return None;
        }
        t.reminded
            .get(&CandidateKey {
                entity_type,
                entity_id: id.clone(),
            })
            .copied()
    }
}

#[async_trait]
impl DataAccess for InMemoryDataAccess {
    async fn rent_agreements_due(
        &self,
        window: DueWindow,
        statuses: &[AgreementStatus],
    ) -> Result<Vec<RentAgreementDue>, DataAccessError> {
        let t = self.read("rent_agreements_due")?;
        Ok(t.agreements
            .iter()
            .filter(|r| window.contains(r.end_date) && statuses.contains(&r.status))
            .map(|r| RentAgreementDue {
                last_reminded_at: self.marker(&t, EntityType::RentAgreement, &r.id),
                ..r.clone()
            })
            .collect())
    }

    async fn maintenance_contracts_due(
        &self,
        window: DueWindow,
        statuses: &[ContractStatus],
    ) -> Result<Vec<MaintenanceContractDue>, DataAccessError> {
        let t = self.read("maintenance_contracts_due")?;
        Ok(t.contracts
            .iter()
            .filter(|r| window.contains(r.due_date) && statuses.contains(&r.status))
            .map(|r| MaintenanceContractDue {
                last_reminded_at: self.marker(&t, EntityType::MaintenanceContract, &r.id),
                ..r.clone()
            })
            .collect())
    }

    async fn invoices_due(
        &self,
        window: DueWindow,
        statuses: &[InvoiceStatus],
    ) -> Result<Vec<InvoiceDue>, DataAccessError> {
        let t = self.read("invoices_due")?;
        Ok(t.invoices
            .iter()
            .filter(|r| window.contains(r.due_date) && statuses.contains(&r.status))
            .map(|r| InvoiceDue {
                last_reminded_at: self.marker(&t, EntityType::Invoice, &r.id),
                ..r.clone()
            })
            .collect())
    }

    fn supports_reminder_marker(&self) -> bool {
        self.marker_enabled
    }

    async fn mark_reminded(&self, key: &CandidateKey, at: DateTime<Utc>) -> Result<(), DataAccessError> {
        if !self.marker_enabled {
            return Ok(());
        }
        let mut t = self
            .tables
            .write()
            .map_err(|_| DataAccessError::query("mark_reminded", "lock poisoned"))?;
        t.reminded.insert(key.clone(), at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    fn invoice(id: &str, due: DateTime<Utc>, status: InvoiceStatus) -> InvoiceDue {
        InvoiceDue {
            id: EntityId::new(id).unwrap(),
            status,
            invoice_number: format!("INV-{id}"),
            due_date: due,
            amount_minor: 450_000,
            currency: "AED".to_string(),
            renter_name: "Sara Malik".to_string(),
            renter_phone: Some("971509998877".to_string()),
            property_name: "Marina Heights".to_string(),
            last_reminded_at: Some(at(2025, 1, 1)),
        }
    }

    #[tokio::test]
    async fn filters_by_window_and_status() {
        let store = InMemoryDataAccess::new();
        store.insert_invoice(invoice("i1", at(2025, 6, 10), InvoiceStatus::Pending));
        store.insert_invoice(invoice("i2", at(2025, 6, 11), InvoiceStatus::Paid));
        store.insert_invoice(invoice("i3", at(2025, 8, 1), InvoiceStatus::Pending));

        let window = DueWindow::starting_at(at(2025, 6, 1), chrono::Duration::days(30));
        let rows = store
            .invoices_due(window, &[InvoiceStatus::Pending, InvoiceStatus::PartiallyPaid])
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id.as_str(), "i1");
        // Without the marker, stored timestamps are not reported.
        assert_eq!(rows[0].last_reminded_at, None);
    }

    #[tokio::test]
    async fn marker_round_trips_through_queries() {
        let store = InMemoryDataAccess::with_marker();
        store.insert_invoice(invoice("i1", at(2025, 6, 10), InvoiceStatus::Pending));
        let key = CandidateKey {
            entity_type: EntityType::Invoice,
            entity_id: EntityId::new("i1").unwrap(),
        };

        store.mark_reminded(&key, at(2025, 6, 1)).await.unwrap();

        let window = DueWindow::starting_at(at(2025, 6, 1), chrono::Duration::days(30));
        let rows = store.invoices_due(window, &[InvoiceStatus::Pending]).await.unwrap();
        assert_eq!(rows[0].last_reminded_at, Some(at(2025, 6, 1)));
        assert_eq!(
            store.reminded_at(EntityType::Invoice, &key.entity_id),
            Some(at(2025, 6, 1))
        );
    }

    #[tokio::test]
    async fn marker_is_ignored_when_disabled() {
        let store = InMemoryDataAccess::new();
        let key = CandidateKey {
            entity_type: EntityType::Invoice,
            entity_id: EntityId::new("i1").unwrap(),
        };
        store.mark_reminded(&key, at(2025, 6, 1)).await.unwrap();
        assert!(!store.supports_reminder_marker());
        assert_eq!(store.reminded_at(EntityType::Invoice, &key.entity_id), None);
    }
}
