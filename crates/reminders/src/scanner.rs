//! Candidate scanning.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::candidate::{EntityType, ReminderCandidate};
use crate::data_access::{AgreementStatus, ContractStatus, DataAccess, DueWindow, InvoiceStatus};
use crate::error::DataAccessError;
use crate::template::TemplateKind;

/// Statuses that still warrant a reminder.
pub const REMINDABLE_AGREEMENTS: &[AgreementStatus] = &[AgreementStatus::Active];
pub const REMINDABLE_CONTRACTS: &[ContractStatus] = &[ContractStatus::Pending, ContractStatus::Active];
pub const REMINDABLE_INVOICES: &[InvoiceStatus] = &[InvoiceStatus::Pending, InvoiceStatus::PartiallyPaid];

const DATE_FORMAT: &str = "%d %b %Y";

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Entity types queried on every scan.
    pub tracked: BTreeSet<EntityType>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            tracked: EntityType::ALL.into_iter().collect(),
        }
    }
}

/// Turns due records into reminder candidates.
pub struct ReminderScanner {
    data: Arc<dyn DataAccess>,
    config: ScannerConfig,
}

impl ReminderScanner {
    pub fn new(data: Arc<dyn DataAccess>, config: ScannerConfig) -> Self {
        Self { data, config }
    }

    /// Query every tracked entity type for records due in `[now, now + lookahead]`.
    ///
    /// Fail-fast: the first query error aborts the scan and no candidates are
    /// returned. Records already reminded on `now`'s UTC day are left out.
    /// Calling `scan` again re-queries the data layer.
    pub async fn scan(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
    ) -> Result<Vec<ReminderCandidate>, DataAccessError> {
        let window = DueWindow::starting_at(now, lookahead);
        let mut candidates = Vec::new();

        for entity_type in &self.config.tracked {
            match entity_type {
                EntityType::RentAgreement => {
                    let rows = self
                        .data
                        .rent_agreements_due(window, REMINDABLE_AGREEMENTS)
                        .await?;
                    for row in rows {
                        if reminded_on_same_day(row.last_reminded_at, now) {
                            debug!(entity_id = %row.id, "rent agreement already reminded today");
                            continue;
                        }
                        candidates.push(ReminderCandidate {
                            entity_type: EntityType::RentAgreement,
                            entity_id: row.id,
                            due_at: row.end_date,
                            recipient_phone: row.renter_phone.unwrap_or_default(),
                            template_kind: TemplateKind::LeaseExpiry,
                            template_params: params([
                                ("renter_name", row.renter_name),
                                ("property_name", row.property_name),
                                ("unit_number", row.unit_number),
                                ("end_date", row.end_date.format(DATE_FORMAT).to_string()),
                            ]),
                        });
                    }
                }
                EntityType::MaintenanceContract => {
                    let rows = self
                        .data
                        .maintenance_contracts_due(window, REMINDABLE_CONTRACTS)
                        .await?;
                    for row in rows {
                        if reminded_on_same_day(row.last_reminded_at, now) {
                            debug!(entity_id = %row.id, "maintenance contract already reminded today");
                            continue;
                        }
                        candidates.push(ReminderCandidate {
                            entity_type: EntityType::MaintenanceContract,
                            entity_id: row.id,
                            due_at: row.due_date,
                            recipient_phone: row.contact_phone.unwrap_or_default(),
                            template_kind: TemplateKind::MaintenanceDue,
                            template_params: params([
                                ("contact_name", row.contact_name),
                                ("property_name", row.property_name),
                                ("description", row.description),
                                ("due_date", row.due_date.format(DATE_FORMAT).to_string()),
                            ]),
                        });
                    }
                }
                EntityType::Invoice => {
                    let rows = self.data.invoices_due(window, REMINDABLE_INVOICES).await?;
                    for row in rows {
                        if reminded_on_same_day(row.last_reminded_at, now) {
                            debug!(entity_id = %row.id, "invoice already reminded today");
                            continue;
                        }
                        candidates.push(ReminderCandidate {
                            entity_type: EntityType::Invoice,
                            entity_id: row.id,
                            due_at: row.due_date,
                            recipient_phone: row.renter_phone.unwrap_or_default(),
                            template_kind: TemplateKind::InvoiceDue,
                            template_params: params([
                                ("renter_name", row.renter_name),
                                ("invoice_number", row.invoice_number),
                                ("amount", format_amount(row.amount_minor, &row.currency)),
                                ("due_date", row.due_date.format(DATE_FORMAT).to_string()),
                            ]),
                        });
                    }
                }
            }
        }

        candidates.sort_by(|a, b| {
            a.due_at
                .cmp(&b.due_at)
                .then(a.entity_type.cmp(&b.entity_type))
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });

        Ok(candidates)
    }
}

fn reminded_on_same_day(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    last.is_some_and(|at| at.date_naive() == now.date_naive())
}

fn params<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// `125000, "AED"` → `"AED 1,250.00"`.
fn format_amount(minor: i64, currency: &str) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    let whole = (abs / 100).to_string();
    let cents = abs % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{currency} {sign}{grouped}.{cents:02}")
}
