//! Data layer boundary.
//!
//! The reminder run only reads due records (with their unit, property and
//! renter or contact already joined in) and, optionally, writes a per-entity
//! "reminded" marker.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use leasekeep_core::{DomainError, EntityId};

use crate::candidate::CandidateKey;
use crate::error::DataAccessError;

/// Inclusive due-date window `[from, until]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueWindow {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl DueWindow {
    /// `until` saturates at the latest representable instant.
    pub fn starting_at(now: DateTime<Utc>, lookahead: Duration) -> Self {
        Self {
            from: now,
            until: now
                .checked_add_signed(lookahead)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at <= self.until
    }
}

macro_rules! db_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $db:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Value as stored in the database enum column.
            pub fn as_db_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $db),+
                }
            }

            pub fn from_db_str(s: &str) -> Result<Self, DomainError> {
                match s {
                    $($db => Ok($name::$variant),)+
                    other => Err(DomainError::validation(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

db_enum!(
    /// Rent agreement lifecycle.
    AgreementStatus {
        Pending => "PENDING",
        Active => "ACTIVE",
        Expired => "EXPIRED",
        Terminated => "TERMINATED",
    }
);

db_enum!(
    /// Maintenance contract lifecycle.
    ContractStatus {
        Pending => "PENDING",
        Active => "ACTIVE",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
);

db_enum!(
    /// Invoice payment state.
    InvoiceStatus {
        Pending => "PENDING",
        PartiallyPaid => "PARTIALLY_PAID",
        Paid => "PAID",
        Overdue => "OVERDUE",
        Cancelled => "CANCELLED",
    }
);

/// Rent agreement with unit, property and renter joined in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentAgreementDue {
    pub id: EntityId,
    pub status: AgreementStatus,
    pub end_date: DateTime<Utc>,
    pub renter_name: String,
    pub renter_phone: Option<String>,
    pub property_name: String,
    pub unit_number: String,
    pub last_reminded_at: Option<DateTime<Utc>>,
}

/// Maintenance contract with property and responsible contact joined in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceContractDue {
    pub id: EntityId,
    pub status: ContractStatus,
    pub due_date: DateTime<Utc>,
    pub description: String,
    pub contact_name: String,
    pub contact_phone: Option<String>,
    pub property_name: String,
    pub last_reminded_at: Option<DateTime<Utc>>,
}

/// Invoice with renter and property joined in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDue {
    pub id: EntityId,
    pub status: InvoiceStatus,
    pub invoice_number: String,
    pub due_date: DateTime<Utc>,
    /// Amount in smallest currency unit (e.g., fils, cents).
    pub amount_minor: i64,
    pub currency: String,
    pub renter_name: String,
    pub renter_phone: Option<String>,
    pub property_name: String,
    pub last_reminded_at: Option<DateTime<Utc>>,
}

/// Read access to due records, shared by reference for the lifetime of the process.
///
/// Implementations must return only records whose due date lies in `window`
/// and whose status is one of `statuses`.
#[async_trait]
pub trait DataAccess: Send + Sync + 'static {
    async fn rent_agreements_due(
        &self,
        window: DueWindow,
        statuses: &[AgreementStatus],
    ) -> Result<Vec<RentAgreementDue>, DataAccessError>;

    async fn maintenance_contracts_due(
        &self,
        window: DueWindow,
        statuses: &[ContractStatus],
    ) -> Result<Vec<MaintenanceContractDue>, DataAccessError>;

    async fn invoices_due(
        &self,
        window: DueWindow,
        statuses: &[InvoiceStatus],
    ) -> Result<Vec<InvoiceDue>, DataAccessError>;

    /// Whether `last_reminded_at` on returned records is meaningful and
    /// [`DataAccess::mark_reminded`] persists anything.
    fn supports_reminder_marker(&self) -> bool {
        false
    }

    /// Record that a reminder was sent for an entity.
    async fn mark_reminded(
        &self,
        _key: &CandidateKey,
        _at: DateTime<Utc>,
    ) -> Result<(), DataAccessError> {
        Ok(())
    }

    /// Release connections. Called once on shutdown.
    async fn close(&self) {}
}
