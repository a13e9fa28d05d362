use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use leasekeep_core::{DomainError, EntityId};

use crate::template::TemplateKind;

/// Kind of record a reminder is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    RentAgreement,
    MaintenanceContract,
    Invoice,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [
        EntityType::RentAgreement,
        EntityType::MaintenanceContract,
        EntityType::Invoice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::RentAgreement => "rent_agreement",
            EntityType::MaintenanceContract => "maintenance_contract",
            EntityType::Invoice => "invoice",
        }
    }
}

impl core::fmt::Display for EntityType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for EntityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "rent_agreement" | "rentagreement" => Ok(EntityType::RentAgreement),
            "maintenance_contract" | "maintenancecontract" | "maintenance" => {
                Ok(EntityType::MaintenanceContract)
            }
            "invoice" => Ok(EntityType::Invoice),
            other => Err(DomainError::validation(format!(
                "unknown entity type '{other}' (expected rent_agreement, maintenance_contract or invoice)"
            ))),
        }
    }
}

/// Dedup key: one dispatch per `(entity_type, entity_id)` within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateKey {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
}

/// An entity due for a reminder within the lookahead window.
///
/// Produced fresh by every scan; never persisted by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderCandidate {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub due_at: DateTime<Utc>,
    /// Raw phone number as stored by the data layer; normalized at dispatch.
    pub recipient_phone: String,
    pub template_kind: TemplateKind,
    pub template_params: BTreeMap<String, String>,
}

impl ReminderCandidate {
    pub fn key(&self) -> CandidateKey {
        CandidateKey {
            entity_type: self.entity_type,
            entity_id: self.entity_id.clone(),
        }
    }
}
