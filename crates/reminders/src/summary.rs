use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use leasekeep_core::RunId;

use crate::candidate::{EntityType, ReminderCandidate};
use crate::error::SendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    Skipped,
    Failed,
}

/// Outcome of one dispatch. Not mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub candidate: ReminderCandidate,
    pub outcome: DispatchOutcome,
    pub reason: Option<String>,
    pub provider_message_id: Option<String>,
    /// Send calls issued for this candidate (0 when skipped before sending).
    pub attempts: u32,
    /// Set when the final failure was a provider credential rejection.
    #[serde(default)]
    pub auth_expired: bool,
}

impl DispatchResult {
    pub fn sent(candidate: ReminderCandidate, provider_message_id: String, attempts: u32) -> Self {
        Self {
            candidate,
            outcome: DispatchOutcome::Sent,
            reason: None,
            provider_message_id: Some(provider_message_id),
            attempts,
            auth_expired: false,
        }
    }

    pub fn skipped(candidate: ReminderCandidate, reason: impl Into<String>) -> Self {
        Self {
            candidate,
            outcome: DispatchOutcome::Skipped,
            reason: Some(reason.into()),
            provider_message_id: None,
            attempts: 0,
            auth_expired: false,
        }
    }

    pub fn failed(candidate: ReminderCandidate, error: &SendError, attempts: u32) -> Self {
        Self {
            candidate,
            outcome: DispatchOutcome::Failed,
            reason: Some(error.to_string()),
            provider_message_id: None,
            attempts,
            auth_expired: matches!(error, SendError::AuthExpired(_)),
        }
    }
}

/// Outcome counts. Invariant: `total == sent + skipped + failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    pub total: u32,
    pub sent: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl TypeCounts {
    fn record(&mut self, outcome: DispatchOutcome) {
        self.total += 1;
        match outcome {
            DispatchOutcome::Sent => self.sent += 1,
            DispatchOutcome::Skipped => self.skipped += 1,
            DispatchOutcome::Failed => self.failed += 1,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.sent + self.skipped + self.failed
    }
}

/// Aggregated result of one run, returned to the trigger and then discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub total: u32,
    pub sent: u32,
    pub skipped: u32,
    pub failed: u32,
    pub per_type_breakdown: BTreeMap<EntityType, TypeCounts>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// At least one send failed on stale provider credentials; rotate them.
    pub auth_expired: bool,
    /// Candidates dropped because the same entity was already in the run.
    pub duplicates_dropped: u32,
    pub dry_run: bool,
}

impl RunSummary {
    /// Single-writer aggregation over all results of a run.
    pub fn aggregate(
        run_id: RunId,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        results: &[DispatchResult],
        duplicates_dropped: u32,
        dry_run: bool,
    ) -> Self {
        let mut overall = TypeCounts::default();
        let mut per_type_breakdown: BTreeMap<EntityType, TypeCounts> = BTreeMap::new();
        let mut auth_expired = false;

        for result in results {
            overall.record(result.outcome);
            per_type_breakdown
                .entry(result.candidate.entity_type)
                .or_default()
                .record(result.outcome);
            auth_expired |= result.auth_expired;
        }

        Self {
            run_id,
            total: overall.total,
            sent: overall.sent,
            skipped: overall.skipped,
            failed: overall.failed,
            per_type_breakdown,
            started_at,
            finished_at,
            auth_expired,
            duplicates_dropped,
            dry_run,
        }
    }

    pub fn counts(&self) -> TypeCounts {
        TypeCounts {
            total: self.total,
            sent: self.sent,
            skipped: self.skipped,
            failed: self.failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateKind;
    use leasekeep_core::EntityId;
    use proptest::prelude::*;

    fn candidate(entity_type: EntityType, id: usize) -> ReminderCandidate {
        ReminderCandidate {
            entity_type,
            entity_id: EntityId::new(format!("e-{id}")).unwrap(),
            due_at: Utc::now(),
            recipient_phone: "971501234567".to_string(),
            template_kind: TemplateKind::InvoiceDue,
            template_params: BTreeMap::new(),
        }
    }

    fn result(entity_type: EntityType, id: usize, outcome: DispatchOutcome) -> DispatchResult {
        let c = candidate(entity_type, id);
        match outcome {
            DispatchOutcome::Sent => DispatchResult::sent(c, format!("wamid.{id}"), 1),
            DispatchOutcome::Skipped => DispatchResult::skipped(c, "invalid-recipient"),
            DispatchOutcome::Failed => {
                DispatchResult::failed(c, &SendError::TransientNetwork("reset".into()), 3)
            }
        }
    }

    #[test]
    fn empty_run_has_zero_counts() {
        let now = Utc::now();
        let summary = RunSummary::aggregate(RunId::new(), now, now, &[], 0, false);
        assert_eq!(summary.counts(), TypeCounts::default());
        assert!(summary.per_type_breakdown.is_empty());
        assert!(!summary.auth_expired);
    }

    #[test]
    fn auth_expired_failure_sets_flag() {
        let now = Utc::now();
        let failed = DispatchResult::failed(
            candidate(EntityType::Invoice, 1),
            &SendError::AuthExpired("token expired".into()),
            1,
        );
        let summary = RunSummary::aggregate(RunId::new(), now, now, &[failed], 0, false);
        assert!(summary.auth_expired);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn breakdown_is_grouped_by_entity_type() {
        let now = Utc::now();
        let results = vec![
            result(EntityType::RentAgreement, 1, DispatchOutcome::Sent),
            result(EntityType::RentAgreement, 2, DispatchOutcome::Failed),
            result(EntityType::Invoice, 3, DispatchOutcome::Skipped),
        ];
        let summary = RunSummary::aggregate(RunId::new(), now, now, &results, 1, false);

        let rent = summary.per_type_breakdown[&EntityType::RentAgreement];
        assert_eq!((rent.total, rent.sent, rent.failed), (2, 1, 1));
        let inv = summary.per_type_breakdown[&EntityType::Invoice];
        assert_eq!((inv.total, inv.skipped), (1, 1));
        assert!(!summary.per_type_breakdown.contains_key(&EntityType::MaintenanceContract));
        assert_eq!(summary.duplicates_dropped, 1);
    }

    #[test]
    fn summary_serializes_breakdown_keys_as_snake_case() {
        let now = Utc::now();
        let results = vec![result(EntityType::MaintenanceContract, 1, DispatchOutcome::Sent)];
        let summary = RunSummary::aggregate(RunId::new(), now, now, &results, 0, true);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["per_type_breakdown"]["maintenance_contract"]["sent"], 1);
        assert_eq!(json["dry_run"], true);
    }

    fn arb_entity_type() -> impl Strategy<Value = EntityType> {
        prop_oneof![
            Just(EntityType::RentAgreement),
            Just(EntityType::MaintenanceContract),
            Just(EntityType::Invoice),
        ]
    }

    fn arb_outcome() -> impl Strategy<Value = DispatchOutcome> {
        prop_oneof![
            Just(DispatchOutcome::Sent),
            Just(DispatchOutcome::Skipped),
            Just(DispatchOutcome::Failed),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any mix of outcomes, totals add up overall and per type,
        /// and the per-type totals sum to the overall total.
        #[test]
        fn totals_always_add_up(
            outcomes in prop::collection::vec((arb_entity_type(), arb_outcome()), 0..64)
        ) {
            let now = Utc::now();
            let results: Vec<DispatchResult> = outcomes
                .iter()
                .enumerate()
                .map(|(i, (t, o))| result(*t, i, *o))
                .collect();

            let summary = RunSummary::aggregate(RunId::new(), now, now, &results, 0, false);

            prop_assert!(summary.counts().is_consistent());
            prop_assert_eq!(summary.total as usize, results.len());

            let mut breakdown_total = 0;
            for counts in summary.per_type_breakdown.values() {
                prop_assert!(counts.is_consistent());
                breakdown_total += counts.total;
            }
            prop_assert_eq!(breakdown_total, summary.total);
        }
    }
}
