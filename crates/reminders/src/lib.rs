//! `leasekeep-reminders`
//!
//! **Responsibility:** the reminder run. Scan the data layer for entities due
//! inside a lookahead window, send one templated message per entity through the
//! messaging provider, and summarize the outcome.
//!
//! Storage and the messaging vendor stay behind the [`DataAccess`] and
//! [`MessageSender`] traits; adapters live in `leasekeep-infra`.

pub mod candidate;
pub mod data_access;
pub mod dispatcher;
pub mod error;
pub mod observer;
pub mod phone;
pub mod retry;
pub mod runner;
pub mod scanner;
pub mod sender;
pub mod summary;
pub mod template;

pub use candidate::{CandidateKey, EntityType, ReminderCandidate};
pub use data_access::{
    AgreementStatus, ContractStatus, DataAccess, DueWindow, InvoiceStatus, MaintenanceContractDue,
    InvoiceDue, RentAgreementDue,
};
pub use dispatcher::{DispatchContext, DispatcherConfig, ReminderDispatcher};
pub use error::{DataAccessError, RunError, SendError};
pub use observer::{RecordingObserver, RunEvent, RunObserver, TracingObserver};
pub use phone::PhoneNumber;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use runner::{ReminderRunner, RunOptions, RunPhase, RunnerConfig};
pub use scanner::{ReminderScanner, ScannerConfig};
pub use sender::{MessageSender, SentMessage};
pub use summary::{DispatchOutcome, DispatchResult, RunSummary, TypeCounts};
pub use template::{RenderedTemplate, TemplateKind, TemplateSpec};
