//! Data model (spec §3). Plain structs, tagged-variant enums for the kinds
//! that would be inheritance hierarchies in an object-oriented source —
//! per the polymorphism design note, a `kind` discriminator plus per-kind
//! dispatch in the validator, not a class hierarchy.

pub mod catalog_notification;
pub mod certificate;
pub mod crl;
pub mod masterlist;
pub mod pa_verification;
pub mod reconciliation;
pub mod sync_status;
pub mod upload;
pub mod validation_result;

pub use catalog_notification::CatalogNotification;
pub use certificate::{Certificate, CertificateKind, DuplicateObservation, LinkExtra};
pub use crl::Crl;
pub use masterlist::{DeviationListRecord, MasterList};
pub use pa_verification::{DataGroupCheck, PaStatus, PaVerification};
pub use reconciliation::{
    ReconciliationAction, ReconciliationLogEntry, ReconciliationOutcome, ReconciliationRun,
    ReconciliationStatus, ReconciliationTrigger,
};
pub use sync_status::{SyncStatus, SyncStatusSnapshot};
pub use upload::{Upload, UploadFormat, UploadMode, UploadState};
pub use validation_result::{ValidationReason, ValidationResult, ValidationStatus};
