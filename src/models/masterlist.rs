use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterList {
    pub id: uuid::Uuid,
    pub signer_country: String,
    pub version: Option<u32>,
    pub signing_time: Option<DateTime<Utc>>,
    pub fingerprint: String,
    pub mlsc_fingerprint: String,
    pub certificate_count: u32,
    pub cms_bytes: Vec<u8>,
    pub directory_stored: bool,
}

/// Supplemental to the distilled spec (SPEC_FULL.md "Supplemental"):
/// metadata-only persistence for Deviation List containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviationListRecord {
    pub id: uuid::Uuid,
    pub signer_country: String,
    pub signing_time: Option<DateTime<Utc>>,
    pub fingerprint: String,
    pub entry_count: u32,
}
