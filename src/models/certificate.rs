use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminator for the five certificate kinds the directory addresses.
/// A tagged variant rather than a trait-object hierarchy: every kind shares
/// this one shape, and per-kind behavior (key-usage requirements, whether
/// the kind may serve as a trust-chain issuer) dispatches on this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateKind {
    Csca,
    Mlsc,
    Dsc,
    DscNc,
    Lc,
}

impl CertificateKind {
    /// The directory OU segment for this kind (spec §4.5 DN templates).
    pub fn directory_ou(self) -> &'static str {
        match self {
            CertificateKind::Csca => "csca",
            CertificateKind::Mlsc => "mlsc",
            CertificateKind::Dsc => "dsc",
            CertificateKind::DscNc => "dsc-nc",
            CertificateKind::Lc => "lc",
        }
    }

    /// `DSC_NC` is retained read-only and never synced to the directory
    /// (spec §4.6 step 2, §Glossary).
    pub fn directory_syncable(self) -> bool {
        !matches!(self, CertificateKind::DscNc)
    }
}

impl std::fmt::Display for CertificateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.directory_ou())
    }
}

/// One duplicate observation of an already-known certificate, recorded
/// against the upload that re-observed it (spec §3 "ledger of duplicate
/// observations").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateObservation {
    pub upload_id: uuid::Uuid,
    pub source_type: String,
    pub observed_at: DateTime<Utc>,
}

/// Link-Certificate-only fields (spec §3 LinkCertificate). Carried as an
/// optional extension on `Certificate` rather than a separate type with its
/// own lifecycle, since a Link Certificate is stored, validated, and
/// directory-synced exactly like any other certificate — only the trust
/// chain validator treats it specially.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkExtra {
    pub old_csca_fingerprint: String,
    pub new_csca_fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: uuid::Uuid,
    pub kind: CertificateKind,
    pub country: String,
    pub subject_dn: String,
    pub issuer_dn: String,
    /// Opaque big-integer serial, lowercase hex, no leading `0x`.
    pub serial_hex: String,
    /// SHA-256 of the DER encoding; unique within `kind`. Always lowercase,
    /// 64 hex characters (spec §8 boundary).
    pub fingerprint: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub public_key_algorithm: String,
    pub public_key_size_bits: u32,
    pub signature_algorithm: String,
    pub der: Vec<u8>,
    pub directory_stored: bool,
    pub duplicate_count: u32,
    pub last_seen_upload_id: Option<uuid::Uuid>,
    pub duplicates: Vec<DuplicateObservation>,
    pub link_extra: Option<LinkExtra>,
}

impl Certificate {
    /// Invariant from spec §8: `SHA256(C.der) == C.fingerprint`.
    pub fn fingerprint_matches_der(&self) -> bool {
        crate::pki::digest::sha256_hex(&self.der) == self.fingerprint
    }

    pub fn is_currently_valid(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.not_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsc_nc_is_never_directory_syncable() {
        assert!(!CertificateKind::DscNc.directory_syncable());
        assert!(CertificateKind::Csca.directory_syncable());
        assert!(CertificateKind::Dsc.directory_syncable());
        assert!(CertificateKind::Lc.directory_syncable());
    }

    #[test]
    fn directory_ou_matches_dn_template() {
        assert_eq!(CertificateKind::Csca.directory_ou(), "csca");
        assert_eq!(CertificateKind::Mlsc.directory_ou(), "mlsc");
    }
}
