//! Centralised DN templating (spec §4.5 — the fixed invariant templates).
//! Every directory operation derives its DN through these functions, never
//! by string-building inline, so the templates have exactly one source of
//! truth.

use crate::models::CertificateKind;

pub fn root(base_dn: &str) -> String {
    format!("dc=download,dc=pkd,{base_dn}")
}

pub fn compliant_data(base_dn: &str) -> String {
    format!("dc=data,{}", root(base_dn))
}

pub fn non_compliant_data(base_dn: &str) -> String {
    format!("dc=nc-data,{}", root(base_dn))
}

pub fn country(alpha2: &str, base_dn: &str) -> String {
    format!("c={alpha2},{}", compliant_data(base_dn))
}

/// Per-kind OU. CRLs and Master Lists share the same `o=data` address space
/// as certificates, keyed by `crl`/`ml` rather than a `CertificateKind`.
pub fn organisational_unit(ou: &str, alpha2: &str, base_dn: &str) -> String {
    format!("o={ou},{}", country(alpha2, base_dn))
}

pub fn certificate_ou(kind: CertificateKind, alpha2: &str, base_dn: &str) -> String {
    organisational_unit(kind.directory_ou(), alpha2, base_dn)
}

/// Entry DN for a certificate, keyed by its SHA-256 fingerprint (lowercase
/// hex, spec §8 boundary).
pub fn certificate_entry(
    fingerprint_hex: &str,
    kind: CertificateKind,
    alpha2: &str,
    base_dn: &str,
) -> String {
    format!("cn={fingerprint_hex},{}", certificate_ou(kind, alpha2, base_dn))
}

/// CRL entry DN, keyed by a deterministic hash of the issuer DN (spec §4.5
/// `upsert_crl`) rather than a fingerprint, since a CRL has no single
/// canonical DER identity across reissues of the same issuer.
pub fn crl_entry(issuer_dn: &str, alpha2: &str, base_dn: &str) -> String {
    let issuer_hash = crate::pki::digest::sha256_hex(issuer_dn.as_bytes());
    format!("cn={issuer_hash},{}", organisational_unit("crl", alpha2, base_dn))
}

pub fn masterlist_entry(fingerprint_hex: &str, alpha2: &str, base_dn: &str) -> String {
    format!("cn={fingerprint_hex},{}", organisational_unit("ml", alpha2, base_dn))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_entry_matches_the_fixed_template() {
        let dn = certificate_entry("ab".repeat(32).as_str(), CertificateKind::Csca, "KR", "dc=example,dc=org");
        assert_eq!(
            dn,
            format!(
                "cn={},o=csca,c=KR,dc=data,dc=download,dc=pkd,dc=example,dc=org",
                "ab".repeat(32)
            )
        );
    }

    #[test]
    fn crl_entry_is_deterministic_for_the_same_issuer() {
        let first = crl_entry("CN=KR CSCA", "KR", "dc=example,dc=org");
        let second = crl_entry("CN=KR CSCA", "KR", "dc=example,dc=org");
        assert_eq!(first, second);
    }
}
