//! X.509 CRL parsing (spec §4.1 `parse_crl`), built on `x509-parser`'s CRL
//! support — the same crate already used for certificate decoding.

use chrono::{DateTime, TimeZone, Utc};
use x509_parser::revocation_list::CertificateRevocationList;

use crate::error::{PkdError, PkdResult};
use crate::models::Crl;
use crate::pki::digest::sha256_hex;

pub fn parse_crl(der: &[u8]) -> PkdResult<Crl> {
    let (_, crl) = CertificateRevocationList::from_der(der)
        .map_err(|e| PkdError::Parse(format!("CRL decode failed: {e}")))?;

    let issuer_dn = crl.issuer().to_string();
    let this_update = asn1_time_to_chrono(crl.tbs_cert_list.this_update.timestamp())?;
    let next_update = crl
        .tbs_cert_list
        .next_update
        .map(|t| asn1_time_to_chrono(t.timestamp()))
        .transpose()?;

    let revoked_serials = crl
        .iter_revoked_certificates()
        .map(|entry| entry.raw_serial_as_string().replace(':', "").to_lowercase())
        .collect();

    let crl_number = crl
        .extensions()
        .iter()
        .find_map(|ext| match ext.parsed_extension() {
            x509_parser::extensions::ParsedExtension::CRLNumber(n) => Some(n.to_string()),
            _ => None,
        });

    let country = crate::pki::country::normalise_country(&crate::pki::country::extract_country_from_dn(&issuer_dn));

    Ok(Crl {
        id: uuid::Uuid::new_v4(),
        country,
        issuer_dn,
        this_update,
        next_update,
        crl_number,
        fingerprint: sha256_hex(der),
        der: der.to_vec(),
        revoked_serials,
        directory_stored: false,
    })
}

fn asn1_time_to_chrono(timestamp: i64) -> PkdResult<DateTime<Utc>> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| PkdError::Parse("out-of-range CRL timestamp".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_der_is_a_parse_error_not_a_panic() {
        let result = parse_crl(&[0x00, 0x01, 0x02]);
        assert!(result.is_err());
    }
}
