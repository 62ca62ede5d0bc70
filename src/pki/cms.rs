//! CMS `SignedData` parsing (Master Lists, SODs, Deviation Lists), built on
//! `rasn` + `rasn-cms` — grounded in the retrieved ProveKit
//! `passport-input-gen` SOD parser, which decodes exactly this structure.

use chrono::{DateTime, Utc};
use rasn::der;
use rasn_cms::{CertificateChoices, ContentInfo, SignedData};

use crate::error::{PkdError, PkdResult};

/// A detached, application-friendly view over a CMS `SignedData` envelope.
#[derive(Debug, Clone)]
pub struct CmsSignedData {
    pub digest_algorithm_oids: Vec<String>,
    pub content_type_oid: String,
    /// The raw `eContent` bytes (the Master List's `SEQUENCE OF
    /// Certificate`, or the LDS Security Object, depending on caller).
    pub encapsulated_content: Vec<u8>,
    /// DER of each embedded certificate (the Master List's CSCAs, or the
    /// SOD's single DSC).
    pub certificates_der: Vec<Vec<u8>>,
    pub signer_digest_algorithm_oid: String,
    pub signer_signature_algorithm_oid: String,
    pub signature: Vec<u8>,
    /// The re-encoded `signedAttrs` SET, which is what the signature is
    /// actually computed over (not the plain eContent) when signed
    /// attributes are present.
    pub signed_attrs_der: Option<Vec<u8>>,
    pub signing_time: Option<DateTime<Utc>>,
    pub message_digest: Option<Vec<u8>>,
}

/// If the outermost tag is application-class 23 (`0x77`), the ICAO SOD
/// wrapper, strip that TLV and return the inner CMS bytes; otherwise pass
/// through unchanged (spec §4.1 `unwrap_icao_sod`).
pub fn unwrap_icao_sod(bytes: &[u8]) -> PkdResult<Vec<u8>> {
    if bytes.is_empty() {
        return Err(PkdError::Parse("empty SOD buffer".to_string()));
    }
    // Application-class, constructed, tag number 23: 0x60 | 0x17 = 0x77.
    if bytes[0] != 0x77 {
        return Ok(bytes.to_vec());
    }
    let (header_len, content_len) = read_ber_length(&bytes[1..])
        .ok_or_else(|| PkdError::Parse("malformed SOD TLV length".to_string()))?;
    let start = 1 + header_len;
    let end = start + content_len;
    if end > bytes.len() {
        return Err(PkdError::Parse("truncated SOD TLV".to_string()));
    }
    Ok(bytes[start..end].to_vec())
}

/// Reads a BER/DER length octet sequence starting right after the tag
/// byte. Returns `(bytes consumed by the length, declared content length)`.
fn read_ber_length(bytes: &[u8]) -> Option<(usize, usize)> {
    let first = *bytes.first()?;
    if first & 0x80 == 0 {
        Some((1, first as usize))
    } else {
        let num_octets = (first & 0x7f) as usize;
        if num_octets == 0 || num_octets > 4 || bytes.len() < 1 + num_octets {
            return None;
        }
        let mut len = 0usize;
        for &b in &bytes[1..1 + num_octets] {
            len = (len << 8) | b as usize;
        }
        Some((1 + num_octets, len))
    }
}

pub fn parse_cms_signed_data(der_bytes: &[u8]) -> PkdResult<CmsSignedData> {
    let content_info: ContentInfo = der::decode(der_bytes)
        .map_err(|e| PkdError::Parse(format!("CMS ContentInfo decode failed: {e}")))?;

    let signed_data: SignedData = der::decode(content_info.content.as_bytes())
        .map_err(|e| PkdError::Parse(format!("CMS SignedData decode failed: {e}")))?;

    let signer_info = signed_data
        .signer_infos
        .first()
        .ok_or_else(|| PkdError::Parse("CMS SignedData has no signerInfos".to_string()))?;

    let encapsulated_content = signed_data
        .encap_content_info
        .content
        .as_ref()
        .map(|c| c.as_bytes().to_vec())
        .unwrap_or_default();

    let mut certificates_der = Vec::new();
    if let Some(certs) = &signed_data.certificates {
        for choice in certs {
            if let CertificateChoices::Certificate(cert) = choice {
                let encoded = der::encode(cert.as_ref())
                    .map_err(|e| PkdError::Parse(format!("re-encoding embedded cert: {e}")))?;
                certificates_der.push(encoded);
            }
        }
    }

    let (signed_attrs_der, signing_time, message_digest) = match &signer_info.signed_attrs {
        Some(attrs) => {
            let encoded = der::encode(attrs)
                .map_err(|e| PkdError::Parse(format!("re-encoding signedAttrs: {e}")))?;
            let signing_time = find_signing_time(attrs);
            let message_digest = find_message_digest(attrs);
            (Some(encoded), signing_time, message_digest)
        }
        None => (None, None, None),
    };

    Ok(CmsSignedData {
        digest_algorithm_oids: signed_data
            .digest_algorithms
            .iter()
            .map(|a| a.algorithm.to_string())
            .collect(),
        content_type_oid: signed_data.encap_content_info.content_type.to_string(),
        encapsulated_content,
        certificates_der,
        signer_digest_algorithm_oid: signer_info.digest_algorithm.algorithm.to_string(),
        signer_signature_algorithm_oid: signer_info.signature_algorithm.algorithm.to_string(),
        signature: signer_info.signature.to_vec(),
        signed_attrs_der,
        signing_time,
        message_digest,
    })
}

const OID_MESSAGE_DIGEST: &str = "1.2.840.113549.1.9.4";
const OID_SIGNING_TIME: &str = "1.2.840.113549.1.9.5";

fn find_message_digest(attrs: &rasn_cms::SignedAttributes) -> Option<Vec<u8>> {
    attrs
        .iter()
        .find(|a| a.r#type.to_string() == OID_MESSAGE_DIGEST)
        .and_then(|a| a.values.first())
        .map(|v| v.as_bytes().to_vec())
}

fn find_signing_time(attrs: &rasn_cms::SignedAttributes) -> Option<DateTime<Utc>> {
    attrs
        .iter()
        .find(|a| a.r#type.to_string() == OID_SIGNING_TIME)
        .and_then(|a| a.values.first())
        .and_then(|v| der::decode::<rasn::types::UtcTime>(v.as_bytes()).ok())
        .map(|t| t.0.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(inner: &[u8]) -> Vec<u8> {
        let mut out = vec![0x77];
        if inner.len() < 128 {
            out.push(inner.len() as u8);
        } else {
            out.push(0x82);
            out.extend_from_slice(&(inner.len() as u16).to_be_bytes());
        }
        out.extend_from_slice(inner);
        out
    }

    #[test]
    fn unwrap_strips_application_23_tag() {
        let inner = vec![0x30, 0x03, 0x01, 0x02, 0x03];
        let wrapped = wrap(&inner);
        assert_eq!(unwrap_icao_sod(&wrapped).unwrap(), inner);
    }

    #[test]
    fn unwrap_passes_through_non_application_tag() {
        let plain = vec![0x30, 0x03, 0x01, 0x02, 0x03];
        assert_eq!(unwrap_icao_sod(&plain).unwrap(), plain);
    }

    #[test]
    fn unwrap_is_idempotent_round_trip() {
        let inner = vec![0x30, 0x02, 0xaa, 0xbb];
        let wrapped = wrap(&inner);
        let once = unwrap_icao_sod(&wrapped).unwrap();
        let twice = unwrap_icao_sod(&once).unwrap();
        assert_eq!(once, twice);
    }

    proptest::proptest! {
        /// Round-trip law (spec §8): `unwrap_icao_sod(wrap(x)) == x` for any
        /// inner payload, whatever its own leading byte happens to be.
        #[test]
        fn unwrap_of_wrap_recovers_inner(inner in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256)) {
            let wrapped = wrap(&inner);
            let recovered = unwrap_icao_sod(&wrapped).unwrap();
            proptest::prop_assert_eq!(recovered, inner);
        }

        /// Round-trip law (spec §8): `unwrap_icao_sod(x) == x` whenever the
        /// leading byte isn't the 0x77 ICAO wrapper tag.
        #[test]
        fn passthrough_when_not_wrapped(
            first in 0u8..=0xffu8,
            rest in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64),
        ) {
            proptest::prop_assume!(first != 0x77);
            let mut bytes = vec![first];
            bytes.extend_from_slice(&rest);
            let result = unwrap_icao_sod(&bytes).unwrap();
            proptest::prop_assert_eq!(result, bytes);
        }
    }
}
