//! Content sniffing for individual-file uploads (spec §4.3): leading bytes
//! decide whether a buffer is PEM, DER, PKCS#7/P7B, a CRL, or a Deviation
//! List, independent of the filename extension.

use crate::error::{PkdError, PkdResult};
use crate::models::UploadFormat;

const OID_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";

/// Best-effort classification of a single uploaded file. LDIF and Master
/// List containers are expected to announce themselves by extension
/// before reaching this function; this handles the "individual
/// certificate / CRL / DL file" branch of spec §4.3.
pub fn sniff_format(bytes: &[u8], filename: &str) -> PkdResult<UploadFormat> {
    let lower = filename.to_lowercase();
    if lower.ends_with(".ldif") {
        return Ok(UploadFormat::Ldif);
    }
    if lower.ends_with(".ml") {
        return Ok(UploadFormat::Ml);
    }
    if bytes.is_empty() {
        return Err(PkdError::Parse("empty upload".to_string()));
    }
    if bytes.starts_with(b"-----BEGIN") {
        return Ok(UploadFormat::Pem);
    }
    if bytes[0] == 0x30 {
        if contains_oid(bytes, OID_SIGNED_DATA) {
            return Ok(classify_signed_data(&lower));
        }
        if lower.ends_with(".crl") {
            return Ok(UploadFormat::Crl);
        }
        return Ok(UploadFormat::Der);
    }
    Err(PkdError::UnsupportedFormat(format!(
        "unrecognised leading byte 0x{:02x} in {filename}",
        bytes[0]
    )))
}

fn classify_signed_data(lower_filename: &str) -> UploadFormat {
    if lower_filename.ends_with(".dl") {
        UploadFormat::Dl
    } else {
        UploadFormat::P7b
    }
}

/// Crude DER-encoded OID substring search: encodes the dotted OID and
/// scans for it. Sufficient for content-sniffing (not a full ASN.1 walk).
fn contains_oid(bytes: &[u8], dotted_oid: &str) -> bool {
    let Some(encoded) = encode_oid(dotted_oid) else {
        return false;
    };
    bytes.windows(encoded.len()).any(|w| w == encoded.as_slice())
}

fn encode_oid(dotted: &str) -> Option<Vec<u8>> {
    let parts: Vec<u64> = dotted.split('.').map(|p| p.parse().ok()).collect::<Option<_>>()?;
    if parts.len() < 2 {
        return None;
    }
    let mut out = vec![(parts[0] * 40 + parts[1]) as u8];
    for &part in &parts[2..] {
        out.extend(encode_base128(part));
    }
    Some(out)
}

fn encode_base128(mut value: u64) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        bytes.push(((value & 0x7f) as u8) | 0x80);
        value >>= 7;
    }
    bytes.reverse();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_leading_bytes_are_recognised() {
        let pem = b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----";
        assert_eq!(sniff_format(pem, "cert.txt").unwrap(), UploadFormat::Pem);
    }

    #[test]
    fn ldif_extension_short_circuits_content_sniffing() {
        assert_eq!(sniff_format(b"anything", "bundle.ldif").unwrap(), UploadFormat::Ldif);
    }

    #[test]
    fn unrecognised_leading_byte_is_unsupported() {
        let result = sniff_format(b"\xffnotasn1", "mystery.bin");
        assert!(result.is_err());
    }
}
