//! LDIF splitting and classification (spec §4.3): entries separated by
//! blank lines, classified by DN pattern (`o=csca` | `o=dsc` | `o=crl` |
//! …) and by which binary attribute they carry.

use std::collections::HashMap;

use base64::Engine;

use crate::error::{PkdError, PkdResult};
use crate::models::CertificateKind;

#[derive(Debug, Clone)]
pub struct LdifEntry {
    pub dn: String,
    /// Decoded (base64-stripped) attribute values, keyed by attribute name.
    pub attributes: HashMap<String, Vec<Vec<u8>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LdifItemKind {
    Certificate(CertificateKind),
    Crl,
    MasterList,
}

/// Splits an LDIF document into entries on blank-line boundaries. Lines
/// starting with a space continue the previous line (RFC 2849 line
/// folding).
pub fn split_entries(text: &str) -> Vec<String> {
    let unfolded = unfold_lines(text);
    unfolded
        .split("\n\n")
        .map(|block| block.trim())
        .filter(|block| !block.is_empty())
        .map(|block| block.to_string())
        .collect()
}

fn unfold_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(' ') {
            out.push_str(rest);
        } else {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(line);
        }
    }
    out
}

pub fn parse_entry(block: &str) -> PkdResult<LdifEntry> {
    let mut dn = None;
    let mut attributes: HashMap<String, Vec<Vec<u8>>> = HashMap::new();

    for line in block.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (attr, raw_value, is_base64) = if let Some((attr, value)) = line.split_once("::") {
            (attr.trim(), value.trim(), true)
        } else if let Some((attr, value)) = line.split_once(':') {
            (attr.trim(), value.trim(), false)
        } else {
            continue;
        };

        let value_bytes = if is_base64 {
            base64::engine::general_purpose::STANDARD
                .decode(raw_value)
                .map_err(|e| PkdError::InvalidBase64(e.to_string()))?
        } else {
            raw_value.as_bytes().to_vec()
        };

        if attr.eq_ignore_ascii_case("dn") {
            dn = Some(String::from_utf8_lossy(&value_bytes).to_string());
        } else {
            attributes.entry(attr.to_string()).or_default().push(value_bytes);
        }
    }

    let dn = dn.ok_or_else(|| PkdError::Parse("LDIF entry missing dn:".to_string()))?;
    Ok(LdifEntry { dn, attributes })
}

/// Classifies an entry by DN pattern first (`o=csca`, `o=dsc`, `o=crl`,
/// `o=ml`, `o=dsc-nc`, `o=lc`), falling back to the attribute it carries.
pub fn classify(entry: &LdifEntry) -> Option<LdifItemKind> {
    let dn_lower = entry.dn.to_lowercase();
    if dn_lower.contains("o=csca") {
        return Some(LdifItemKind::Certificate(CertificateKind::Csca));
    }
    if dn_lower.contains("o=dsc-nc") {
        return Some(LdifItemKind::Certificate(CertificateKind::DscNc));
    }
    if dn_lower.contains("o=dsc") {
        return Some(LdifItemKind::Certificate(CertificateKind::Dsc));
    }
    if dn_lower.contains("o=lc") {
        return Some(LdifItemKind::Certificate(CertificateKind::Lc));
    }
    if dn_lower.contains("o=mlsc") {
        return Some(LdifItemKind::Certificate(CertificateKind::Mlsc));
    }
    if dn_lower.contains("o=crl") {
        return Some(LdifItemKind::Crl);
    }
    if dn_lower.contains("o=ml") {
        return Some(LdifItemKind::MasterList);
    }

    if entry.attributes.contains_key("userCertificate;binary") {
        return Some(LdifItemKind::Certificate(CertificateKind::Dsc));
    }
    if entry.attributes.contains_key("certificateRevocationList;binary") {
        return Some(LdifItemKind::Crl);
    }
    if entry.attributes.contains_key("CscaMasterListData") {
        return Some(LdifItemKind::MasterList);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_blank_lines() {
        let text = "dn: o=csca\nuserCertificate;binary:: AAA=\n\ndn: o=dsc\nuserCertificate;binary:: BBB=\n";
        let entries = split_entries(text);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn classifies_by_dn_pattern() {
        let entry = parse_entry("dn: cn=abc,o=csca,c=KR\nuserCertificate;binary:: AAA=").unwrap();
        assert_eq!(classify(&entry), Some(LdifItemKind::Certificate(CertificateKind::Csca)));
    }

    #[test]
    fn falls_back_to_attribute_when_dn_is_ambiguous() {
        let entry = parse_entry("dn: cn=xyz,dc=example\ncertificateRevocationList;binary:: AAA=").unwrap();
        assert_eq!(classify(&entry), Some(LdifItemKind::Crl));
    }

    #[test]
    fn folded_continuation_lines_are_joined() {
        let text = "dn: cn=abc,\n o=csca,c=KR\nuserCertificate;binary:: AAA=\n";
        let entries = split_entries(text);
        let entry = parse_entry(&entries[0]).unwrap();
        assert_eq!(entry.dn, "cn=abc,o=csca,c=KR");
    }
}
