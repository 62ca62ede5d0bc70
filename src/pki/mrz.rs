//! DG1 / MRZ parsing (spec §4.1 `parse_dg1`). MRZ extraction is
//! position-based per document-type length: TD1 = 90 chars (3x30), TD2 = 72
//! chars (2x36), TD3 = 88 chars (2x44). Any other length is a `ParseError`
//! (spec §8 boundary).

use std::collections::HashMap;

use crate::error::{PkdError, PkdResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Td1,
    Td2,
    Td3,
}

#[derive(Debug, Clone)]
pub struct Mrz {
    pub format: DocumentFormat,
    pub fields: HashMap<String, String>,
}

/// Extracts the raw MRZ character payload from a DG1 TLV
/// (`0x61` DG1 tag wrapping a `0x5F1F` MRZ_INFO tag) and parses it.
pub fn parse_dg1(bytes: &[u8]) -> PkdResult<Mrz> {
    let mrz_text = extract_mrz_info(bytes)?;
    parse_mrz_text(&mrz_text)
}

fn extract_mrz_info(bytes: &[u8]) -> PkdResult<String> {
    // Find the 0x5F 0x1F tag anywhere in the buffer and read its length-
    // prefixed value; this tolerates both a bare MRZ_INFO TLV and one
    // nested under an outer DG1 (0x61) constructed TLV.
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == 0x5F && bytes[i + 1] == 0x1F {
            let len_pos = i + 2;
            if len_pos >= bytes.len() {
                break;
            }
            let (len_size, value_len) = read_length(&bytes[len_pos..])
                .ok_or_else(|| PkdError::Parse("malformed DG1 length".to_string()))?;
            let value_start = len_pos + len_size;
            let value_end = value_start + value_len;
            if value_end > bytes.len() {
                return Err(PkdError::Parse("truncated DG1 MRZ_INFO".to_string()));
            }
            return String::from_utf8(bytes[value_start..value_end].to_vec())
                .map_err(|_| PkdError::Parse("DG1 MRZ_INFO is not valid ASCII".to_string()));
        }
        i += 1;
    }
    Err(PkdError::Parse("DG1 does not contain a MRZ_INFO tag".to_string()))
}

fn read_length(bytes: &[u8]) -> Option<(usize, usize)> {
    let first = *bytes.first()?;
    if first & 0x80 == 0 {
        Some((1, first as usize))
    } else {
        let n = (first & 0x7f) as usize;
        if n == 0 || n > 2 || bytes.len() < 1 + n {
            return None;
        }
        let mut len = 0usize;
        for &b in &bytes[1..1 + n] {
            len = (len << 8) | b as usize;
        }
        Some((1 + n, len))
    }
}

/// Parses the raw MRZ character string (already stripped of any TLV
/// wrapper) by its total length.
pub fn parse_mrz_text(text: &str) -> PkdResult<Mrz> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    match clean.len() {
        90 => Ok(parse_td1(&clean)),
        72 => Ok(parse_td2(&clean)),
        88 => Ok(parse_td3(&clean)),
        other => Err(PkdError::Parse(format!(
            "MRZ length {other} does not match TD1 (90), TD2 (72), or TD3 (88)"
        ))),
    }
}

fn slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end - start).collect::<String>().trim_end_matches('<').replace('<', " ").trim().to_string()
}

fn parse_td3(mrz: &str) -> Mrz {
    let line1 = &mrz[0..44];
    let line2 = &mrz[44..88];
    let mut fields = HashMap::new();
    fields.insert("document_type".to_string(), slice(line1, 0, 2));
    fields.insert("issuing_country".to_string(), slice(line1, 2, 5));
    fields.insert("name".to_string(), slice(line1, 5, 44));
    fields.insert("document_number".to_string(), slice(line2, 0, 9));
    fields.insert("nationality".to_string(), slice(line2, 10, 13));
    fields.insert("date_of_birth".to_string(), slice(line2, 13, 19));
    fields.insert("sex".to_string(), slice(line2, 20, 21));
    fields.insert("date_of_expiry".to_string(), slice(line2, 21, 27));
    fields.insert("personal_number".to_string(), slice(line2, 28, 42));
    Mrz {
        format: DocumentFormat::Td3,
        fields,
    }
}

fn parse_td2(mrz: &str) -> Mrz {
    let line1 = &mrz[0..36];
    let line2 = &mrz[36..72];
    let mut fields = HashMap::new();
    fields.insert("document_type".to_string(), slice(line1, 0, 2));
    fields.insert("issuing_country".to_string(), slice(line1, 2, 5));
    fields.insert("name".to_string(), slice(line1, 5, 36));
    fields.insert("document_number".to_string(), slice(line2, 0, 9));
    fields.insert("nationality".to_string(), slice(line2, 10, 13));
    fields.insert("date_of_birth".to_string(), slice(line2, 13, 19));
    fields.insert("sex".to_string(), slice(line2, 20, 21));
    fields.insert("date_of_expiry".to_string(), slice(line2, 21, 27));
    Mrz {
        format: DocumentFormat::Td2,
        fields,
    }
}

fn parse_td1(mrz: &str) -> Mrz {
    let line1 = &mrz[0..30];
    let line2 = &mrz[30..60];
    let line3 = &mrz[60..90];
    let mut fields = HashMap::new();
    fields.insert("document_type".to_string(), slice(line1, 0, 2));
    fields.insert("issuing_country".to_string(), slice(line1, 2, 5));
    fields.insert("document_number".to_string(), slice(line1, 5, 14));
    fields.insert("date_of_birth".to_string(), slice(line2, 0, 6));
    fields.insert("sex".to_string(), slice(line2, 7, 8));
    fields.insert("date_of_expiry".to_string(), slice(line2, 8, 14));
    fields.insert("nationality".to_string(), slice(line2, 15, 18));
    fields.insert("name".to_string(), slice(line3, 0, 30));
    Mrz {
        format: DocumentFormat::Td1,
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn td3_length_88_parses_to_td3() {
        let line1 = "P<KORDOE<<JANE<<<<<<<<<<<<<<<<<<<<<<<<<<<<<"; // 44 chars
        let line2 = "M1234567<6KOR8001012F30010111234567890<<<<00"; // 44 chars (trimmed below)
        let line2: String = line2.chars().take(44).collect();
        assert_eq!(line1.len(), 44);
        assert_eq!(line2.len(), 44);
        let mrz = format!("{line1}{line2}");
        let parsed = parse_mrz_text(&mrz).unwrap();
        assert_eq!(parsed.format, DocumentFormat::Td3);
    }

    #[test]
    fn wrong_length_is_parse_error() {
        let result = parse_mrz_text(&"X".repeat(73));
        assert!(result.is_err());
    }

    #[test]
    fn td1_and_td2_lengths_are_accepted() {
        assert_eq!(parse_mrz_text(&"<".repeat(90)).unwrap().format, DocumentFormat::Td1);
        assert_eq!(parse_mrz_text(&"<".repeat(72)).unwrap().format, DocumentFormat::Td2);
    }
}
