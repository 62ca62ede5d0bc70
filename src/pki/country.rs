//! Country-code normalisation (spec §4.1 `normalise_country`) and DN
//! attribute extraction. A fixed lookup table, not a crate — the ICAO
//! alpha-3 set is small and stable.

const ALPHA3_TO_ALPHA2: &[(&str, &str)] = &[
    ("KOR", "KR"),
    ("USA", "US"),
    ("GBR", "GB"),
    ("DEU", "DE"),
    ("FRA", "FR"),
    ("JPN", "JP"),
    ("CHN", "CN"),
    ("CAN", "CA"),
    ("AUS", "AU"),
    ("NLD", "NL"),
    ("ITA", "IT"),
    ("ESP", "ES"),
    ("MEX", "MX"),
    ("BRA", "BR"),
    ("IND", "IN"),
    ("CHE", "CH"),
    ("SWE", "SE"),
    ("NOR", "NO"),
    ("FIN", "FI"),
    ("DNK", "DK"),
    ("SGP", "SG"),
    ("NZL", "NZ"),
    ("IRL", "IE"),
    ("PRT", "PT"),
    ("POL", "PL"),
];

/// Normalises a country code to ISO alpha-2. Alpha-2 input passes through
/// unchanged (upper-cased); unrecognised alpha-3 input is upper-cased and
/// truncated as a best-effort fallback rather than failing, since this is
/// used at ingestion boundaries where rejecting the whole item over an
/// unrecognised country code would be too aggressive.
pub fn normalise_country(code: &str) -> String {
    let upper = code.trim().to_uppercase();
    if upper.len() == 2 {
        return upper;
    }
    if upper.len() == 3 {
        if let Some((_, a2)) = ALPHA3_TO_ALPHA2.iter().find(|(a3, _)| *a3 == upper) {
            return (*a2).to_string();
        }
        return upper[..2].to_string();
    }
    upper
}

/// Extracts the `CN=` RDN from a DN string. DNs here are the simple
/// comma-separated form ICAO PKD certificates use (`CN=..., O=..., C=...`),
/// not full RFC 4514 with escaping.
pub fn extract_subject_cn(dn: &str) -> Option<String> {
    extract_rdn(dn, "CN")
}

/// Extracts the `C=` (country) RDN from a DN string, normalised to alpha-2.
/// Returns an empty string if no country RDN is present, per spec §4.1.
pub fn extract_country_from_dn(dn: &str) -> String {
    extract_rdn(dn, "C")
        .map(|c| normalise_country(&c))
        .unwrap_or_default()
}

fn extract_rdn(dn: &str, attribute: &str) -> Option<String> {
    for part in dn.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim().eq_ignore_ascii_case(attribute) {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha2_passes_through() {
        assert_eq!(normalise_country("kr"), "KR");
    }

    #[test]
    fn known_alpha3_maps_to_alpha2() {
        assert_eq!(normalise_country("KOR"), "KR");
        assert_eq!(normalise_country("usa"), "US");
    }

    #[test]
    fn unknown_alpha3_falls_back_to_truncation() {
        assert_eq!(normalise_country("ZZZ"), "ZZ");
    }

    #[test]
    fn extracts_cn_and_country_from_dn() {
        let dn = "CN=KR CSCA 2024, O=Country Signing CA, C=KR";
        assert_eq!(extract_subject_cn(dn).as_deref(), Some("KR CSCA 2024"));
        assert_eq!(extract_country_from_dn(dn), "KR");
    }

    #[test]
    fn missing_country_rdn_yields_empty_string() {
        let dn = "CN=Some Cert";
        assert_eq!(extract_country_from_dn(dn), "");
    }

    proptest::proptest! {
        /// Idempotence (spec §8): normalising an already-normalised code is
        /// a no-op, for any ASCII-letter input of plausible country-code
        /// length.
        #[test]
        fn normalise_is_idempotent(code in "[A-Za-z]{2,3}") {
            let once = normalise_country(&code);
            let twice = normalise_country(&once);
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
