//! LDS Security Object decoding (spec §4.1 `parse_lds_security_object`).
//!
//! ```text
//! LDSSecurityObject ::= SEQUENCE {
//!     version                INTEGER,
//!     hashAlgorithm          AlgorithmIdentifier,
//!     dataGroupHashValues    SEQUENCE OF DataGroupHash }
//! DataGroupHash ::= SEQUENCE {
//!     dataGroupNumber        INTEGER,
//!     dataGroupHashValue     OCTET STRING }
//! ```

use rasn::types::{Integer, ObjectIdentifier, OctetString};
use rasn::{AsnType, Decode, Encode};
use std::collections::BTreeMap;

use crate::error::{PkdError, PkdResult};

#[derive(AsnType, Decode, Encode, Debug, Clone)]
struct AlgorithmIdentifier {
    algorithm: ObjectIdentifier,
    #[rasn(default)]
    parameters: Option<rasn::types::Any>,
}

#[derive(AsnType, Decode, Encode, Debug, Clone)]
struct DataGroupHash {
    data_group_number: Integer,
    data_group_hash_value: OctetString,
}

#[derive(AsnType, Decode, Encode, Debug, Clone)]
struct RawLdsSecurityObject {
    version: Integer,
    hash_algorithm: AlgorithmIdentifier,
    data_group_hash_values: Vec<DataGroupHash>,
}

/// Detached, application-friendly view: DG number -> declared hash.
#[derive(Debug, Clone)]
pub struct LdsSecurityObject {
    pub hash_algorithm_oid: String,
    pub dg_hash_map: BTreeMap<u8, Vec<u8>>,
}

pub fn parse_lds_security_object(cms_encapsulated_bytes: &[u8]) -> PkdResult<LdsSecurityObject> {
    let raw: RawLdsSecurityObject = rasn::der::decode(cms_encapsulated_bytes)
        .map_err(|e| PkdError::Parse(format!("LDS Security Object decode failed: {e}")))?;

    let mut dg_hash_map = BTreeMap::new();
    for entry in raw.data_group_hash_values {
        let dg_number: i64 = entry
            .data_group_number
            .try_into()
            .map_err(|_| PkdError::Parse("dataGroupNumber out of range".to_string()))?;
        let dg_number: u8 = dg_number
            .try_into()
            .map_err(|_| PkdError::Parse("dataGroupNumber out of range".to_string()))?;
        dg_hash_map.insert(dg_number, entry.data_group_hash_value.to_vec());
    }

    Ok(LdsSecurityObject {
        hash_algorithm_oid: raw.hash_algorithm.algorithm.to_string(),
        dg_hash_map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_der() -> Vec<u8> {
        let raw = RawLdsSecurityObject {
            version: Integer::from(0),
            hash_algorithm: AlgorithmIdentifier {
                algorithm: ObjectIdentifier::new(vec![2, 16, 840, 1, 101, 3, 4, 2, 1]).unwrap(),
                parameters: None,
            },
            data_group_hash_values: vec![
                DataGroupHash {
                    data_group_number: Integer::from(1),
                    data_group_hash_value: OctetString::from(vec![0xaa; 32]),
                },
                DataGroupHash {
                    data_group_number: Integer::from(2),
                    data_group_hash_value: OctetString::from(vec![0xbb; 32]),
                },
            ],
        };
        rasn::der::encode(&raw).unwrap()
    }

    #[test]
    fn parses_dg_hash_map() {
        let parsed = parse_lds_security_object(&sample_der()).unwrap();
        assert_eq!(parsed.hash_algorithm_oid, "2.16.840.1.101.3.4.2.1");
        assert_eq!(parsed.dg_hash_map.len(), 2);
        assert_eq!(parsed.dg_hash_map[&1], vec![0xaa; 32]);
        assert_eq!(parsed.dg_hash_map[&2], vec![0xbb; 32]);
    }

    #[test]
    fn re_parsing_the_same_bytes_is_stable() {
        let der = sample_der();
        let first = parse_lds_security_object(&der).unwrap();
        let second = parse_lds_security_object(&der).unwrap();
        assert_eq!(first.dg_hash_map, second.dg_hash_map);
    }
}
