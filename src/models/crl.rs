use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crl {
    pub id: uuid::Uuid,
    pub country: String,
    pub issuer_dn: String,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    pub crl_number: Option<String>,
    pub fingerprint: String,
    pub der: Vec<u8>,
    pub revoked_serials: Vec<String>,
    pub directory_stored: bool,
}

impl Crl {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.next_update {
            Some(next) => now > next,
            None => false,
        }
    }

    pub fn has_revoked(&self, serial_hex: &str) -> bool {
        self.revoked_serials.iter().any(|s| s == serial_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(next_update: Option<DateTime<Utc>>) -> Crl {
        Crl {
            id: uuid::Uuid::new_v4(),
            country: "KR".to_string(),
            issuer_dn: "CN=KR CSCA".to_string(),
            this_update: Utc::now() - Duration::days(10),
            next_update,
            crl_number: Some("1".to_string()),
            fingerprint: "f".repeat(64),
            der: vec![],
            revoked_serials: vec!["0a1b".to_string()],
            directory_stored: false,
        }
    }

    #[test]
    fn expired_when_next_update_in_past() {
        let crl = sample(Some(Utc::now() - Duration::days(1)));
        assert!(crl.is_expired(Utc::now()));
    }

    #[test]
    fn not_expired_without_next_update() {
        let crl = sample(None);
        assert!(!crl.is_expired(Utc::now()));
    }

    #[test]
    fn revocation_lookup_is_case_sensitive_hex() {
        let crl = sample(Some(Utc::now() + Duration::days(1)));
        assert!(crl.has_revoked("0a1b"));
        assert!(!crl.has_revoked("ffff"));
    }
}
