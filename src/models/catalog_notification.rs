use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supplemental to the distilled spec (SPEC_FULL.md "Supplemental"): the
/// record a scheduled external-catalog poll leaves behind when it detects
/// a newer upstream version number. The spec is explicit that detecting a
/// new version creates a notification and nothing else — no automatic
/// download follows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogNotification {
    pub id: uuid::Uuid,
    pub detected_version: String,
    pub previous_known_version: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl CatalogNotification {
    pub fn new(detected_version: String, previous_known_version: Option<String>) -> Self {
        CatalogNotification {
            id: uuid::Uuid::new_v4(),
            detected_version,
            previous_known_version,
            detected_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_notification_has_no_previous_version_by_default() {
        let n = CatalogNotification::new("2024-2".to_string(), None);
        assert_eq!(n.detected_version, "2024-2");
        assert!(n.previous_known_version.is_none());
    }
}
