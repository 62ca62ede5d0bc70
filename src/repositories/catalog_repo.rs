//! External-catalog version notification persistence (spec §4.8,
//! SPEC_FULL.md "Supplemental").

use crate::error::PkdResult;
use crate::models::CatalogNotification;
use crate::query::{QueryExecutor, QueryRow, SqlValue};

pub trait CatalogRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, notification: &CatalogNotification) -> PkdResult<()>;
    /// The version last recorded, used by the poller to decide whether a
    /// freshly-observed upstream version is actually new.
    fn last_known_version(&self, executor: &mut dyn QueryExecutor) -> PkdResult<Option<String>>;
}

pub struct SqlCatalogRepository;

fn row_to_notification(row: &QueryRow) -> Option<CatalogNotification> {
    Some(CatalogNotification {
        id: uuid::Uuid::parse_str(row.text("id")?).ok()?,
        detected_version: row.text("detected_version")?.to_string(),
        previous_known_version: row.text("previous_known_version").map(|s| s.to_string()),
        detected_at: row.timestamp("detected_at")?,
    })
}

impl CatalogRepository for SqlCatalogRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, notification: &CatalogNotification) -> PkdResult<()> {
        executor.execute(
            "INSERT INTO catalog_notifications (id, detected_version, previous_known_version, detected_at) \
             VALUES (?, ?, ?, ?)",
            &[
                SqlValue::from(notification.id.to_string().as_str()),
                SqlValue::from(notification.detected_version.as_str()),
                notification
                    .previous_known_version
                    .clone()
                    .map(SqlValue::Text)
                    .unwrap_or(SqlValue::Null),
                SqlValue::Timestamp(notification.detected_at),
            ],
        )?;
        Ok(())
    }

    fn last_known_version(&self, executor: &mut dyn QueryExecutor) -> PkdResult<Option<String>> {
        let rows = executor.query(
            "SELECT * FROM catalog_notifications ORDER BY detected_at DESC",
            &[],
        )?;
        Ok(rows.first().and_then(row_to_notification).map(|n| n.detected_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_to_notification_requires_a_parseable_id() {
        let mut row = QueryRow::default();
        row.columns.insert("id".to_string(), SqlValue::Text("not-a-uuid".to_string()));
        assert!(row_to_notification(&row).is_none());
    }
}
