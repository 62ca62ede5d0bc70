//! CRL persistence (spec §3 `Crl`).

use crate::error::PkdResult;
use crate::models::Crl;
use crate::query::{QueryExecutor, QueryRow, SqlValue};

pub trait CrlRepository {
    fn find_by_issuer(&self, executor: &mut dyn QueryExecutor, issuer_dn: &str) -> PkdResult<Option<Crl>>;
    fn upsert(&self, executor: &mut dyn QueryExecutor, crl: &Crl) -> PkdResult<()>;
    fn list_not_directory_stored(&self, executor: &mut dyn QueryExecutor) -> PkdResult<Vec<Crl>>;
    fn mark_directory_stored(&self, executor: &mut dyn QueryExecutor, crl_id: uuid::Uuid) -> PkdResult<()>;
}

pub struct SqlCrlRepository;

fn row_to_crl(row: &QueryRow) -> Option<Crl> {
    Some(Crl {
        id: uuid::Uuid::parse_str(row.text("id")?).ok()?,
        country: row.text("country")?.to_string(),
        issuer_dn: row.text("issuer_dn")?.to_string(),
        this_update: row.timestamp("this_update")?,
        next_update: row.timestamp("next_update"),
        crl_number: row.text("crl_number").map(|s| s.to_string()),
        fingerprint: row.text("fingerprint")?.to_string(),
        der: row.bytes("der")?.to_vec(),
        revoked_serials: row
            .text("revoked_serials")
            .map(|s| s.split(',').filter(|s| !s.is_empty()).map(|s| s.to_string()).collect())
            .unwrap_or_default(),
        directory_stored: row.bool("directory_stored")?,
    })
}

impl CrlRepository for SqlCrlRepository {
    fn find_by_issuer(&self, executor: &mut dyn QueryExecutor, issuer_dn: &str) -> PkdResult<Option<Crl>> {
        let rows = executor.query(
            "SELECT * FROM crls WHERE issuer_dn = ? ORDER BY this_update DESC",
            &[SqlValue::from(issuer_dn)],
        )?;
        Ok(rows.first().and_then(row_to_crl))
    }

    fn upsert(&self, executor: &mut dyn QueryExecutor, crl: &Crl) -> PkdResult<()> {
        executor.execute(
            "INSERT INTO crls (id, country, issuer_dn, this_update, next_update, crl_number, \
             fingerprint, der, revoked_serials, directory_stored) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            &[
                SqlValue::from(crl.id.to_string().as_str()),
                SqlValue::from(crl.country.as_str()),
                SqlValue::from(crl.issuer_dn.as_str()),
                SqlValue::Timestamp(crl.this_update),
                crl.next_update.map(SqlValue::Timestamp).unwrap_or(SqlValue::Null),
                crl.crl_number.clone().map(|s| SqlValue::Text(s)).unwrap_or(SqlValue::Null),
                SqlValue::from(crl.fingerprint.as_str()),
                SqlValue::Bytes(crl.der.clone()),
                SqlValue::from(crl.revoked_serials.join(",").as_str()),
                SqlValue::Bool(crl.directory_stored),
            ],
        )?;
        Ok(())
    }

    fn list_not_directory_stored(&self, executor: &mut dyn QueryExecutor) -> PkdResult<Vec<Crl>> {
        let rows = executor.query(
            "SELECT * FROM crls WHERE directory_stored = ?",
            &[SqlValue::Bool(false)],
        )?;
        Ok(rows.iter().filter_map(row_to_crl).collect())
    }

    fn mark_directory_stored(&self, executor: &mut dyn QueryExecutor, crl_id: uuid::Uuid) -> PkdResult<()> {
        executor.execute(
            "UPDATE crls SET directory_stored = ? WHERE id = ?",
            &[SqlValue::Bool(true), SqlValue::from(crl_id.to_string().as_str())],
        )?;
        Ok(())
    }
}
