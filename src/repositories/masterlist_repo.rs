//! Master List and Deviation List persistence (spec §3, §Supplemental).

use crate::error::PkdResult;
use crate::models::{DeviationListRecord, MasterList};
use crate::query::{QueryExecutor, QueryRow, SqlValue};

pub trait MasterListRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, masterlist: &MasterList) -> PkdResult<()>;
    fn find_by_fingerprint(&self, executor: &mut dyn QueryExecutor, fingerprint: &str) -> PkdResult<Option<MasterList>>;
    fn insert_deviation_list(&self, executor: &mut dyn QueryExecutor, record: &DeviationListRecord) -> PkdResult<()>;
}

pub struct SqlMasterListRepository;

fn row_to_masterlist(row: &QueryRow) -> Option<MasterList> {
    Some(MasterList {
        id: uuid::Uuid::parse_str(row.text("id")?).ok()?,
        signer_country: row.text("signer_country")?.to_string(),
        version: row.int("version").map(|v| v as u32),
        signing_time: row.timestamp("signing_time"),
        fingerprint: row.text("fingerprint")?.to_string(),
        mlsc_fingerprint: row.text("mlsc_fingerprint")?.to_string(),
        certificate_count: row.int("certificate_count")? as u32,
        cms_bytes: row.bytes("cms_bytes")?.to_vec(),
        directory_stored: row.bool("directory_stored")?,
    })
}

impl MasterListRepository for SqlMasterListRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, masterlist: &MasterList) -> PkdResult<()> {
        executor.execute(
            "INSERT INTO masterlists (id, signer_country, version, signing_time, fingerprint, \
             mlsc_fingerprint, certificate_count, cms_bytes, directory_stored) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            &[
                SqlValue::from(masterlist.id.to_string().as_str()),
                SqlValue::from(masterlist.signer_country.as_str()),
                masterlist.version.map(|v| SqlValue::Int(v as i64)).unwrap_or(SqlValue::Null),
                masterlist.signing_time.map(SqlValue::Timestamp).unwrap_or(SqlValue::Null),
                SqlValue::from(masterlist.fingerprint.as_str()),
                SqlValue::from(masterlist.mlsc_fingerprint.as_str()),
                SqlValue::Int(masterlist.certificate_count as i64),
                SqlValue::Bytes(masterlist.cms_bytes.clone()),
                SqlValue::Bool(masterlist.directory_stored),
            ],
        )?;
        Ok(())
    }

    fn find_by_fingerprint(&self, executor: &mut dyn QueryExecutor, fingerprint: &str) -> PkdResult<Option<MasterList>> {
        let rows = executor.query(
            "SELECT * FROM masterlists WHERE fingerprint = ?",
            &[SqlValue::from(fingerprint)],
        )?;
        Ok(rows.first().and_then(row_to_masterlist))
    }

    fn insert_deviation_list(&self, executor: &mut dyn QueryExecutor, record: &DeviationListRecord) -> PkdResult<()> {
        executor.execute(
            "INSERT INTO deviation_lists (id, signer_country, signing_time, fingerprint, entry_count) \
             VALUES (?, ?, ?, ?, ?)",
            &[
                SqlValue::from(record.id.to_string().as_str()),
                SqlValue::from(record.signer_country.as_str()),
                record.signing_time.map(SqlValue::Timestamp).unwrap_or(SqlValue::Null),
                SqlValue::from(record.fingerprint.as_str()),
                SqlValue::Int(record.entry_count as i64),
            ],
        )?;
        Ok(())
    }
}
