//! SQL rewriting between the dialect-neutral `?`-placeholder style
//! repositories are written in and each backend's native bind syntax
//! (spec §4.2: relational-A is lowercase/native-bool/`LIMIT .. OFFSET ..`,
//! relational-B is uppercase/numeric-bool/`OFFSET .. FETCH ..`).

use crate::config::DbDialect;

/// Rewrites `?` placeholders in source order into the target dialect's
/// native positional bind markers (`$1, $2, ...` for relational-A,
/// `:1, :2, ...` for relational-B).
pub fn rewrite_placeholders(sql: &str, dialect: DbDialect) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0usize;
    for ch in sql.chars() {
        if ch == '?' {
            index += 1;
            match dialect {
                DbDialect::A => out.push_str(&format!("${index}")),
                DbDialect::B => out.push_str(&format!(":{index}")),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Rewrites a `LIMIT {limit} OFFSET {offset}` clause into relational-B's
/// `OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY` form. No-op for
/// relational-A, which accepts the `LIMIT .. OFFSET ..` clause natively.
pub fn rewrite_limit_offset(limit: u64, offset: u64, dialect: DbDialect) -> String {
    match dialect {
        DbDialect::A => format!("LIMIT {limit} OFFSET {offset}"),
        DbDialect::B => format!("OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_rewrite_per_dialect() {
        assert_eq!(
            rewrite_placeholders("WHERE a = ? AND b = ?", DbDialect::A),
            "WHERE a = $1 AND b = $2"
        );
        assert_eq!(
            rewrite_placeholders("WHERE a = ? AND b = ?", DbDialect::B),
            "WHERE a = :1 AND b = :2"
        );
    }

    #[test]
    fn limit_offset_rewrites_for_relational_b() {
        assert_eq!(
            rewrite_limit_offset(20, 40, DbDialect::B),
            "OFFSET 40 ROWS FETCH NEXT 20 ROWS ONLY"
        );
        assert_eq!(rewrite_limit_offset(20, 40, DbDialect::A), "LIMIT 20 OFFSET 40");
    }
}
