//! Key scheme and codec helpers over the sled default tree.
//!
//! All rows share one tree under byte-prefixed keys, so a single sled
//! transaction can touch the request, its overlap registry, the balance row,
//! and the audit record together:
//!
//! - `req/{request_id}`: [`crate::request::LeaveRequest`]
//! - `act/{employee_id}`: `Vec<ActiveSpan>` overlap registry
//! - `bal/{employee_id}/{leave_type_id}/{year}`: [`crate::balance::LeaveBalance`]
//! - `lt/{leave_type_id}`: [`crate::leave_type::LeaveType`]
//! - `audit/{audit_id}`: [`crate::audit::AuditRecord`]

use crate::error::EngineError;
use sled::transaction::{ConflictableTransactionError, TransactionalTree};

pub const REQUEST_PREFIX: &str = "req/";
pub const ACTIVE_PREFIX: &str = "act/";
pub const BALANCE_PREFIX: &str = "bal/";
pub const LEAVE_TYPE_PREFIX: &str = "lt/";
pub const AUDIT_PREFIX: &str = "audit/";

pub fn request_key(id: &str) -> Vec<u8> {
    format!("{REQUEST_PREFIX}{id}").into_bytes()
}

pub fn active_key(employee_id: &str) -> Vec<u8> {
    format!("{ACTIVE_PREFIX}{employee_id}").into_bytes()
}

pub fn balance_key(employee_id: &str, leave_type_id: &str, year: i32) -> Vec<u8> {
    format!("{BALANCE_PREFIX}{employee_id}/{leave_type_id}/{year:04}").into_bytes()
}

/// Prefix of every balance key for one employee.
pub fn balance_prefix(employee_id: &str) -> Vec<u8> {
    format!("{BALANCE_PREFIX}{employee_id}/").into_bytes()
}

pub fn leave_type_key(id: &str) -> Vec<u8> {
    format!("{LEAVE_TYPE_PREFIX}{id}").into_bytes()
}

pub fn audit_key(id: &str) -> Vec<u8> {
    format!("{AUDIT_PREFIX}{id}").into_bytes()
}

pub fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, EngineError> {
    minicbor::to_vec(value).map_err(|e| EngineError::Internal(format!("cbor encode: {e}")))
}

pub fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T, EngineError> {
    minicbor::decode(bytes).map_err(|e| EngineError::Internal(format!("cbor decode: {e}")))
}

/// Read a row outside any transaction.
pub fn get_row<T: for<'b> minicbor::Decode<'b, ()>>(
    db: &sled::Db,
    key: &[u8],
) -> Result<Option<T>, EngineError> {
    match db.get(key)? {
        Some(bytes) => decode(&bytes).map(Some),
        None => Ok(None),
    }
}

/// Write a row outside any transaction (reference-data seeding, backfills).
pub fn put_row<T: minicbor::Encode<()>>(
    db: &sled::Db,
    key: &[u8],
    value: &T,
) -> Result<(), EngineError> {
    let bytes = encode(value)?;
    db.insert(key, bytes)?;
    Ok(())
}

/// Decode every row under a key prefix.
pub fn scan_rows<T: for<'b> minicbor::Decode<'b, ()>>(
    db: &sled::Db,
    prefix: &[u8],
) -> Result<Vec<T>, EngineError> {
    let mut rows = Vec::new();
    for entry in db.scan_prefix(prefix) {
        let (_, bytes) = entry?;
        rows.push(decode(&bytes)?);
    }
    Ok(rows)
}

pub type TxResult<T> = Result<T, ConflictableTransactionError<EngineError>>;

pub fn tx_get<T: for<'b> minicbor::Decode<'b, ()>>(
    tx: &TransactionalTree,
    key: &[u8],
) -> TxResult<Option<T>> {
    match tx.get(key)? {
        Some(bytes) => decode(&bytes)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

pub fn tx_put<T: minicbor::Encode<()>>(
    tx: &TransactionalTree,
    key: &[u8],
    value: &T,
) -> TxResult<()> {
    let bytes = encode(value).map_err(ConflictableTransactionError::Abort)?;
    tx.insert(key, bytes)?;
    Ok(())
}

pub fn tx_remove(tx: &TransactionalTree, key: &[u8]) -> TxResult<()> {
    tx.remove(key)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_key_separates_components() {
        let key = balance_key("emp-1", "lt-9", 2026);
        assert_eq!(key, b"bal/emp-1/lt-9/2026".to_vec());
        assert!(key.starts_with(&balance_prefix("emp-1")));
        // A different employee with a shared id prefix must not collide.
        assert!(!balance_key("emp-10", "lt-9", 2026).starts_with(&balance_prefix("emp-1")));
    }

    #[test]
    fn prefixes_do_not_shadow_each_other() {
        let prefixes = [
            REQUEST_PREFIX,
            ACTIVE_PREFIX,
            BALANCE_PREFIX,
            LEAVE_TYPE_PREFIX,
            AUDIT_PREFIX,
        ];
        for (i, a) in prefixes.iter().enumerate() {
            for (j, b) in prefixes.iter().enumerate() {
                if i != j {
                    assert!(!a.starts_with(b), "{a} shadows {b}");
                }
            }
        }
    }
}
