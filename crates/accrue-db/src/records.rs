//! Typed access to the `records` table.

use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{DbError, Result};

/// Record families stored in the `records` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Minter,
    Router,
    Service,
    Position,
    Balance,
    Meta,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minter => "minter",
            Self::Router => "router",
            Self::Service => "service",
            Self::Position => "position",
            Self::Balance => "balance",
            Self::Meta => "meta",
        }
    }
}

/// Insert or replace a record.
pub fn put<T: Serialize>(conn: &Connection, kind: Kind, key: &str, body: &T, now: u64) -> Result<()> {
    let json = serde_json::to_string(body).map_err(|e| DbError::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT OR REPLACE INTO records (kind, key, body, updated_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![kind.as_str(), key, json, now as i64],
    )?;
    Ok(())
}

/// Get a record, or `None` if it does not exist.
pub fn find<T: DeserializeOwned>(conn: &Connection, kind: Kind, key: &str) -> Result<Option<T>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM records WHERE kind = ?1 AND key = ?2",
            rusqlite::params![kind.as_str(), key],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|json| decode(kind, key, &json)).transpose()
}

/// Get a record.
///
/// # Errors
///
/// - [`DbError::NotFound`] if no record has this kind and key
/// - [`DbError::Serialization`] if the body does not decode as `T`
pub fn get<T: DeserializeOwned>(conn: &Connection, kind: Kind, key: &str) -> Result<T> {
    find(conn, kind, key)?
        .ok_or_else(|| DbError::NotFound(format!("{} '{key}'", kind.as_str())))
}

/// All records of one kind, ordered by key.
pub fn list<T: DeserializeOwned>(conn: &Connection, kind: Kind) -> Result<Vec<(String, T)>> {
    let mut stmt = conn.prepare("SELECT key, body FROM records WHERE kind = ?1 ORDER BY key")?;
    let rows = stmt
        .query_map([kind.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(key, json)| {
            let body = decode(kind, &key, &json)?;
            Ok((key, body))
        })
        .collect()
}

/// Delete a record. Returns whether it existed.
pub fn delete(conn: &Connection, kind: Kind, key: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM records WHERE kind = ?1 AND key = ?2",
        rusqlite::params![kind.as_str(), key],
    )?;
    Ok(changed > 0)
}

/// Delete every record of one kind. Returns how many were removed.
pub fn clear(conn: &Connection, kind: Kind) -> Result<usize> {
    Ok(conn.execute("DELETE FROM records WHERE kind = ?1", [kind.as_str()])?)
}

fn decode<T: DeserializeOwned>(kind: Kind, key: &str, json: &str) -> Result<T> {
    serde_json::from_str(json)
        .map_err(|e| DbError::Serialization(format!("{} '{key}': {e}", kind.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use accrue_types::Decimal;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    #[test]
    fn test_put_get() {
        let conn = test_db();
        put(&conn, Kind::Meta, "rate", &Decimal::from_int(3), 10).expect("put");
        let rate: Decimal = get(&conn, Kind::Meta, "rate").expect("get");
        assert_eq!(rate, Decimal::from_int(3));
    }

    #[test]
    fn test_put_replaces() {
        let conn = test_db();
        put(&conn, Kind::Meta, "k", &1u64, 10).expect("put");
        put(&conn, Kind::Meta, "k", &2u64, 11).expect("put");
        assert_eq!(get::<u64>(&conn, Kind::Meta, "k").expect("get"), 2);
        assert_eq!(list::<u64>(&conn, Kind::Meta).expect("list").len(), 1);
    }

    #[test]
    fn test_missing_record() {
        let conn = test_db();
        assert!(matches!(
            get::<u64>(&conn, Kind::Minter, "minter"),
            Err(DbError::NotFound(_))
        ));
        assert_eq!(find::<u64>(&conn, Kind::Minter, "minter").expect("find"), None);
    }

    #[test]
    fn test_kinds_are_separate() {
        let conn = test_db();
        put(&conn, Kind::Router, "aa", &1u64, 0).expect("put");
        put(&conn, Kind::Service, "aa", &2u64, 0).expect("put");
        assert_eq!(get::<u64>(&conn, Kind::Router, "aa").expect("get"), 1);
        assert_eq!(get::<u64>(&conn, Kind::Service, "aa").expect("get"), 2);
    }

    #[test]
    fn test_list_ordered_by_key() {
        let conn = test_db();
        put(&conn, Kind::Balance, "b", &2u64, 0).expect("put");
        put(&conn, Kind::Balance, "a", &1u64, 0).expect("put");
        let rows: Vec<(String, u64)> = list(&conn, Kind::Balance).expect("list");
        assert_eq!(rows, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
    }

    #[test]
    fn test_delete_and_clear() {
        let conn = test_db();
        put(&conn, Kind::Position, "x", &1u64, 0).expect("put");
        put(&conn, Kind::Position, "y", &1u64, 0).expect("put");
        assert!(delete(&conn, Kind::Position, "x").expect("delete"));
        assert!(!delete(&conn, Kind::Position, "x").expect("delete again"));
        assert_eq!(clear(&conn, Kind::Position).expect("clear"), 1);
    }

    #[test]
    fn test_undecodable_body() {
        let conn = test_db();
        put(&conn, Kind::Meta, "k", &"not a number", 0).expect("put");
        assert!(matches!(
            get::<u64>(&conn, Kind::Meta, "k"),
            Err(DbError::Serialization(_))
        ));
    }
}
