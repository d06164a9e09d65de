//! SQL schema definitions.

/// Schema v1.
///
/// Every piece of engine state is a JSON body addressed by `(kind, key)`.
/// Keys are lowercase hex identities, or `<service>/<staker>` and
/// `<asset>/<account>` for per-account rows.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    kind TEXT NOT NULL,
    key TEXT NOT NULL,
    body TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (kind, key)
);

CREATE INDEX IF NOT EXISTS idx_records_updated ON records(updated_at);
"#;
