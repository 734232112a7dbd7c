//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS raw_intake_log (
    log_id        TEXT PRIMARY KEY,
    source_type   TEXT NOT NULL,
    received_at   TEXT NOT NULL,   -- fixed-width RFC 3339 UTC
    status        TEXT NOT NULL,   -- 'received' | 'processing' | 'completed' | 'failed'
    target_schema TEXT,
    payload_json  TEXT
);

-- The ledger is strictly append-only: the triggers below refuse every
-- UPDATE and DELETE.
CREATE TABLE IF NOT EXISTS ledger_events (
    event_id          TEXT PRIMARY KEY,
    entity_type       TEXT NOT NULL,
    entity_id         TEXT NOT NULL,
    event_type        TEXT NOT NULL,
    event_timestamp   TEXT NOT NULL,   -- ledger-write time
    event_date        TEXT NOT NULL,   -- partition key, YYYY-MM-DD of event_timestamp
    source_timestamp  TEXT,
    version           INTEGER NOT NULL CHECK (version > 0),
    data_before       TEXT,            -- JSON object or NULL
    data_after        TEXT NOT NULL,   -- JSON object
    data_fingerprint  TEXT NOT NULL,
    source_system     TEXT NOT NULL,
    changed_fields    TEXT NOT NULL DEFAULT '[]',
    change_reason     TEXT,
    actor_type        TEXT NOT NULL DEFAULT 'system',
    actor_id          TEXT,
    raw_log_id        TEXT,            -- raw_intake_log.log_id; not enforced
    UNIQUE (entity_type, entity_id, version),
    CHECK  (json_valid(data_after))
);

CREATE TRIGGER IF NOT EXISTS ledger_events_no_update
BEFORE UPDATE ON ledger_events
BEGIN
    SELECT RAISE(ABORT, 'ledger_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS ledger_events_no_delete
BEFORE DELETE ON ledger_events
BEGIN
    SELECT RAISE(ABORT, 'ledger_events is append-only');
END;

CREATE INDEX IF NOT EXISTS ledger_events_time_idx  ON ledger_events(entity_type, event_timestamp);
CREATE INDEX IF NOT EXISTS ledger_events_date_idx  ON ledger_events(event_date);
CREATE INDEX IF NOT EXISTS ledger_events_raw_idx   ON ledger_events(raw_log_id);
CREATE INDEX IF NOT EXISTS raw_intake_received_idx ON raw_intake_log(status, received_at);

-- Read-optimized copies refreshed from the ledger. Not authoritative.
CREATE TABLE IF NOT EXISTS orders (
    entity_id    TEXT PRIMARY KEY,
    data_json    TEXT NOT NULL,
    refreshed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS expenses (
    entity_id    TEXT PRIMARY KEY,
    data_json    TEXT NOT NULL,
    refreshed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS purchases (
    entity_id    TEXT PRIMARY KEY,
    data_json    TEXT NOT NULL,
    refreshed_at TEXT NOT NULL
);

PRAGMA user_version = 1;
";
