use ::duckdb::{params, Connection, OptionalExt};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_star_schema",
        sql: r#"
CREATE SEQUENCE IF NOT EXISTS seq_reference_entity_id START 1;
CREATE SEQUENCE IF NOT EXISTS seq_instrument_id START 1;
CREATE SEQUENCE IF NOT EXISTS seq_contract_id START 1;

CREATE TABLE IF NOT EXISTS reference_entity (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_reference_entity_id'),
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS instrument (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_instrument_id'),
    reference_id BIGINT NOT NULL REFERENCES reference_entity(id),
    symbol TEXT NOT NULL,
    instrument_type TEXT NOT NULL,
    UNIQUE(reference_id, symbol, instrument_type)
);

CREATE TABLE IF NOT EXISTS contract (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_contract_id'),
    instrument_id BIGINT NOT NULL REFERENCES instrument(id),
    expiry_date DATE NOT NULL,
    strike_price DECIMAL(18,2),
    option_type TEXT CHECK (option_type IS NULL OR trim(option_type) <> '')
);

CREATE TABLE IF NOT EXISTS trade_fact (
    instrument_id BIGINT NOT NULL REFERENCES instrument(id),
    contract_id BIGINT NOT NULL REFERENCES contract(id),
    trade_date DATE NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    settle_price DOUBLE NOT NULL,
    open_interest BIGINT NOT NULL,
    change_in_oi BIGINT NOT NULL,
    contracts_traded BIGINT NOT NULL,
    value_in_lakh DOUBLE NOT NULL
);

CREATE TABLE IF NOT EXISTS ingest_watermark (
    source_path TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    reference_id BIGINT NOT NULL,
    batches_committed BIGINT NOT NULL,
    rows_committed BIGINT NOT NULL,
    completed BOOLEAN NOT NULL DEFAULT FALSE,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS ingest_log (
    run_id TEXT NOT NULL,
    source_path TEXT NOT NULL,
    batch_index BIGINT NOT NULL,
    row_count BIGINT NOT NULL,
    instruments_inserted BIGINT NOT NULL,
    contracts_inserted BIGINT NOT NULL,
    facts_inserted BIGINT NOT NULL,
    latency_ms BIGINT,
    committed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_contract_instrument_expiry ON contract(instrument_id, expiry_date);
CREATE INDEX IF NOT EXISTS idx_ingest_log_run ON ingest_log(run_id, batch_index);
"#,
    },
];

/// Create the migration ledger and apply every migration not yet recorded.
pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            params![migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                params![migration.version],
            )?;
        }
    }

    Ok(())
}

/// Latest applied migration version, if any.
pub fn current_version(connection: &Connection) -> Result<Option<String>, ::duckdb::Error> {
    connection
        .query_row(
            "SELECT version FROM schema_migrations ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
}
