//! SQLite schema and forward-only migrations.

/// Version tracking table, created before anything else on every open.
pub const SCHEMA_VERSION_DDL: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    ) STRICT;
";

/// The v1 schema.
///
/// - `submissions`: immutable code submissions.
/// - `reviews`: one per submission, keyed by the public review id.
/// - `agent_results`: append-only, one row per analyzer run; issues are JSON.
/// - `reference_patterns`: retrieval corpus; embeddings are JSON arrays.
pub const SCHEMA_V1_SQL: &str = "
    CREATE TABLE IF NOT EXISTS submissions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        code        TEXT    NOT NULL,
        language    TEXT    NOT NULL,
        filename    TEXT,
        metadata    TEXT    NOT NULL DEFAULT '{}',
        created_at  TEXT    NOT NULL
    ) STRICT;

    CREATE TABLE IF NOT EXISTS reviews (
        review_id     TEXT    PRIMARY KEY,
        submission_id INTEGER NOT NULL UNIQUE
                              REFERENCES submissions(id) ON DELETE CASCADE,
        status        TEXT    NOT NULL DEFAULT 'running'
                              CHECK(status IN ('running', 'completed')),
        total_issues  INTEGER NOT NULL DEFAULT 0,
        created_at    TEXT    NOT NULL,
        completed_at  TEXT
    ) STRICT;

    CREATE TABLE IF NOT EXISTS agent_results (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        review_id      TEXT    NOT NULL REFERENCES reviews(review_id) ON DELETE CASCADE,
        agent_name     TEXT    NOT NULL
                               CHECK(agent_name IN ('security', 'performance', 'quality')),
        status         TEXT    NOT NULL CHECK(status IN ('completed', 'failed')),
        issues         TEXT    NOT NULL DEFAULT '[]',
        summary        TEXT    NOT NULL,
        execution_time REAL    NOT NULL,
        error          TEXT,
        created_at     TEXT    NOT NULL
    ) STRICT;

    CREATE INDEX IF NOT EXISTS idx_agent_results_review ON agent_results(review_id);

    CREATE TABLE IF NOT EXISTS reference_patterns (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT    NOT NULL,
        snippet     TEXT    NOT NULL,
        description TEXT    NOT NULL DEFAULT '',
        category    TEXT    NOT NULL DEFAULT '',
        language    TEXT    NOT NULL DEFAULT '',
        embedding   TEXT
    ) STRICT;
";

/// The v2 schema: at most one result per analyzer and review.
pub const SCHEMA_V2_SQL: &str = "
    CREATE UNIQUE INDEX IF NOT EXISTS idx_agent_results_review_agent
        ON agent_results(review_id, agent_name);
";

/// Latest schema version written by [`migrate`].
pub const SCHEMA_VERSION: i64 = 2;

/// Bring the database up to the latest schema. Idempotent.
pub fn migrate(db: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    db.execute_batch(SCHEMA_VERSION_DDL)?;

    let version: i64 = db
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if version < 1 {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute_batch(SCHEMA_V1_SQL)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
        tx.commit()?;
    }

    if version < 2 {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute_batch(SCHEMA_V2_SQL)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (2)", [])?;
        tx.commit()?;
    }

    Ok(())
}
