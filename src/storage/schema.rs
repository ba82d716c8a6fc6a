use rusqlite::Connection;

pub mod tables {
    pub const RUNS: &str = "runs";
    pub const STAGED: &str = "staged";

    pub const ALL_TABLES: &[&str] = &[RUNS, STAGED];
}

pub mod columns {
    pub const SESSION_ID: &str = "session_id";
    pub const TARGET_NAME: &str = "target_name";
    pub const MODE: &str = "mode";
    pub const FILTER: &str = "filter";
    pub const CREATED_AT: &str = "created_at";
    pub const KIND: &str = "kind";
    pub const PAYLOAD: &str = "payload";
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    session_id TEXT PRIMARY KEY,
    target_name TEXT NOT NULL,
    mode TEXT NOT NULL,
    filter TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS staged (
    session_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (session_id, kind)
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
