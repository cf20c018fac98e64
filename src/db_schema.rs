// Schema definitions
//
// Every collection lives in one table; documents are stored as JSON text.
pub const DOCUMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL DEFAULT '{}',
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL,
    PRIMARY KEY (collection, id)
) WITHOUT ROWID;
"#;

pub const SCHEMA_SQL: &[&str] = &[
    DOCUMENTS_TABLE,
    "CREATE INDEX IF NOT EXISTS idx_documents_collection_created ON documents(collection, created_at);",
];
