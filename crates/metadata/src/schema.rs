//! SQL rendered from the configurable log schema.
//!
//! Table and column names come from [`SchemaConfig`], so statements are built
//! once at store construction. Selected columns are aliased back to the field
//! names of the row models, which keeps `FromRow` independent of naming.

use reclaim_core::config::SchemaConfig;

/// Every statement the store issues against the two log tables.
#[derive(Debug, Clone)]
pub struct Statements {
    pub create_schema: String,

    pub insert_transaction: String,
    pub select_transaction: String,
    pub list_transactions_all: String,
    pub list_transactions_open: String,
    pub list_transactions_restored: String,
    pub mark_transaction_restored: String,
    pub truncate_transactions: String,

    pub insert_log_entry: String,
    pub select_outstanding_for_entity: String,
    pub mark_entry_restored: String,
    pub count_outstanding: String,
    pub count_all_outstanding: String,
    pub select_outstanding_entries: String,
    pub select_outstanding_grouped: String,
    pub select_entries: String,
    pub truncate_log: String,
}

impl Statements {
    /// Render all statements for a schema.
    pub fn new(schema: &SchemaConfig) -> Self {
        let tt = &schema.transaction_table;
        let lt = &schema.log_table;
        let id = &schema.column_id;
        let txn = &schema.column_delete_transaction_id;
        let deleted_at = &schema.column_deleted_at;
        let deleted_by = &schema.column_deleted_by_id;
        let restored_at = &schema.column_restored_at;
        let restored_by = &schema.column_restored_by_id;
        let row_id = &schema.column_row_id;
        let class = &schema.column_model_class;

        let transaction_columns = format!(
            "{id} AS id, {deleted_by} AS deleted_by_id, {deleted_at} AS deleted_at, \
             {restored_at} AS restored_at, {restored_by} AS restored_by_id"
        );
        let log_columns = format!(
            "{id} AS id, {txn} AS delete_transaction_id, {class} AS model_class, \
             {row_id} AS row_id, {restored_at} AS restored_at, {restored_by} AS restored_by_id"
        );

        let create_schema = format!(
            r#"
-- One row per logical batch of deletions
CREATE TABLE IF NOT EXISTS {tt} (
    {id} INTEGER PRIMARY KEY AUTOINCREMENT,
    {deleted_by} INTEGER NOT NULL,
    {deleted_at} TEXT NOT NULL,
    {restored_at} TEXT,
    {restored_by} INTEGER,
    CHECK (({restored_at} IS NULL) = ({restored_by} IS NULL))
);

-- One row per deleted entity
CREATE TABLE IF NOT EXISTS {lt} (
    {id} INTEGER PRIMARY KEY AUTOINCREMENT,
    {txn} INTEGER NOT NULL REFERENCES {tt}({id}),
    {class} TEXT NOT NULL,
    {row_id} TEXT NOT NULL,
    {restored_at} TEXT,
    {restored_by} INTEGER,
    CHECK (({restored_at} IS NULL) = ({restored_by} IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_{lt}_transaction ON {lt}({txn}, {restored_at});
CREATE INDEX IF NOT EXISTS idx_{lt}_entity ON {lt}({class}, {row_id}, {restored_at});
"#
        );

        Self {
            create_schema,

            insert_transaction: format!(
                "INSERT INTO {tt} ({deleted_by}, {deleted_at}) VALUES (?, ?)"
            ),
            select_transaction: format!("SELECT {transaction_columns} FROM {tt} WHERE {id} = ?"),
            list_transactions_all: format!(
                "SELECT {transaction_columns} FROM {tt} ORDER BY {id} DESC LIMIT ?"
            ),
            list_transactions_open: format!(
                "SELECT {transaction_columns} FROM {tt} WHERE {restored_at} IS NULL ORDER BY {id} DESC LIMIT ?"
            ),
            list_transactions_restored: format!(
                "SELECT {transaction_columns} FROM {tt} WHERE {restored_at} IS NOT NULL ORDER BY {id} DESC LIMIT ?"
            ),
            // Guarded so a closed transaction keeps its original restore stamp.
            mark_transaction_restored: format!(
                "UPDATE {tt} SET {restored_at} = ?, {restored_by} = ? WHERE {id} = ? AND {restored_at} IS NULL"
            ),
            truncate_transactions: format!("DELETE FROM {tt}"),

            // Inserts nothing once the transaction has been closed.
            insert_log_entry: format!(
                "INSERT INTO {lt} ({txn}, {class}, {row_id}) \
                 SELECT ?, ?, ? WHERE EXISTS \
                 (SELECT 1 FROM {tt} WHERE {id} = ? AND {restored_at} IS NULL)"
            ),
            select_outstanding_for_entity: format!(
                "SELECT {log_columns} FROM {lt} WHERE {class} = ? AND {row_id} = ? AND {restored_at} IS NULL ORDER BY {id}"
            ),
            mark_entry_restored: format!(
                "UPDATE {lt} SET {restored_at} = ?, {restored_by} = ? WHERE {id} = ? AND {restored_at} IS NULL"
            ),
            count_outstanding: format!(
                "SELECT COUNT(*) FROM {lt} WHERE {txn} = ? AND {restored_at} IS NULL"
            ),
            count_all_outstanding: format!(
                "SELECT COUNT(*) FROM {lt} WHERE {restored_at} IS NULL"
            ),
            select_outstanding_entries: format!(
                "SELECT {log_columns} FROM {lt} WHERE {txn} = ? AND {restored_at} IS NULL ORDER BY {id} ASC"
            ),
            select_outstanding_grouped: format!(
                "SELECT {class} AS model_class, COUNT(*) AS outstanding FROM {lt} \
                 WHERE {txn} = ? AND {restored_at} IS NULL GROUP BY {class} ORDER BY {class}"
            ),
            select_entries: format!(
                "SELECT {log_columns} FROM {lt} WHERE {txn} = ? ORDER BY {id} ASC"
            ),
            truncate_log: format!("DELETE FROM {lt}"),
        }
    }
}
