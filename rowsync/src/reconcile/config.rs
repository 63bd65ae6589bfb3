use serde::{Deserialize, Serialize};

/// Table-role flags shared by reader and writer configs.
///
/// A reader/writer pair is correlated by `id`; both sides carry the same
/// `db`/`table` identity but may disagree on the role flags, which is why
/// pairing is validated when a snapshot is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncFlags {
    /// Correlation id shared by the reader and writer halves of a pair.
    pub id: u64,
    /// Source database name.
    pub db: String,
    /// Source table name.
    pub table: String,
    /// Whether a row of this table maps directly to a whole target record,
    /// as opposed to feeding a derived aggregate.
    #[serde(default)]
    pub is_main_table: bool,
    /// Whether deleting this row removes the whole target record.
    #[serde(default)]
    pub del_whole_data: bool,
    /// Whether updates are written as query-based partial patches.
    #[serde(default)]
    pub update_by_query: bool,
    /// Comma-separated field names compared between before/after images to
    /// decide whether an UPDATE is relevant. Empty means always relevant.
    #[serde(default)]
    pub update_compare_fields: Option<String>,
    /// Soft-delete marker field name, when the table uses logical deletes.
    #[serde(default)]
    pub del_key_name: Option<String>,
    /// Marker value of `del_key_name` meaning "deleted".
    #[serde(default)]
    pub has_del_val: Option<String>,
}

impl SyncFlags {
    /// Returns the `db.table` key this config applies to.
    pub fn table_key(&self) -> String {
        format!("{}.{}", self.db, self.table)
    }

    /// Returns the parsed compare-field names, empty when unset.
    pub fn compare_fields(&self) -> Vec<&str> {
        self.update_compare_fields
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect()
    }
}

/// Source-side half of a sync config pair: role flags plus the query
/// templates the reader executes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReaderConfig {
    #[serde(flatten)]
    pub flags: SyncFlags,
    /// Template fetching the complete row (and joined projection) by key.
    #[serde(default)]
    pub query_whole_sql: Option<String>,
    /// Template fetching the partial projection used for query-based updates.
    #[serde(default)]
    pub query_update_sql: Option<String>,
    /// Template resolving delete context for cascading deletes.
    #[serde(default)]
    pub query_delete_sql: Option<String>,
}

/// Target-side half of a sync config pair: role flags plus target
/// addressing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WriterConfig {
    #[serde(flatten)]
    pub flags: SyncFlags,
    /// Target index or collection name.
    pub index: String,
    /// Routing key expression, when the target store shards by routing.
    #[serde(default)]
    pub routing: Option<String>,
    /// Field used as the target document id.
    #[serde(default)]
    pub id_name: Option<String>,
    /// Source field the document id is derived from.
    #[serde(default)]
    pub id_origin_name: Option<String>,
    /// Static prefix prepended to the document id.
    #[serde(default)]
    pub id_prefix: Option<String>,
    /// Script applied for partial updates, when the target supports it.
    #[serde(default)]
    pub update_script: Option<String>,
    /// Target-side foreign key field for related-row addressing.
    #[serde(default)]
    pub foreign_key_name: Option<String>,
    /// Source field the foreign key is derived from.
    #[serde(default)]
    pub foreign_key_origin_name: Option<String>,
}
