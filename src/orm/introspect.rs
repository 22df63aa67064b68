//! Schema introspection and the process-wide constraint cache.
//!
//! Unique constraints and foreign keys are reflected from SQLite's metadata
//! pragmas once per table and cached for the process lifetime. The cache is
//! an explicit object owned by application state and injected into the
//! repositories, not a module-level singleton. Concurrent first lookups for
//! the same table may both introspect; they compute identical values, so the
//! winner of the insert race is irrelevant.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::db::Database;
use crate::errors::AppError;

/// Per-table constraint record, immutable once built.
#[derive(Debug, Default, Clone)]
pub struct TableConstraints {
    /// Column-name groups that must be jointly unique.
    pub unique_constraints: Vec<Vec<String>>,
    /// Foreign-key column -> (referenced table, referenced column).
    pub foreign_keys: HashMap<String, (String, String)>,
}

/// Process-wide cache of introspected table constraints.
#[derive(Default)]
pub struct ConstraintCache {
    tables: RwLock<HashMap<String, Arc<TableConstraints>>>,
}

impl ConstraintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the constraints for `table`, introspecting on first access.
    pub async fn get(
        &self,
        pool: &Database,
        table: &str,
    ) -> Result<Arc<TableConstraints>, AppError> {
        if let Some(cached) = self.tables.read().get(table) {
            return Ok(cached.clone());
        }

        let built = Arc::new(
            introspect_table(pool, table)
                .await
                .map_err(AppError::SchemaIntrospection)?,
        );

        let mut tables = self.tables.write();
        Ok(tables
            .entry(table.to_string())
            .or_insert_with(|| built.clone())
            .clone())
    }

    #[cfg(test)]
    pub(crate) fn cached_table_count(&self) -> usize {
        self.tables.read().len()
    }
}

/// Reflect unique constraints and foreign keys for one table.
///
/// Table names come from `Entity::TABLE_NAME` constants, so interpolating
/// them into the pragma text is safe (pragmas cannot take bind parameters).
async fn introspect_table(pool: &Database, table: &str) -> Result<TableConstraints, sqlx::Error> {
    let mut result = TableConstraints::default();

    // (seq, name, unique, origin, partial); origin "pk" rows describe the
    // rowid primary key, which is not a unique *constraint* on payload data.
    let indexes: Vec<(i64, String, i64, String, i64)> =
        sqlx::query_as(&format!("PRAGMA index_list({})", table))
            .fetch_all(pool)
            .await?;

    for (_, index_name, is_unique, origin, _) in indexes {
        if is_unique == 0 || origin == "pk" {
            continue;
        }
        // (seqno, cid, name); name is NULL for expression index members.
        let members: Vec<(i64, i64, Option<String>)> =
            sqlx::query_as(&format!("PRAGMA index_info({})", index_name))
                .fetch_all(pool)
                .await?;
        let columns: Vec<String> = members.into_iter().filter_map(|(_, _, name)| name).collect();
        if !columns.is_empty() {
            result.unique_constraints.push(columns);
        }
    }

    // (id, seq, table, from, to, on_update, on_delete, match); "to" is NULL
    // when the reference is to the implicit primary key.
    let fks: Vec<(i64, i64, String, String, Option<String>, String, String, String)> =
        sqlx::query_as(&format!("PRAGMA foreign_key_list({})", table))
            .fetch_all(pool)
            .await?;

    for (fk_id, seq, referred_table, from, to, _, _, _) in fks {
        // Composite foreign keys keep only their first column, matching the
        // constraint checker which probes one column per relation.
        if seq > 0 {
            tracing::debug!(table, fk_id, column = %from, "skipping trailing composite fk column");
            continue;
        }
        let referred_column = to.unwrap_or_else(|| "id".to_string());
        result.foreign_keys.insert(from, (referred_table, referred_column));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_memory;
    use crate::db::schema_sync::sync_all_tables;

    #[tokio::test]
    async fn test_introspects_user_constraints() {
        let pool = connect_memory().await.unwrap();
        sync_all_tables(&pool).await.unwrap();

        let cache = ConstraintCache::new();
        let constraints = cache.get(&pool, "user").await.unwrap();

        // email and phone are single-column unique constraints
        let mut groups: Vec<Vec<String>> = constraints.unique_constraints.clone();
        groups.sort();
        assert!(groups.contains(&vec!["email".to_string()]));
        assert!(groups.contains(&vec!["phone".to_string()]));

        assert_eq!(
            constraints.foreign_keys.get("group_id"),
            Some(&("user_group".to_string(), "id".to_string()))
        );
        assert_eq!(
            constraints.foreign_keys.get("role_id"),
            Some(&("role".to_string(), "id".to_string()))
        );
    }

    #[tokio::test]
    async fn test_composite_unique_group() {
        let pool = connect_memory().await.unwrap();
        sync_all_tables(&pool).await.unwrap();

        let cache = ConstraintCache::new();
        let constraints = cache.get(&pool, "permission").await.unwrap();
        assert!(
            constraints
                .unique_constraints
                .iter()
                .any(|g| g == &["url".to_string(), "method".to_string()])
        );
    }

    #[tokio::test]
    async fn test_cache_is_reused() {
        let pool = connect_memory().await.unwrap();
        sync_all_tables(&pool).await.unwrap();

        let cache = ConstraintCache::new();
        let first = cache.get(&pool, "user").await.unwrap();
        let second = cache.get(&pool, "user").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.cached_table_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_table_yields_empty_constraints() {
        // PRAGMAs on an unknown table return empty result sets rather than
        // erroring; the record is simply empty.
        let pool = connect_memory().await.unwrap();
        let cache = ConstraintCache::new();
        let constraints = cache.get(&pool, "nonexistent").await.unwrap();
        assert!(constraints.unique_constraints.is_empty());
        assert!(constraints.foreign_keys.is_empty());
    }
}
