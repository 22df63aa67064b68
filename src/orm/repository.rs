//! Generic repository: reads through the query assembler, writes through the
//! constraint enforcer and mutation engine.
//!
//! Constraint checking happens at the application layer before any write so
//! violations surface as structured, localizable errors instead of raw
//! storage failures. The pre-check cannot close the race window between
//! check and write entirely; storage-level unique violations that slip
//! through are remapped to the same error type on the way out.

use std::marker::PhantomData;
use std::sync::Arc;

use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::db::Database;
use crate::errors::AppError;
use crate::i18n::Locale;
use crate::orm::introspect::{ConstraintCache, TableConstraints};
use crate::orm::query::{EntityQuery, execute_with_binds};
use crate::orm::traits::{
    Entity, FieldKind, FieldSet, ManyToMany, QuerySpec, RelationLoader, SqlValue, now_iso8601,
};

pub struct Repository<E: Entity> {
    constraints: Arc<ConstraintCache>,
    _marker: PhantomData<E>,
}

/// Decode an id column of unknown affinity (integer or text primary keys).
fn id_from_row(row: &SqliteRow) -> SqlValue {
    if let Ok(v) = row.try_get::<i64, _>(0) {
        return SqlValue::Int(v);
    }
    if let Ok(v) = row.try_get::<String, _>(0) {
        return SqlValue::Text(v);
    }
    SqlValue::Null
}

async fn probe_exists(
    pool: &Database,
    table: &str,
    column: &str,
    value: &SqlValue,
) -> Result<bool, sqlx::Error> {
    let sql = format!("SELECT 1 FROM {} WHERE {} = ? LIMIT 1", table, column);
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    query = value.bind_to_scalar(query);
    Ok(query.fetch_optional(pool).await?.is_some())
}

impl<E: Entity> Repository<E> {
    pub fn new(constraints: Arc<ConstraintCache>) -> Self {
        Self {
            constraints,
            _marker: PhantomData,
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// List rows matching the query plus the total count of the filtered
    /// set. The count is computed through the same predicate compilation as
    /// the page, so it is invariant to limit/offset. Relations are hydrated
    /// on the returned rows only.
    pub async fn list_and_count<Q: QuerySpec>(
        &self,
        pool: &Database,
        query: &Q,
        relations: &[&str],
    ) -> Result<(i64, Vec<E>), AppError>
    where
        E: RelationLoader,
    {
        let stmt = EntityQuery::<E>::new().apply(query);
        let count = stmt.count(pool).await?;
        let mut results = stmt.fetch_all(pool).await?;
        if !relations.is_empty() {
            E::load_relations(&mut results, pool, relations).await?;
        }
        Ok((count, results))
    }

    pub async fn get_one_or_404(
        &self,
        pool: &Database,
        locale: Locale,
        id: SqlValue,
        relations: &[&str],
    ) -> Result<E, AppError>
    where
        E: RelationLoader,
    {
        let found = EntityQuery::<E>::new()
            .where_eq(E::PRIMARY_KEY, id.clone())
            .fetch_optional(pool)
            .await?;
        let Some(entity) = found else {
            return Err(AppError::not_found(
                locale,
                E::visible_name(locale),
                E::PRIMARY_KEY,
                id,
            ));
        };
        let mut single = [entity];
        if !relations.is_empty() {
            E::load_relations(&mut single, pool, relations).await?;
        }
        let [entity] = single;
        Ok(entity)
    }

    async fn fetch_by_pk(&self, pool: &Database, pk: &SqlValue) -> Result<Option<E>, sqlx::Error> {
        EntityQuery::<E>::new()
            .where_eq(E::PRIMARY_KEY, pk.clone())
            .fetch_optional(pool)
            .await
    }

    // ------------------------------------------------------------------
    // Constraint enforcement
    // ------------------------------------------------------------------

    /// Existence count over one unique group; counting > 0 rows means the
    /// group is occupied. `exclude_id` removes the row being updated so an
    /// unchanged value does not collide with itself.
    async fn check_unique_group(
        &self,
        pool: &Database,
        locale: Locale,
        group: &[(String, SqlValue)],
        exclude_id: Option<&SqlValue>,
    ) -> Result<(), AppError> {
        let mut clauses: Vec<String> = Vec::with_capacity(group.len() + 1);
        let mut values: Vec<SqlValue> = Vec::with_capacity(group.len() + 1);

        for (column, value) in group {
            match value {
                SqlValue::Bool(_) => clauses.push(format!("{} IS ?", column)),
                _ => clauses.push(format!("{} = ?", column)),
            }
            values.push(value.clone());
        }
        if let Some(id) = exclude_id {
            clauses.push(format!("{} != ?", E::PRIMARY_KEY));
            values.push(id.clone());
        }

        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            E::TABLE_NAME,
            clauses.join(" AND ")
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for value in &values {
            query = value.bind_to_scalar(query);
        }
        let occupied = query.fetch_one(pool).await?;

        if occupied > 0 {
            let fields = group
                .iter()
                .map(|(column, _)| column.as_str())
                .collect::<Vec<_>>()
                .join(",");
            let joined_values = group
                .iter()
                .map(|(column, value)| format!("{column}-{value}"))
                .collect::<Vec<_>>()
                .join(",");
            return Err(AppError::already_exists(
                locale,
                E::visible_name(locale),
                fields,
                joined_values,
            ));
        }
        Ok(())
    }

    /// Create-mode uniqueness: a group is only checked when every one of its
    /// columns is supplied with a truthy value; partially supplied groups
    /// are skipped entirely.
    async fn enforce_unique_on_create(
        &self,
        pool: &Database,
        locale: Locale,
        constraints: &TableConstraints,
        fields: &[(&'static str, SqlValue)],
    ) -> Result<(), AppError> {
        for group in &constraints.unique_constraints {
            let mut uq: Vec<(String, SqlValue)> = Vec::with_capacity(group.len());
            for column in group {
                match fields.iter().find(|(name, _)| name == column) {
                    Some((_, value)) if !value.is_falsy() => {
                        uq.push((column.clone(), value.clone()));
                    }
                    _ => {
                        uq.clear();
                        break;
                    }
                }
            }
            if !uq.is_empty() {
                self.check_unique_group(pool, locale, &uq, None).await?;
            }
        }
        Ok(())
    }

    /// Update-mode uniqueness: columns missing from the payload fall back to
    /// the persisted row's current value, so the *effective* post-update
    /// state is validated, and the row's own id is excluded from the probe.
    async fn enforce_unique_on_update(
        &self,
        pool: &Database,
        locale: Locale,
        constraints: &TableConstraints,
        obj: &E,
        fields: &[(&'static str, SqlValue)],
    ) -> Result<(), AppError> {
        let own_id = obj.id_value();
        for group in &constraints.unique_constraints {
            let mut uq: Vec<(String, SqlValue)> = Vec::with_capacity(group.len());
            for column in group {
                let incoming = fields
                    .iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, value)| value.clone());
                let effective = match incoming {
                    Some(value) if !value.is_falsy() => Some(value),
                    _ => obj.field_value(column).filter(|v| !v.is_falsy()),
                };
                match effective {
                    Some(value) => uq.push((column.clone(), value)),
                    None => {
                        uq.clear();
                        break;
                    }
                }
            }
            if !uq.is_empty() {
                self.check_unique_group(pool, locale, &uq, Some(&own_id))
                    .await?;
            }
        }
        Ok(())
    }

    /// Probe every supplied, truthy foreign-key column against its
    /// referenced table.
    async fn enforce_foreign_keys(
        &self,
        pool: &Database,
        locale: Locale,
        constraints: &TableConstraints,
        fields: &[(&'static str, SqlValue)],
    ) -> Result<(), AppError> {
        for (column, (referred_table, referred_column)) in &constraints.foreign_keys {
            let Some((_, value)) = fields.iter().find(|(name, _)| name == column) else {
                continue;
            };
            if value.is_falsy() {
                continue;
            }
            if !probe_exists(pool, referred_table, referred_column, value).await? {
                return Err(AppError::not_found(
                    locale,
                    referred_table.clone(),
                    referred_column.clone(),
                    value,
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Create a row from the payload, skipping `excludes` (fields consumed
    /// separately, e.g. for relationship wiring). Returns the persisted row
    /// with its generated identifier populated.
    pub async fn create<C: FieldSet>(
        &self,
        pool: &Database,
        locale: Locale,
        payload: &C,
        excludes: &[&str],
    ) -> Result<E, AppError> {
        let fields: Vec<(&'static str, SqlValue)> = payload
            .assignments()
            .into_iter()
            .filter(|(name, _)| !excludes.contains(name))
            .collect();

        let constraints = self.constraints.get(pool, E::TABLE_NAME).await?;
        self.enforce_foreign_keys(pool, locale, &constraints, &fields)
            .await?;
        self.enforce_unique_on_create(pool, locale, &constraints, &fields)
            .await?;

        let sql = if fields.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", E::TABLE_NAME)
        } else {
            let columns: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
            let placeholders = vec!["?"; fields.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                E::TABLE_NAME,
                columns.join(", "),
                placeholders
            )
        };
        let values: Vec<SqlValue> = fields.iter().map(|(_, value)| value.clone()).collect();
        let result = execute_with_binds(&sql, &values, pool)
            .await
            .map_err(|e| AppError::from_write_error(e, locale, E::visible_name(locale)))?;

        let pk = fields
            .iter()
            .find(|(name, _)| *name == E::PRIMARY_KEY)
            .map(|(_, value)| value.clone())
            .unwrap_or(SqlValue::Int(result.last_insert_rowid()));

        self.fetch_by_pk(pool, &pk).await?.ok_or_else(|| {
            AppError::not_found(locale, E::visible_name(locale), E::PRIMARY_KEY, pk)
        })
    }

    /// Partial update. Only fields present in the payload are written;
    /// mergeable-map fields merge key-by-key into the stored object, all
    /// other kinds replace outright.
    pub async fn update<U: FieldSet>(
        &self,
        pool: &Database,
        locale: Locale,
        obj: &E,
        payload: &U,
        excludes: &[&str],
    ) -> Result<E, AppError> {
        let fields: Vec<(&'static str, SqlValue)> = payload
            .assignments()
            .into_iter()
            .filter(|(name, _)| !excludes.contains(name))
            .collect();

        let constraints = self.constraints.get(pool, E::TABLE_NAME).await?;
        self.enforce_foreign_keys(pool, locale, &constraints, &fields)
            .await?;
        self.enforce_unique_on_update(pool, locale, &constraints, obj, &fields)
            .await?;

        let pk = obj.id_value();
        if fields.is_empty() {
            return self.fetch_by_pk(pool, &pk).await?.ok_or_else(|| {
                AppError::not_found(locale, E::visible_name(locale), E::PRIMARY_KEY, pk)
            });
        }

        let mut writes: Vec<(&'static str, SqlValue)> = Vec::with_capacity(fields.len() + 1);
        for (name, value) in fields {
            let resolved = match (E::field_kind(name), &value) {
                (FieldKind::MergeableMap, SqlValue::Json(incoming)) if incoming.is_object() => {
                    match obj.field_value(name) {
                        Some(SqlValue::Json(current)) if current.is_object() => {
                            let mut merged = current.as_object().cloned().unwrap_or_default();
                            for (key, item) in incoming.as_object().into_iter().flatten() {
                                merged.insert(key.clone(), item.clone());
                            }
                            SqlValue::Json(serde_json::Value::Object(merged))
                        }
                        _ => value,
                    }
                }
                _ => value,
            };
            writes.push((name, resolved));
        }
        if E::has_column("updated_at") && !writes.iter().any(|(name, _)| *name == "updated_at") {
            writes.push(("updated_at", SqlValue::Text(now_iso8601())));
        }

        let set_clause = writes
            .iter()
            .map(|(name, _)| format!("{} = ?", name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            E::TABLE_NAME,
            set_clause,
            E::PRIMARY_KEY
        );
        let mut values: Vec<SqlValue> = writes.into_iter().map(|(_, value)| value).collect();
        values.push(pk.clone());
        execute_with_binds(&sql, &values, pool)
            .await
            .map_err(|e| AppError::from_write_error(e, locale, E::visible_name(locale)))?;

        self.fetch_by_pk(pool, &pk).await?.ok_or_else(|| {
            AppError::not_found(locale, E::visible_name(locale), E::PRIMARY_KEY, pk)
        })
    }

    /// Reconcile a many-to-many association to exactly `desired` ids.
    ///
    /// Two passes, removals then additions, so a unique join row is never
    /// transiently duplicated. Ids already attached are left untouched;
    /// desired ids that do not exist in the related table fail the call.
    pub async fn update_relationship_field<R: Entity>(
        &self,
        pool: &Database,
        locale: Locale,
        obj: &E,
        assoc: ManyToMany,
        desired: &[SqlValue],
    ) -> Result<(), AppError> {
        let own_id = obj.id_value();

        let select = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            assoc.remote_column, assoc.join_table, assoc.local_column
        );
        let mut query = sqlx::query(&select);
        query = own_id.bind_to(query);
        let current: Vec<SqlValue> = query
            .fetch_all(pool)
            .await?
            .iter()
            .map(id_from_row)
            .collect();

        for stale in current.iter().filter(|id| !desired.contains(id)) {
            let sql = format!(
                "DELETE FROM {} WHERE {} = ? AND {} = ?",
                assoc.join_table, assoc.local_column, assoc.remote_column
            );
            execute_with_binds(&sql, &[own_id.clone(), stale.clone()], pool).await?;
        }

        for wanted in desired.iter().filter(|id| !current.contains(id)) {
            if !probe_exists(pool, R::TABLE_NAME, R::PRIMARY_KEY, wanted).await? {
                return Err(AppError::not_found(
                    locale,
                    R::visible_name(locale),
                    R::PRIMARY_KEY,
                    wanted,
                ));
            }
            // OR IGNORE: a concurrent attach of the same pair is a no-op,
            // not a unique violation.
            let sql = format!(
                "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?, ?)",
                assoc.join_table, assoc.local_column, assoc.remote_column
            );
            execute_with_binds(&sql, &[own_id.clone(), wanted.clone()], pool).await?;
        }

        Ok(())
    }

    /// Remove the row. Cascades are the storage schema's responsibility.
    pub async fn delete(&self, pool: &Database, obj: &E) -> Result<(), AppError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            E::TABLE_NAME,
            E::PRIMARY_KEY
        );
        execute_with_binds(&sql, &[obj.id_value()], pool).await?;
        Ok(())
    }
}
