//! SQL query assembler for entity reads.
//!
//! Builds parameterized SELECT statements with filtering, search, sorting and
//! pagination, plus a parallel COUNT statement that shares the same predicate
//! set so a returned count always matches the semantics of the result page.

use sqlx::sqlite::SqliteRow;

use crate::db::Database;
use crate::orm::filter::{FilterValue, compile_filters, compile_search};
use crate::orm::traits::{Entity, Order, QuerySpec, SqlValue};

pub struct EntityQuery<E: Entity> {
    where_clauses: Vec<String>,
    values: Vec<SqlValue>,
    order_by: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    _marker: std::marker::PhantomData<E>,
}

impl<E: Entity> EntityQuery<E> {
    pub fn new() -> Self {
        Self {
            where_clauses: Vec::new(),
            values: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// Apply compiled filter entries.
    pub fn filters(mut self, entries: Vec<(String, FilterValue)>) -> Self {
        let compiled = compile_filters::<E>(entries);
        self.where_clauses.extend(compiled.clauses);
        self.values.extend(compiled.values);
        self
    }

    /// Apply free-text search over the entity's searchable fields.
    pub fn search(mut self, term: &str, ignore_case: bool) -> Self {
        if let Some(compiled) = compile_search::<E>(term, ignore_case) {
            self.where_clauses.extend(compiled.clauses);
            self.values.extend(compiled.values);
        }
        self
    }

    /// Add a raw `column = value` condition. The column must be registered.
    pub fn where_eq(mut self, column: &str, value: SqlValue) -> Self {
        debug_assert!(E::has_column(column), "unregistered column {column}");
        self.where_clauses.push(format!("{} = ?", column));
        self.values.push(value);
        self
    }

    /// Single-column ordering. Unregistered columns are ignored, so a hostile
    /// `order_by` query parameter can never reach the SQL text.
    pub fn order(mut self, column: &str, order: Order) -> Self {
        if E::has_column(column) {
            self.order_by = Some(format!("{} {}", column, order.to_sql()));
        }
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Apply a full query spec: filters, search, pagination and ordering.
    ///
    /// Pagination applies only when both limit and offset are present;
    /// ordering only when both column and direction are present.
    pub fn apply<Q: QuerySpec>(mut self, query: &Q) -> Self {
        self = self.filters(query.filters());
        if let Some(term) = query.q() {
            self = self.search(term, true);
        }
        if let (Some(limit), Some(offset)) = (query.limit(), query.offset()) {
            self = self.limit(limit).offset(offset);
        }
        if let (Some(column), Some(order)) = (query.order_by(), query.order()) {
            self = self.order(column, order);
        }
        self
    }

    fn build_sql(&self) -> String {
        let mut sql = E::select_sql();

        if !self.where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clauses.join(" AND "));
        }

        if let Some(ref order) = self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            if offset > 0 {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }

        sql
    }

    /// COUNT over the same predicates, never limited or ordered.
    fn build_count_sql(&self) -> String {
        let mut sql = format!("SELECT COUNT(*) FROM {}", E::TABLE_NAME);

        if !self.where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clauses.join(" AND "));
        }

        sql
    }

    pub async fn fetch_all(&self, pool: &Database) -> Result<Vec<E>, sqlx::Error> {
        let sql = self.build_sql();
        tracing::debug!(sql = %sql, "executing entity query");

        let mut query = sqlx::query(&sql);
        for value in &self.values {
            query = value.bind_to(query);
        }

        let rows: Vec<SqliteRow> = query.fetch_all(pool).await?;
        rows.iter().map(E::from_row).collect()
    }

    pub async fn fetch_optional(&self, pool: &Database) -> Result<Option<E>, sqlx::Error> {
        let sql = self.build_sql();
        tracing::debug!(sql = %sql, "executing entity query (one)");

        let mut query = sqlx::query(&sql);
        for value in &self.values {
            query = value.bind_to(query);
        }

        match query.fetch_optional(pool).await? {
            Some(row) => Ok(Some(E::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn count(&self, pool: &Database) -> Result<i64, sqlx::Error> {
        let sql = self.build_count_sql();
        tracing::debug!(sql = %sql, "executing count query");

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for value in &self.values {
            query = value.bind_to_scalar(query);
        }

        query.fetch_one(pool).await
    }

    #[cfg(test)]
    pub(crate) fn sql_for_tests(&self) -> (String, String) {
        (self.build_sql(), self.build_count_sql())
    }
}

impl<E: Entity> Default for EntityQuery<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute an INSERT/UPDATE/DELETE with bound values.
pub async fn execute_with_binds(
    sql: &str,
    values: &[SqlValue],
    pool: &Database,
) -> Result<sqlx::sqlite::SqliteQueryResult, sqlx::Error> {
    tracing::debug!(sql = %sql, "executing statement");
    let mut query = sqlx::query(sql);
    for value in values {
        query = value.bind_to(query);
    }
    query.execute(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::user::User;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_select() {
        let (sql, count_sql) = EntityQuery::<User>::new().sql_for_tests();
        assert!(sql.starts_with("SELECT id, name, password, email"));
        assert!(sql.ends_with("FROM user"));
        assert_eq!(count_sql, "SELECT COUNT(*) FROM user");
    }

    #[test]
    fn test_count_shares_predicates_but_not_pagination() {
        let q = EntityQuery::<User>::new()
            .where_eq("group_id", SqlValue::Int(3))
            .limit(10)
            .offset(20)
            .order("name", Order::Ascend);
        let (sql, count_sql) = q.sql_for_tests();
        assert!(sql.contains("WHERE group_id = ?"));
        assert!(sql.contains("ORDER BY name ASC"));
        assert!(sql.contains("LIMIT 10"));
        assert!(sql.contains("OFFSET 20"));
        assert!(count_sql.contains("WHERE group_id = ?"));
        assert!(!count_sql.contains("LIMIT"));
        assert!(!count_sql.contains("ORDER BY"));
    }

    #[test]
    fn test_zero_offset_omitted() {
        let q = EntityQuery::<User>::new().limit(5).offset(0);
        let (sql, _) = q.sql_for_tests();
        assert!(sql.contains("LIMIT 5"));
        assert!(!sql.contains("OFFSET"));
    }

    #[test]
    fn test_unregistered_order_column_ignored() {
        let q = EntityQuery::<User>::new().order("1; DROP TABLE user", Order::Descend);
        let (sql, _) = q.sql_for_tests();
        assert!(!sql.contains("ORDER BY"));
    }
}
