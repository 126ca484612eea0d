//! PostgreSQL Repository
//!
//! [`Repository`] over a `PgPool`. SQL is assembled from the entity's static
//! column list and the rendered [`Filter`]; every value travels as a bound
//! parameter.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgRow, Postgres};
use sqlx::{Arguments, FromRow, Row};
use std::marker::PhantomData;
use tracing::debug;

use super::entity::{Entity, EntityKey, AUDIT_COLUMNS, ID_COLUMN};
use super::filter::{quote_ident, Filter};
use super::repository::{is_valid_routine_name, PageRequest, Repository};
use super::value::SqlValue;
use crate::shared::error::{PlatformError, Result};

const TOTAL_COUNT_COLUMN: &str = "total_count";

pub struct PgRepository<E> {
    pool: PgPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> PgRepository<E> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn table() -> String {
        qualified_ident(E::TABLE)
    }

    fn select_list() -> String {
        std::iter::once(ID_COLUMN)
            .chain(E::columns().iter().copied())
            .chain(AUDIT_COLUMNS.iter().copied())
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ")
    }

    async fn fetch(&self, filter: &Filter<E>, suffix: &str, mut params: Vec<SqlValue>) -> Result<Vec<E>> {
        let predicate = filter.to_sql(&mut params);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} {}",
            Self::select_list(),
            Self::table(),
            predicate,
            quote_ident(ID_COLUMN),
            suffix
        );

        let rows = sqlx::query_as_with::<Postgres, E, _>(&sql, build_args(params)?)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count(&self, filter: &Filter<E>) -> Result<u64> {
        let mut params = Vec::new();
        let predicate = filter.to_sql(&mut params);
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", Self::table(), predicate);

        let count: i64 = sqlx::query_scalar_with::<Postgres, i64, _>(&sql, build_args(params)?)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// `UPDATE` by key, optionally guarded by `condition` on the stored row
    async fn write_update(&self, entity: &E, condition: Option<&Filter<E>>) -> Result<bool> {
        let columns: Vec<&str> = E::columns().iter().chain(AUDIT_COLUMNS.iter()).copied().collect();
        let mut values = entity.values();
        values.extend(entity.audit().values());

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ${}", quote_ident(c), i + 1))
            .collect();
        values.push(entity.id().to_sql());

        let mut sql = format!(
            "UPDATE {} SET {} WHERE {} = ${}",
            Self::table(),
            assignments.join(", "),
            quote_ident(ID_COLUMN),
            values.len()
        );
        if let Some(condition) = condition {
            let predicate = condition.to_sql(&mut values);
            sql.push_str(&format!(" AND ({})", predicate));
        }

        let result = sqlx::query_with::<Postgres, _>(&sql, build_args(values)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for PgRepository<E> {
    async fn get_by_id(&self, id: &E::Key) -> Result<Option<E>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            Self::select_list(),
            Self::table(),
            quote_ident(ID_COLUMN)
        );

        let row = sqlx::query_as_with::<Postgres, E, _>(&sql, build_args(vec![id.to_sql()])?)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_single(&self, filter: &Filter<E>) -> Result<Option<E>> {
        let rows = self.fetch(filter, "LIMIT 1", Vec::new()).await?;
        Ok(rows.into_iter().next())
    }

    async fn get_all(&self) -> Result<Vec<E>> {
        self.fetch(&Filter::not_deleted(), "", Vec::new()).await
    }

    async fn find(&self, filter: &Filter<E>) -> Result<Vec<E>> {
        self.fetch(filter, "", Vec::new()).await
    }

    async fn find_page(&self, filter: &Filter<E>, page: PageRequest) -> Result<(Vec<E>, u64)> {
        let mut params = Vec::new();
        let predicate = filter.to_sql(&mut params);
        params.push(SqlValue::Int(Some(page.limit() as i64)));
        params.push(SqlValue::Int(Some(page.offset() as i64)));
        let sql = format!(
            "SELECT {}, COUNT(*) OVER() AS {} FROM {} WHERE {} ORDER BY {} LIMIT ${} OFFSET ${}",
            Self::select_list(),
            quote_ident(TOTAL_COUNT_COLUMN),
            Self::table(),
            predicate,
            quote_ident(ID_COLUMN),
            params.len() - 1,
            params.len()
        );

        let rows: Vec<PgRow> = sqlx::query_with::<Postgres, _>(&sql, build_args(params)?)
            .fetch_all(&self.pool)
            .await?;

        let Some(first) = rows.first() else {
            // the window count is only available when the page has rows
            let total = if page.offset() > 0 { self.count(filter).await? } else { 0 };
            return Ok((Vec::new(), total));
        };

        let total: i64 = first.try_get(TOTAL_COUNT_COLUMN)?;
        let items = rows.iter().map(E::from_row).collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(table = E::TABLE, count = items.len(), total, "Fetched page");
        Ok((items, total.max(0) as u64))
    }

    async fn find_after(&self, filter: &Filter<E>, after: Option<&E::Key>, limit: u32) -> Result<Vec<E>> {
        let filter = match after {
            Some(key) => filter.clone().and(Filter::id_gt(key)),
            None => filter.clone(),
        };
        let params = Vec::new();
        self.fetch(&filter, &format!("LIMIT {}", limit.max(1)), params).await
    }

    async fn insert(&self, entity: &E) -> Result<E::Key> {
        let mut entity = entity.clone();
        if entity.id().is_unset() {
            if let Some(key) = E::Key::mint() {
                entity.set_id(key);
            }
        }
        let store_assigns_key = entity.id().is_unset();

        let mut columns: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        if !store_assigns_key {
            columns.push(ID_COLUMN);
            values.push(entity.id().to_sql());
        }
        columns.extend(E::columns().iter().copied());
        values.extend(entity.values());
        columns.extend(AUDIT_COLUMNS.iter().copied());
        values.extend(entity.audit().values());

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("${}", i)).collect();
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            Self::table(),
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            placeholders.join(", ")
        );

        if store_assigns_key {
            sql.push_str(&format!(" RETURNING {}", quote_ident(ID_COLUMN)));
            let generated: i64 = sqlx::query_scalar_with::<Postgres, i64, _>(&sql, build_args(values)?)
                .fetch_one(&self.pool)
                .await?;
            return E::Key::from_generated(generated).ok_or_else(|| {
                PlatformError::internal(format!("{} cannot use a generated key", E::TABLE))
            });
        }

        sqlx::query_with::<Postgres, _>(&sql, build_args(values)?)
            .execute(&self.pool)
            .await?;
        Ok(entity.id().clone())
    }

    async fn update(&self, entity: &E) -> Result<bool> {
        self.write_update(entity, None).await
    }

    async fn update_where(&self, entity: &E, expected: &Filter<E>) -> Result<bool> {
        self.write_update(entity, Some(expected)).await
    }

    async fn delete(&self, entity: &E) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE {} = $1", Self::table(), quote_ident(ID_COLUMN));
        let result = sqlx::query_with::<Postgres, _>(&sql, build_args(vec![entity.id().to_sql()])?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn execute_procedure(&self, name: &str, params: &[SqlValue]) -> Result<Vec<serde_json::Value>> {
        let sql = format!("SELECT to_jsonb(r) AS \"item\" FROM {} AS r", routine_call(name, params.len())?);

        let rows = sqlx::query_with::<Postgres, _>(&sql, build_args(params.to_vec())?)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<serde_json::Value, _>("item").map_err(PlatformError::from))
            .collect()
    }

    async fn execute_procedure_paged(
        &self,
        name: &str,
        params: &[SqlValue],
        page: PageRequest,
    ) -> Result<(Vec<serde_json::Value>, u64)> {
        let call = routine_call(name, params.len())?;
        let mut values = params.to_vec();
        values.push(SqlValue::Int(Some(page.limit() as i64)));
        values.push(SqlValue::Int(Some(page.offset() as i64)));
        let sql = format!(
            "SELECT to_jsonb(r) AS \"item\", COUNT(*) OVER() AS {} FROM {} AS r LIMIT ${} OFFSET ${}",
            quote_ident(TOTAL_COUNT_COLUMN),
            call,
            values.len() - 1,
            values.len()
        );

        let rows = sqlx::query_with::<Postgres, _>(&sql, build_args(values)?)
            .fetch_all(&self.pool)
            .await?;

        let total = match rows.first() {
            Some(row) => row.try_get::<i64, _>(TOTAL_COUNT_COLUMN)?.max(0) as u64,
            None => 0,
        };
        let items = rows
            .iter()
            .map(|row| row.try_get::<serde_json::Value, _>("item"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok((items, total))
    }
}

/// Quote each segment of a possibly schema-qualified name
fn qualified_ident(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

fn routine_call(name: &str, param_count: usize) -> Result<String> {
    if !is_valid_routine_name(name) {
        return Err(PlatformError::validation(format!("Invalid procedure name: {}", name)));
    }
    let placeholders: Vec<String> = (1..=param_count).map(|i| format!("${}", i)).collect();
    Ok(format!("{}({})", qualified_ident(name), placeholders.join(", ")))
}

fn build_args(values: Vec<SqlValue>) -> Result<PgArguments> {
    let mut args = PgArguments::default();
    for value in values {
        let bound = match value {
            SqlValue::Bool(v) => args.add(v),
            SqlValue::Int(v) => args.add(v),
            SqlValue::Float(v) => args.add(v),
            SqlValue::Text(v) => args.add(v),
            SqlValue::Timestamp(v) => args.add(v),
        };
        bound.map_err(|e| PlatformError::internal(format!("Failed to bind parameter: {}", e)))?;
    }
    Ok(args)
}
