//! Deleted-row filtering for entity queries.
//!
//! Every [`SoftDeleteQuery`] excludes soft-deleted rows unless told otherwise.
//! Bulk delete and restore over a query go through the coordinator one row at
//! a time so each row gets its own log entry.

use crate::coordinator::Coordinator;
use crate::entity::{EntityTable, SoftDeletable};
use crate::error::{SoftDeleteError, SoftDeleteResult};
use reclaim_core::Ident;
use reclaim_core::config::SoftDeleteConfig;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::marker::PhantomData;

/// Which rows a query sees with respect to the deletion marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeletedFilter {
    /// Live rows only.
    #[default]
    ExcludeDeleted,
    /// Live and deleted rows.
    IncludeDeleted,
    /// Deleted rows only.
    OnlyDeleted,
}

/// A value bound into a query predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    Eq(Ident, FilterValue),
    IsNull(Ident),
    IsNotNull(Ident),
    In(Ident, Vec<FilterValue>),
}

/// Query over a soft-deletable entity table.
#[derive(Debug, Clone)]
pub struct SoftDeleteQuery<E> {
    table: EntityTable,
    deleted: DeletedFilter,
    predicates: Vec<Predicate>,
    order: Option<bool>,
    limit: Option<u32>,
    invalid_column: Option<String>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: SoftDeletable> SoftDeleteQuery<E> {
    /// Query live rows of `E`.
    pub fn new(config: &SoftDeleteConfig) -> SoftDeleteResult<Self> {
        Ok(Self {
            table: EntityTable::of::<E>(config)?,
            deleted: DeletedFilter::default(),
            predicates: Vec::new(),
            order: None,
            limit: None,
            invalid_column: None,
            _entity: PhantomData,
        })
    }

    pub fn deleted_filter(&self) -> DeletedFilter {
        self.deleted
    }

    /// See deleted rows as well as live ones.
    pub fn include_deleted(mut self) -> Self {
        self.deleted = DeletedFilter::IncludeDeleted;
        self
    }

    /// See deleted rows only.
    pub fn only_deleted(mut self) -> Self {
        self.deleted = DeletedFilter::OnlyDeleted;
        self
    }

    /// Go back to live rows only.
    pub fn exclude_deleted(mut self) -> Self {
        self.deleted = DeletedFilter::ExcludeDeleted;
        self
    }

    pub fn filter_eq(mut self, column: &str, value: impl Into<FilterValue>) -> Self {
        if let Some(column) = self.column(column) {
            self.predicates.push(Predicate::Eq(column, value.into()));
        }
        self
    }

    pub fn filter_null(mut self, column: &str) -> Self {
        if let Some(column) = self.column(column) {
            self.predicates.push(Predicate::IsNull(column));
        }
        self
    }

    pub fn filter_not_null(mut self, column: &str) -> Self {
        if let Some(column) = self.column(column) {
            self.predicates.push(Predicate::IsNotNull(column));
        }
        self
    }

    /// Match rows whose column is one of `values`. An empty set matches nothing.
    pub fn filter_in<V>(mut self, column: &str, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<FilterValue>,
    {
        if let Some(column) = self.column(column) {
            let values = values.into_iter().map(Into::into).collect();
            self.predicates.push(Predicate::In(column, values));
        }
        self
    }

    pub fn order_by_id(mut self, ascending: bool) -> Self {
        self.order = Some(ascending);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    // Invalid column names are reported by the terminal call.
    fn column(&mut self, column: &str) -> Option<Ident> {
        match Ident::new(column) {
            Ok(ident) => Some(ident),
            Err(_) => {
                self.invalid_column.get_or_insert_with(|| column.to_string());
                None
            }
        }
    }

    fn build(&self, select: &str) -> SoftDeleteResult<QueryBuilder<'static, Sqlite>> {
        if let Some(column) = &self.invalid_column {
            return Err(SoftDeleteError::Config(format!(
                "invalid column name in query on {}: '{column}'",
                self.table.table
            )));
        }

        let mut qb = QueryBuilder::new(format!("SELECT {select} FROM {}", self.table.table));
        let mut first = true;
        let mut conjunction = |qb: &mut QueryBuilder<'static, Sqlite>| {
            qb.push(if first { " WHERE " } else { " AND " });
            first = false;
        };

        match self.deleted {
            DeletedFilter::ExcludeDeleted => {
                conjunction(&mut qb);
                qb.push(format_args!("{} IS NULL", self.table.marker_column));
            }
            DeletedFilter::OnlyDeleted => {
                conjunction(&mut qb);
                qb.push(format_args!("{} IS NOT NULL", self.table.marker_column));
            }
            DeletedFilter::IncludeDeleted => {}
        }

        for predicate in &self.predicates {
            conjunction(&mut qb);
            match predicate {
                Predicate::Eq(column, value) => {
                    qb.push(format_args!("{column} = "));
                    push_value(&mut qb, value);
                }
                Predicate::IsNull(column) => {
                    qb.push(format_args!("{column} IS NULL"));
                }
                Predicate::IsNotNull(column) => {
                    qb.push(format_args!("{column} IS NOT NULL"));
                }
                Predicate::In(_, values) if values.is_empty() => {
                    qb.push("0 = 1");
                }
                Predicate::In(column, values) => {
                    qb.push(format_args!("{column} IN ("));
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            qb.push(", ");
                        }
                        push_value(&mut qb, value);
                    }
                    qb.push(")");
                }
            }
        }

        if let Some(ascending) = self.order {
            qb.push(format_args!(
                " ORDER BY {} {}",
                self.table.id_column,
                if ascending { "ASC" } else { "DESC" }
            ));
        }
        if let Some(limit) = self.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(limit));
        }
        Ok(qb)
    }

    /// Rendered SQL, for logging and tests.
    pub fn sql(&self) -> SoftDeleteResult<String> {
        Ok(self.build("*")?.into_sql())
    }

    pub async fn fetch_all(&self, conn: &mut SqliteConnection) -> SoftDeleteResult<Vec<E>> {
        let mut qb = self.build("*")?;
        let rows = qb.build_query_as::<E>().fetch_all(&mut *conn).await?;
        Ok(rows)
    }

    pub async fn fetch_optional(&self, conn: &mut SqliteConnection) -> SoftDeleteResult<Option<E>> {
        let mut qb = self.build("*")?;
        let row = qb.build_query_as::<E>().fetch_optional(&mut *conn).await?;
        Ok(row)
    }

    pub async fn count(&self, conn: &mut SqliteConnection) -> SoftDeleteResult<u64> {
        let mut qb = self.build("COUNT(*)")?;
        let count: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
        Ok(count as u64)
    }

    /// Soft delete every live row the query matches.
    ///
    /// Rows are deleted one by one through the coordinator and share its
    /// current transaction. A failure stops the loop; rows deleted before it
    /// stay deleted. Returns the deleted entities with their markers set.
    pub async fn delete(self, coordinator: &mut Coordinator) -> SoftDeleteResult<Vec<E>> {
        let query = self.exclude_deleted();
        let mut rows = query.fetch_with(coordinator).await?;

        for entity in &mut rows {
            coordinator.delete(entity).await?;
        }
        tracing::debug!(
            table = %query.table.table,
            deleted = rows.len(),
            "Query result soft deleted"
        );
        Ok(rows)
    }

    /// Restore every deleted row the query matches, one by one.
    ///
    /// A failure stops the loop; rows restored before it stay restored.
    pub async fn restore(self, coordinator: &mut Coordinator) -> SoftDeleteResult<Vec<E>> {
        let query = self.only_deleted();
        let mut rows = query.fetch_with(coordinator).await?;

        for entity in &mut rows {
            coordinator.restore(entity).await?;
        }
        tracing::debug!(
            table = %query.table.table,
            restored = rows.len(),
            "Query result restored"
        );
        Ok(rows)
    }

    // The connection goes back to the pool before the coordinator needs it.
    async fn fetch_with(&self, coordinator: &Coordinator) -> SoftDeleteResult<Vec<E>> {
        let store = coordinator.service().store().clone();
        let mut conn = store.pool().acquire().await?;
        self.fetch_all(&mut conn).await
    }
}

fn push_value(qb: &mut QueryBuilder<'static, Sqlite>, value: &FilterValue) {
    match value {
        FilterValue::Integer(v) => qb.push_bind(*v),
        FilterValue::Real(v) => qb.push_bind(*v),
        FilterValue::Text(v) => qb.push_bind(v.clone()),
        FilterValue::Bool(v) => qb.push_bind(*v),
    };
}
