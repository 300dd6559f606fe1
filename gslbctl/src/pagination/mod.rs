//! Keyset pagination over entity tables.
//!
//! List requests carry `limit`, `marker`, `sort` and `page_reverse`. Instead of an offset, the next
//! page is located by the sort-key values of the marker row, which keeps pages stable while rows
//! are inserted or removed concurrently:
//!
//! 1. The effective sort is the caller's keys followed by the configured default keys (`id`,
//!    `created_at`) that are not already present, so the order is total.
//! 2. `page_reverse` inverts every direction; rows come back in reverse scan order and are flipped
//!    back before being returned.
//! 3. With a marker, rows must sort strictly after it:
//!    `(k0 > m.k0) OR (k0 = m.k0 AND k1 > m.k1) OR ...` with `<` for descending keys.
//! 4. Scope filters (project, parent IDs) are applied to the page and to the marker lookup alike.
//!
//! Column names are interpolated into SQL, so they are checked against a strict identifier syntax
//! and against the entity's allow-list before any query is built.

pub mod links;

use crate::config::ApiConfig;
use crate::db::errors::{DbError, Result};
use crate::types::ProjectId;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

pub use links::{Link, PageLinks};

/// Tables that can be listed through the pagination engine.
pub trait Listable {
    /// Table name, also used to qualify columns.
    const TABLE: &'static str;
    /// Columns callers may sort by. Must be non-nullable so the seek predicate is exact.
    const SORTABLE_COLUMNS: &'static [&'static str];
}

/// Rows that can act as a pagination marker.
pub trait Keyed {
    fn key(&self) -> Uuid;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("invalid sort key '{0}'")]
    InvalidSortKey(String),
    #[error("cannot sort by '{0}'")]
    UnsortableColumn(String),
    #[error("invalid marker '{0}'")]
    MalformedMarker(String),
}

/// Strict column name syntax: `^[a-z0-9_]+$`.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    fn reversed(&self) -> Self {
        Self {
            column: self.column.clone(),
            descending: !self.descending,
        }
    }
}

/// Parse a `sort` parameter such as `-name,created_at`.
pub fn parse_sort(raw: &str) -> std::result::Result<Vec<SortKey>, PaginationError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (column, descending) = match part.strip_prefix('-') {
                Some(column) => (column, true),
                None => (part, false),
            };
            if !is_valid_identifier(column) {
                return Err(PaginationError::InvalidSortKey(part.to_string()));
            }
            Ok(SortKey {
                column: column.to_string(),
                descending,
            })
        })
        .collect()
}

/// Engine-level list request, independent of how it arrived.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub limit: Option<i64>,
    pub marker: Option<String>,
    pub sort: Option<String>,
    pub page_reverse: bool,
}

/// Pagination behaviour taken from configuration.
#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub max_limit: i64,
    pub default_sort_keys: Vec<String>,
    pub disable_pagination: bool,
    pub disable_sorting: bool,
}

impl From<&ApiConfig> for PaginationSettings {
    fn from(api: &ApiConfig) -> Self {
        Self {
            max_limit: api.pagination_max_limit,
            default_sort_keys: api.default_sort_keys.clone(),
            disable_pagination: api.disable_pagination,
            disable_sorting: api.disable_sorting,
        }
    }
}

impl Default for PaginationSettings {
    fn default() -> Self {
        (&ApiConfig::default()).into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Uuid(Uuid),
    Text(String),
}

/// Conjunctive filters applied to a listing and its marker lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq(&'static str, FilterValue),
    /// `project_id = project`
    Project(ProjectId),
    /// `scope = 'public' OR project_id = project`, for shareable resources
    ProjectOrPublic(ProjectId),
    /// `provisioning_status LIKE 'PENDING_%'`
    Pending,
    /// Hide rows in `DELETED`
    NotDeleted,
}

impl Filter {
    pub fn eq_uuid(column: &'static str, value: Uuid) -> Self {
        Filter::Eq(column, FilterValue::Uuid(value))
    }

    pub fn eq_text(column: &'static str, value: impl Into<String>) -> Self {
        Filter::Eq(column, FilterValue::Text(value.into()))
    }

    fn push(&self, table: &str, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Filter::Eq(column, value) => {
                qb.push(format_args!(" AND {table}.{column} = "));
                match value {
                    FilterValue::Uuid(v) => qb.push_bind(*v),
                    FilterValue::Text(v) => qb.push_bind(v.clone()),
                };
            }
            Filter::Project(project) => {
                qb.push(format_args!(" AND {table}.project_id = ")).push_bind(project.clone());
            }
            Filter::ProjectOrPublic(project) => {
                qb.push(format_args!(" AND ({table}.scope = 'public' OR {table}.project_id = "))
                    .push_bind(project.clone())
                    .push(")");
            }
            Filter::Pending => {
                qb.push(format_args!(" AND {table}.provisioning_status LIKE 'PENDING\\_%'"));
            }
            Filter::NotDeleted => {
                qb.push(format_args!(" AND {table}.provisioning_status <> 'DELETED'"));
            }
        }
    }
}

/// One page of results plus the cursors for its neighbours.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub links: PageLinks,
}

impl<T> Page<T> {
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> std::result::Result<U, E>) -> std::result::Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<std::result::Result<_, _>>()?,
            links: self.links,
        })
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            links: self.links,
        }
    }
}

/// A fully resolved keyset query over one table.
#[derive(Debug, Clone)]
pub struct KeysetQuery {
    table: &'static str,
    /// Effective keys in scan order (already inverted for reverse pages)
    keys: Vec<SortKey>,
    limit: Option<i64>,
    marker: Option<Uuid>,
    reverse: bool,
    filters: Vec<Filter>,
}

impl KeysetQuery {
    /// Resolve a request against an entity's table. Fails before touching storage when the sort
    /// list or the marker syntax is invalid.
    pub fn new<L: Listable>(
        request: &PageRequest,
        settings: &PaginationSettings,
        filters: Vec<Filter>,
    ) -> std::result::Result<Self, PaginationError> {
        let mut keys = match (&request.sort, settings.disable_sorting) {
            (Some(raw), false) => parse_sort(raw)?,
            _ => Vec::new(),
        };

        if let Some(bad) = keys.iter().find(|k| !L::SORTABLE_COLUMNS.contains(&k.column.as_str())) {
            return Err(PaginationError::UnsortableColumn(bad.column.clone()));
        }

        for default_key in &settings.default_sort_keys {
            let known = L::SORTABLE_COLUMNS.contains(&default_key.as_str());
            if known && is_valid_identifier(default_key) && !keys.iter().any(|k| &k.column == default_key) {
                keys.push(SortKey {
                    column: default_key.clone(),
                    descending: false,
                });
            }
        }

        let (limit, marker, reverse) = if settings.disable_pagination {
            (None, None, false)
        } else {
            let marker = request
                .marker
                .as_deref()
                .map(|m| Uuid::parse_str(m).map_err(|_| PaginationError::MalformedMarker(m.to_string())))
                .transpose()?;
            let limit = request
                .limit
                .unwrap_or(settings.max_limit)
                .clamp(1, settings.max_limit.max(1));
            (Some(limit), marker, request.page_reverse)
        };

        if reverse {
            keys = keys.iter().map(SortKey::reversed).collect();
        }

        Ok(Self {
            table: L::TABLE,
            keys,
            limit,
            marker,
            reverse,
            filters,
        })
    }

    /// Add a scope filter. Repositories use this to confine a caller-built query to the rows the
    /// caller may see.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Build the page query.
    pub fn build(&self) -> QueryBuilder<'static, Postgres> {
        let table = self.table;
        let mut qb = QueryBuilder::new("");

        if let Some(marker) = self.marker {
            qb.push(format_args!("WITH marker AS (SELECT * FROM {table} WHERE id = "))
                .push_bind(marker)
                .push(") ");
        }

        qb.push(format_args!("SELECT {table}.* FROM {table}"));
        if self.marker.is_some() {
            qb.push(", marker");
        }
        qb.push(" WHERE TRUE");

        for filter in &self.filters {
            filter.push(table, &mut qb);
        }

        if self.marker.is_some() && !self.keys.is_empty() {
            qb.push(" AND (");
            for (i, key) in self.keys.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("(");
                for prefix in &self.keys[..i] {
                    let column = &prefix.column;
                    qb.push(format_args!("{table}.{column} = marker.{column} AND "));
                }
                let op = if key.descending { "<" } else { ">" };
                let column = &key.column;
                qb.push(format_args!("{table}.{column} {op} marker.{column})"));
            }
            qb.push(")");
        }

        if !self.keys.is_empty() {
            qb.push(" ORDER BY ");
            for (i, key) in self.keys.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                let direction = if key.descending { "DESC" } else { "ASC" };
                qb.push(format_args!("{table}.{} {direction}", key.column));
            }
        }

        if let Some(limit) = self.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        qb
    }

    fn build_marker_check(&self, marker: Uuid) -> QueryBuilder<'static, Postgres> {
        let table = self.table;
        let mut qb = QueryBuilder::new(format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE {table}.id = "));
        qb.push_bind(marker);
        for filter in &self.filters {
            filter.push(table, &mut qb);
        }
        qb.push(")");
        qb
    }

    /// Run the query and compute the neighbouring page cursors.
    #[instrument(skip(self, conn), fields(table = self.table, marker = ?self.marker, limit = ?self.limit), err(level = "debug"))]
    pub async fn fetch<R>(&self, conn: &mut PgConnection) -> Result<Page<R>>
    where
        R: for<'r> FromRow<'r, PgRow> + Keyed + Send + Unpin,
    {
        if let Some(marker) = self.marker {
            let exists: bool = self.build_marker_check(marker).build_query_scalar().fetch_one(&mut *conn).await?;
            if !exists {
                return Err(DbError::InvalidMarker);
            }
        }

        let mut items: Vec<R> = self.build().build_query_as::<R>().fetch_all(&mut *conn).await?;
        if self.reverse {
            items.reverse();
        }

        let mut links = PageLinks::default();
        if self.marker.is_some() {
            links.previous = items.first().map(Keyed::key);
        }
        if let Some(limit) = self.limit {
            if items.len() as i64 >= limit {
                links.next = items.last().map(Keyed::key);
            }
        }

        Ok(Page { items, links })
    }
}
