use config::shared::{IntoConnectOptions, PgConnectionConfig, SOURCE_CONNECTION_OPTIONS};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Decode, PgPool, Postgres, Row, Type, TypeInfo};
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::query::{QueryParams, SelectStatement, bind_named_parameters};
use crate::source::RelationalSource;
use crate::types::{Cell, SourceRow};

/// Maximum number of connections a datasource pool opens.
const MAX_POOL_CONNECTIONS: u32 = 4;

/// A PostgreSQL datasource backed by a lazily connecting [`PgPool`].
///
/// Columns are decoded from their Postgres type. Types without a [`Cell`] counterpart
/// (`NUMERIC`, `UUID`, ...) must be cast in the field's SQL expression.
#[derive(Debug, Clone)]
pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a pool that connects on first use with the source session options.
    pub fn connect_lazy(config: &PgConnectionConfig) -> Self {
        let options = config.with_db(Some(&*SOURCE_CONNECTION_OPTIONS));
        let pool = PgPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .connect_lazy_with(options);

        Self { pool }
    }
}

impl RelationalSource for PostgresSource {
    fn name() -> &'static str {
        "postgres"
    }

    async fn execute(
        &self,
        statement: &SelectStatement,
        params: &QueryParams,
    ) -> EtlResult<Vec<SourceRow>> {
        let (sql, binds) = bind_named_parameters(&statement.sql, params)?;
        debug!(%sql, ?binds, "executing source query");

        let mut query = sqlx::query(&sql);
        for cell in binds {
            query = bind_cell(query, cell);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

fn bind_cell(query: Query<'_, Postgres, PgArguments>, cell: Cell) -> Query<'_, Postgres, PgArguments> {
    match cell {
        Cell::Null => query.bind(None::<String>),
        Cell::Bool(value) => query.bind(value),
        Cell::I16(value) => query.bind(value),
        Cell::I32(value) => query.bind(value),
        Cell::I64(value) => query.bind(value),
        Cell::F32(value) => query.bind(value),
        Cell::F64(value) => query.bind(value),
        Cell::String(value) => query.bind(value),
        Cell::Date(value) => query.bind(value),
        Cell::Timestamp(value) => query.bind(value),
        Cell::TimestampTz(value) => query.bind(value),
    }
}

fn decode_row(row: &PgRow) -> EtlResult<SourceRow> {
    let mut source_row = SourceRow::new();
    for (index, column) in row.columns().iter().enumerate() {
        let cell = match column.type_info().name() {
            "BOOL" => decode(row, index, Cell::Bool)?,
            "INT2" => decode(row, index, Cell::I16)?,
            "INT4" => decode(row, index, Cell::I32)?,
            "INT8" => decode(row, index, Cell::I64)?,
            "FLOAT4" => decode(row, index, Cell::F32)?,
            "FLOAT8" => decode(row, index, Cell::F64)?,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => decode(row, index, Cell::String)?,
            "DATE" => decode(row, index, Cell::Date)?,
            "TIMESTAMP" => decode(row, index, Cell::Timestamp)?,
            "TIMESTAMPTZ" => decode(row, index, Cell::TimestampTz)?,
            other => bail!(
                ErrorKind::SourceSchemaError,
                "Column type is not supported, cast it in the field expression",
                format!("column {} has type {other}", column.name())
            ),
        };
        source_row.insert(column.name(), cell);
    }

    Ok(source_row)
}

fn decode<'r, T>(row: &'r PgRow, index: usize, wrap: impl FnOnce(T) -> Cell) -> EtlResult<Cell>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    Ok(row
        .try_get::<Option<T>, _>(index)?
        .map(wrap)
        .unwrap_or(Cell::Null))
}
