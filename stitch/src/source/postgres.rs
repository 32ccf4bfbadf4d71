use std::collections::VecDeque;

use pg_escape::{quote_identifier, quote_literal};
use postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use postgres::{Client, NoTls};
use stitch_config::{PgConnectionConfig, PgSourceConfig};
use tracing::debug;

use crate::error::{ErrorKind, StitchResult};
use crate::schema::EntitySchema;
use crate::source::{
    QueryBackend, ResilientCursor, RetryPolicy, RowCursor, RowSource, SourceProvider,
};
use crate::types::{Cell, Row, SortKey};

/// Name of the server-side cursor used in streaming mode. Each streaming
/// open runs on its own connection, so a fixed name cannot collide.
const CURSOR_NAME: &str = "stitch_rows";

/// A schema-qualified Postgres table.
#[derive(Debug, Clone)]
pub struct PgTable {
    pub schema: String,
    pub name: String,
}

impl PgTable {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> PgTable {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the table as a properly quoted Postgres identifier.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_schema = quote_identifier(&self.schema);
        let quoted_name = quote_identifier(&self.name);

        format!("{quoted_schema}.{quoted_name}")
    }
}

/// Table-backed source provider: a single resilient cursor over an ordered
/// SELECT of the entity's columns.
pub struct PgSourceProvider {
    config: PgSourceConfig,
    columns: Vec<String>,
    sort_columns: Vec<String>,
    sort_positions: Vec<usize>,
    label: String,
}

impl PgSourceProvider {
    /// Creates a provider issuing ordered queries shaped by `schema`.
    pub fn new(config: PgSourceConfig, schema: &EntitySchema) -> Self {
        Self {
            columns: schema.header().iter().map(|s| s.to_string()).collect(),
            sort_columns: schema
                .sort_key_columns()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sort_positions: schema.sort_key_positions().to_vec(),
            label: schema.name().to_string(),
            config,
        }
    }
}

impl SourceProvider for PgSourceProvider {
    fn source_count(&self) -> usize {
        1
    }

    fn open_source(&self, _index: usize) -> StitchResult<Box<dyn RowSource>> {
        let backend = PgQueryBackend {
            connection: self.config.connection.clone(),
            table: PgTable::new(self.config.schema.clone(), self.config.table.clone()),
            columns: self.columns.clone(),
            sort_columns: self.sort_columns.clone(),
            fetch_size: self.config.fetch_size,
            client: None,
        };

        Ok(Box::new(ResilientCursor::new(
            Box::new(backend),
            self.sort_positions.clone(),
            RetryPolicy::from(&self.config.retry),
            self.config.page_size,
            self.label.clone(),
        )))
    }
}

/// Query backend over one Postgres table.
///
/// In paged mode (a `limit` is passed), the connection is kept and reused
/// across pages and each page is buffered, bounding memory by the page size.
/// Without a limit, a dedicated connection runs a server-side
/// `NO SCROLL` cursor in a read-only transaction and rows arrive in
/// `fetch_size` batches.
pub struct PgQueryBackend {
    connection: PgConnectionConfig,
    table: PgTable,
    columns: Vec<String>,
    sort_columns: Vec<String>,
    fetch_size: u32,
    client: Option<Client>,
}

impl PgQueryBackend {
    fn connect(&self) -> StitchResult<Client> {
        let client = self.connection.client_config().connect(NoTls)?;
        debug!(table = %self.table.as_quoted_identifier(), "connected to source database");
        Ok(client)
    }

    /// Reuses the retained connection if it is still alive.
    fn take_client(&mut self) -> StitchResult<Client> {
        if let Some(client) = self.client.take() {
            if !client.is_closed() {
                return Ok(client);
            }
        }
        self.connect()
    }

    /// Builds the ordered, watermark-filtered query.
    ///
    /// With [`Placeholders::Bind`] the watermark values come back as
    /// parameters; with [`Placeholders::Inline`] they are rendered as quoted
    /// literals, required for the `DECLARE CURSOR` path (a utility statement
    /// that cannot carry bound parameters).
    fn build_query(
        &self,
        resume_after: Option<&SortKey>,
        limit: Option<u64>,
        placeholders: Placeholders,
    ) -> (String, Vec<Cell>) {
        let columns = self
            .columns
            .iter()
            .map(|name| quote_identifier(name).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let order = self
            .sort_columns
            .iter()
            .map(|name| quote_identifier(name).to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "SELECT {columns} FROM {}",
            self.table.as_quoted_identifier()
        );
        let mut params = Vec::new();

        if let Some(watermark) = resume_after {
            let predicate = vector_greater_than(
                &self.sort_columns,
                watermark.cells(),
                &mut params,
                placeholders,
            );
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }

        sql.push_str(" ORDER BY ");
        sql.push_str(&order);

        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        (sql, params)
    }
}

/// How watermark values reach the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholders {
    Bind,
    Inline,
}

impl QueryBackend for PgQueryBackend {
    fn open(
        &mut self,
        resume_after: Option<&SortKey>,
        limit: Option<u64>,
    ) -> StitchResult<Box<dyn RowCursor>> {
        if limit.is_some() {
            let (sql, params) = self.build_query(resume_after, limit, Placeholders::Bind);
            let param_refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|cell| cell as &(dyn ToSql + Sync)).collect();

            let mut client = self.take_client()?;
            let rows = match client.query(&sql, &param_refs) {
                Ok(rows) => rows,
                // A failed query may leave the connection broken; drop it so
                // the next open reconnects.
                Err(err) => return Err(err.into()),
            };
            self.client = Some(client);

            Ok(Box::new(BufferedPage {
                rows: rows.into_iter(),
            }))
        } else {
            let (sql, _) = self.build_query(resume_after, limit, Placeholders::Inline);

            let mut client = self.connect()?;
            client.batch_execute("BEGIN READ ONLY")?;
            let declare = format!("DECLARE {CURSOR_NAME} NO SCROLL CURSOR FOR {sql}");
            client.batch_execute(&declare)?;

            Ok(Box::new(StreamingCursor {
                client,
                fetch_sql: format!("FETCH {} FROM {CURSOR_NAME}", self.fetch_size),
                fetch_size: self.fetch_size as usize,
                batch: VecDeque::new(),
                done: false,
            }))
        }
    }
}

/// One fully-buffered page of rows.
struct BufferedPage {
    rows: std::vec::IntoIter<postgres::Row>,
}

impl RowCursor for BufferedPage {
    fn fetch(&mut self) -> StitchResult<Option<Row>> {
        match self.rows.next() {
            Some(row) => Ok(Some(row_to_cells(&row)?)),
            None => Ok(None),
        }
    }
}

/// A server-side cursor drained in fixed-size batches.
struct StreamingCursor {
    client: Client,
    fetch_sql: String,
    fetch_size: usize,
    batch: VecDeque<postgres::Row>,
    done: bool,
}

impl RowCursor for StreamingCursor {
    fn fetch(&mut self) -> StitchResult<Option<Row>> {
        if self.batch.is_empty() && !self.done {
            let rows = self.client.query(&self.fetch_sql, &[])?;
            if rows.len() < self.fetch_size {
                self.done = true;
            }
            self.batch.extend(rows);
        }

        match self.batch.pop_front() {
            Some(row) => Ok(Some(row_to_cells(&row)?)),
            None => Ok(None),
        }
    }
}

/// Renders the lexicographic `columns > values` predicate: the first
/// differing column decides, and NULL sorts before any value.
fn vector_greater_than(
    columns: &[String],
    values: &[Cell],
    params: &mut Vec<Cell>,
    placeholders: Placeholders,
) -> String {
    let column = quote_identifier(&columns[0]);

    if values[0].is_null() {
        if columns.len() > 1 {
            let rest = vector_greater_than(&columns[1..], &values[1..], params, placeholders);
            format!("({column} IS NOT NULL OR ({column} IS NULL AND {rest}))")
        } else {
            format!("{column} IS NOT NULL")
        }
    } else {
        let placeholder = match placeholders {
            Placeholders::Bind => {
                params.push(values[0].clone());
                format!("${}", params.len())
            }
            Placeholders::Inline => sql_literal(&values[0]),
        };

        if columns.len() > 1 {
            let rest = vector_greater_than(&columns[1..], &values[1..], params, placeholders);
            format!(
                "({column} > {placeholder} OR ({column} = {placeholder} AND {rest}))"
            )
        } else {
            format!("{column} > {placeholder}")
        }
    }
}

/// Renders a watermark value as a SQL literal for the cursor declaration.
fn sql_literal(cell: &Cell) -> String {
    match cell {
        Cell::Null => "NULL".to_string(),
        Cell::Bool(true) => "TRUE".to_string(),
        Cell::Bool(false) => "FALSE".to_string(),
        Cell::Int(value) => value.to_string(),
        Cell::Real(value) => {
            if value.is_finite() {
                value.to_string()
            } else {
                quote_literal(&value.to_string()).to_string()
            }
        }
        Cell::Text(value) => quote_literal(value).to_string(),
        Cell::Date(value) => quote_literal(&value.format("%Y-%m-%d").to_string()).to_string(),
        Cell::Timestamp(value) => {
            quote_literal(&value.format("%Y-%m-%d %H:%M:%S%.f").to_string()).to_string()
        }
    }
}

fn row_to_cells(row: &postgres::Row) -> StitchResult<Row> {
    (0..row.len()).map(|index| cell_at(row, index)).collect()
}

fn cell_at(row: &postgres::Row, index: usize) -> StitchResult<Cell> {
    let column = &row.columns()[index];
    let ty = column.type_();

    let cell = if *ty == Type::BOOL {
        get::<bool>(row, index)?.map_or(Cell::Null, Cell::Bool)
    } else if *ty == Type::INT2 {
        get::<i16>(row, index)?.map_or(Cell::Null, |v| Cell::Int(v.into()))
    } else if *ty == Type::INT4 {
        get::<i32>(row, index)?.map_or(Cell::Null, |v| Cell::Int(v.into()))
    } else if *ty == Type::INT8 {
        get::<i64>(row, index)?.map_or(Cell::Null, Cell::Int)
    } else if *ty == Type::FLOAT4 {
        get::<f32>(row, index)?.map_or(Cell::Null, |v| Cell::Real(v.into()))
    } else if *ty == Type::FLOAT8 {
        get::<f64>(row, index)?.map_or(Cell::Null, Cell::Real)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        get::<String>(row, index)?.map_or(Cell::Null, Cell::Text)
    } else if *ty == Type::DATE {
        get::<chrono::NaiveDate>(row, index)?.map_or(Cell::Null, Cell::Date)
    } else if *ty == Type::TIMESTAMP {
        get::<chrono::NaiveDateTime>(row, index)?.map_or(Cell::Null, Cell::Timestamp)
    } else {
        return Err(crate::stitch_error!(
            ErrorKind::ConfigError,
            "unsupported column type in source query",
            format!("column `{}` has type `{ty}`", column.name())
        ));
    };

    Ok(cell)
}

fn get<'a, T: postgres::types::FromSql<'a>>(
    row: &'a postgres::Row,
    index: usize,
) -> StitchResult<Option<T>> {
    row.try_get(index).map_err(|err| {
        crate::stitch_error!(
            ErrorKind::RowTranslationFailed,
            "failed to decode database value",
            format!("column `{}`", row.columns()[index].name()),
            source: err
        )
    })
}

/// Watermark parameters bind through the driver's usual conversions; NULL
/// coordinates never reach a placeholder (the predicate uses `IS NULL`
/// branches for them).
impl ToSql for Cell {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Cell::Null => Ok(IsNull::Yes),
            Cell::Bool(value) => value.to_sql(ty, out),
            Cell::Int(value) => {
                if *ty == Type::INT2 {
                    (*value as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*value as i32).to_sql(ty, out)
                } else {
                    value.to_sql(ty, out)
                }
            }
            Cell::Real(value) => {
                if *ty == Type::FLOAT4 {
                    (*value as f32).to_sql(ty, out)
                } else {
                    value.to_sql(ty, out)
                }
            }
            Cell::Text(value) => value.to_sql(ty, out),
            Cell::Date(value) => value.to_sql(ty, out),
            Cell::Timestamp(value) => value.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> PgQueryBackend {
        PgQueryBackend {
            connection: PgConnectionConfig::default(),
            table: PgTable::new("public", "invoices"),
            columns: vec!["account_id".into(), "id".into(), "amount".into()],
            sort_columns: vec!["account_id".into(), "id".into()],
            fetch_size: 1000,
            client: None,
        }
    }

    #[test]
    fn test_initial_query_has_no_lower_bound() {
        let (sql, params) = backend().build_query(None, None, Placeholders::Bind);
        assert_eq!(
            sql,
            "SELECT account_id, id, amount FROM public.invoices ORDER BY account_id, id"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_resume_query_filters_past_watermark() {
        let watermark = SortKey(vec![Cell::Int(7), Cell::Int(42)]);
        let (sql, params) = backend().build_query(Some(&watermark), Some(500), Placeholders::Bind);

        assert_eq!(
            sql,
            "SELECT account_id, id, amount FROM public.invoices \
             WHERE (account_id > $1 OR (account_id = $1 AND id > $2)) \
             ORDER BY account_id, id LIMIT 500"
        );
        assert_eq!(params, vec![Cell::Int(7), Cell::Int(42)]);
    }

    #[test]
    fn test_null_watermark_coordinate_uses_is_null_branches() {
        let watermark = SortKey(vec![Cell::Null, Cell::Int(3)]);
        let (sql, params) = backend().build_query(Some(&watermark), None, Placeholders::Bind);

        assert!(sql.contains(
            "(account_id IS NOT NULL OR (account_id IS NULL AND id > $1))"
        ));
        assert_eq!(params, vec![Cell::Int(3)]);
    }

    #[test]
    fn test_trailing_null_coordinate() {
        let watermark = SortKey(vec![Cell::Int(7), Cell::Null]);
        let (sql, params) = backend().build_query(Some(&watermark), None, Placeholders::Bind);

        assert!(sql.contains("(account_id > $1 OR (account_id = $1 AND id IS NOT NULL))"));
        assert_eq!(params, vec![Cell::Int(7)]);
    }

    #[test]
    fn test_inline_placeholders_render_quoted_literals() {
        let mut backend = backend();
        backend.sort_columns = vec!["account_id".into(), "label".into()];
        let watermark = SortKey(vec![Cell::Int(7), Cell::Text("O'Neil".into())]);

        let (sql, params) = backend.build_query(Some(&watermark), None, Placeholders::Inline);

        assert!(sql.contains("(account_id > 7 OR (account_id = 7 AND label > 'O''Neil'))"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_identifiers_needing_quotes_are_quoted() {
        let mut backend = backend();
        backend.columns = vec!["select".into()];
        backend.sort_columns = vec!["select".into()];

        let (sql, _) = backend.build_query(None, None, Placeholders::Bind);
        assert_eq!(
            sql,
            "SELECT \"select\" FROM public.invoices ORDER BY \"select\""
        );
    }
}
