//! Rendering of the bulk statements issued by the merge applier.

use std::fmt::Write;

use pg_escape::{quote_identifier, quote_literal};

use crate::types::{Cell, ColumnDescriptor, TableRow};

/// Alias of the `VALUES` list in bulk updates.
const UPDATE_SOURCE_ALIAS: &str = "data";

/// Renders a cell as a SQL literal.
pub fn render_literal(cell: &Cell) -> String {
    match cell {
        Cell::Null => "NULL".to_string(),
        Cell::Bool(true) => "TRUE".to_string(),
        Cell::Bool(false) => "FALSE".to_string(),
        Cell::I16(v) => v.to_string(),
        Cell::I32(v) => v.to_string(),
        Cell::I64(v) => v.to_string(),
        Cell::F64(v) if v.is_nan() => "'NaN'::float8".to_string(),
        Cell::F64(v) if v.is_infinite() && v.is_sign_positive() => "'Infinity'::float8".to_string(),
        Cell::F64(v) if v.is_infinite() => "'-Infinity'::float8".to_string(),
        Cell::F64(v) => v.to_string(),
        Cell::String(v) => quote_literal(v).to_string(),
        Cell::Date(v) => format!("'{}'::date", v.format("%Y-%m-%d")),
        Cell::Time(v) => format!("'{}'::time", v.format("%H:%M:%S%.6f")),
        Cell::Timestamp(v) => format!("'{}'::timestamp", v.format("%Y-%m-%d %H:%M:%S%.6f")),
    }
}

fn write_values_list(statement: &mut String, rows: &[TableRow]) {
    for (row_index, row) in rows.iter().enumerate() {
        if row_index > 0 {
            statement.push_str(", ");
        }

        statement.push('(');
        for (value_index, value) in row.values().iter().enumerate() {
            if value_index > 0 {
                statement.push_str(", ");
            }
            statement.push_str(&render_literal(value));
        }
        statement.push(')');
    }
}

/// `INSERT INTO t VALUES (..), (..)` with values in the table's column order.
pub fn build_insert_statement(table_name: &str, rows: &[TableRow]) -> String {
    let mut statement = format!("INSERT INTO {} VALUES ", quote_identifier(table_name));
    write_values_list(&mut statement, rows);

    statement
}

/// Bulk `UPDATE .. FROM (VALUES ..)` setting every non key column, matched on the primary key.
///
/// Values read from the `VALUES` list are cast to the warehouse column type when it is known,
/// since Postgres types a `VALUES` column from its literals. Returns [`None`] when the table has
/// no column besides the primary key.
pub fn build_update_statement(
    table_name: &str,
    columns: &[ColumnDescriptor],
    primary_key: &str,
    rows: &[TableRow],
) -> Option<String> {
    let table = quote_identifier(table_name);
    let source_value = |column: &ColumnDescriptor| {
        let name = quote_identifier(&column.name);
        match &column.sql_type {
            Some(sql_type) => format!("{UPDATE_SOURCE_ALIAS}.{name}::{sql_type}"),
            None => format!("{UPDATE_SOURCE_ALIAS}.{name}"),
        }
    };

    let assignments = columns
        .iter()
        .filter(|column| column.name != primary_key)
        .map(|column| format!("{} = {}", quote_identifier(&column.name), source_value(column)))
        .collect::<Vec<_>>();
    if assignments.is_empty() {
        return None;
    }

    let key_column = columns.iter().find(|column| column.name == primary_key)?;
    let column_list = columns
        .iter()
        .map(|column| quote_identifier(&column.name).into_owned())
        .collect::<Vec<_>>()
        .join(", ");

    let mut statement = format!("UPDATE {table} SET {} FROM (VALUES ", assignments.join(", "));
    write_values_list(&mut statement, rows);
    // Writing to a `String` cannot fail.
    let _ = write!(
        statement,
        ") AS {UPDATE_SOURCE_ALIAS}({column_list}) WHERE {table}.{} = {}",
        quote_identifier(primary_key),
        source_value(key_column)
    );

    Some(statement)
}

/// Kind of write issued against a warehouse table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
}

/// A bulk write, rendered to SQL, together with the rows it carries.
///
/// The SQL text is what a relational warehouse executes. The structured fields let other
/// implementations apply the same write without parsing SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteStatement {
    kind: StatementKind,
    table_name: String,
    columns: Vec<ColumnDescriptor>,
    primary_key: String,
    rows: Vec<TableRow>,
    sql: String,
}

impl WriteStatement {
    pub fn insert(
        table_name: &str,
        columns: Vec<ColumnDescriptor>,
        primary_key: &str,
        rows: Vec<TableRow>,
    ) -> Self {
        let sql = build_insert_statement(table_name, &rows);

        Self {
            kind: StatementKind::Insert,
            table_name: table_name.to_string(),
            columns,
            primary_key: primary_key.to_string(),
            rows,
            sql,
        }
    }

    /// Returns [`None`] when there is no column to set besides the primary key.
    pub fn update(
        table_name: &str,
        columns: Vec<ColumnDescriptor>,
        primary_key: &str,
        rows: Vec<TableRow>,
    ) -> Option<Self> {
        let sql = build_update_statement(table_name, &columns, primary_key, &rows)?;

        Some(Self {
            kind: StatementKind::Update,
            table_name: table_name.to_string(),
            columns,
            primary_key: primary_key.to_string(),
            rows,
            sql,
        })
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}
