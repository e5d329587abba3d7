use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use etl_config::shared::WarehouseCredentials;
use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::registry;
use crate::sql::{StatementKind, WriteStatement};
use crate::types::{Cell, Column, ColumnType, Snapshot};
use crate::warehouse::{WarehouseConnection, WarehouseConnector};

/// Failure injected into a [`MemoryWarehouse`].
///
/// Faults stay active until [`MemoryWarehouse::clear_faults`] is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Every connection attempt fails.
    Connect,
    /// Reading the state of the table fails.
    FetchTableState(String),
    /// Reading the state of the table stalls for the given time before succeeding.
    SlowFetchTableState(String, Duration),
    /// Inserts into the table fail and are rolled back.
    Insert(String),
    /// Updates of the table fail and are rolled back.
    Update(String),
}

/// A committed write, as recorded by [`MemoryWarehouse`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub connection_id: u64,
    pub statement: WriteStatement,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Snapshot>,
    faults: Vec<Fault>,
    statements: Vec<ExecutedStatement>,
    next_connection_id: u64,
    open_connections: Vec<u64>,
    closed_connections: Vec<u64>,
}

/// In-memory warehouse for tests and local runs.
///
/// Tables are created with [`MemoryWarehouse::create_table`]. Committed inserts and updates
/// are applied to the stored tables, so consecutive merges observe each other's writes. Every
/// committed statement and every connection open and close is recorded.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a table. Columns should carry their warehouse type name.
    pub async fn create_table(&self, table_name: &str, contents: Snapshot) {
        let mut inner = self.inner.lock().await;
        inner.tables.insert(table_name.to_string(), contents);
    }

    pub async fn table(&self, table_name: &str) -> Option<Snapshot> {
        let inner = self.inner.lock().await;
        inner.tables.get(table_name).cloned()
    }

    pub async fn inject_fault(&self, fault: Fault) {
        let mut inner = self.inner.lock().await;
        inner.faults.push(fault);
    }

    pub async fn clear_faults(&self) {
        let mut inner = self.inner.lock().await;
        inner.faults.clear();
    }

    /// Committed statements, in commit order.
    pub async fn statements(&self) -> Vec<ExecutedStatement> {
        let inner = self.inner.lock().await;
        inner.statements.clone()
    }

    pub async fn statements_for(&self, table_name: &str) -> Vec<ExecutedStatement> {
        let inner = self.inner.lock().await;
        inner
            .statements
            .iter()
            .filter(|executed| executed.statement.table_name() == table_name)
            .cloned()
            .collect()
    }

    /// Connections opened and not yet closed.
    pub async fn open_connections(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.open_connections.len()
    }

    pub async fn closed_connections(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.closed_connections.len()
    }

    pub async fn clear_statements(&self) {
        let mut inner = self.inner.lock().await;
        inner.statements.clear();
    }

    /// Inserts the rows of `contents` into an existing table without recording a statement.
    ///
    /// Columns are matched by name and values are stored with the table's column types.
    pub async fn seed(&self, table_name: &str, contents: &Snapshot) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(table) = inner.tables.get(table_name) else {
            bail!(
                ErrorKind::QueryError,
                "Statement failed",
                format!("relation \"{table_name}\" does not exist")
            );
        };

        let primary_key = match registry::lookup(table_name) {
            Some(definition) => definition.primary_key.to_string(),
            None => table
                .columns()
                .first()
                .map(|column| column.name.clone())
                .unwrap_or_default(),
        };
        let statement = WriteStatement::insert(
            table_name,
            contents.columns().iter().map(Column::descriptor).collect(),
            &primary_key,
            contents.rows().collect(),
        );

        let mut updated_table = table.clone();
        apply_insert(&mut updated_table, &statement)?;
        inner.tables.insert(table_name.to_string(), updated_table);

        Ok(())
    }
}

impl WarehouseConnector for MemoryWarehouse {
    type Connection = MemoryWarehouseConnection;

    fn name() -> &'static str {
        "memory"
    }

    async fn connect(&self, credentials: &WarehouseCredentials) -> EtlResult<Self::Connection> {
        let mut inner = self.inner.lock().await;

        if inner.faults.contains(&Fault::Connect) {
            bail!(
                ErrorKind::ConnectionError,
                "Warehouse connection failed",
                format!("injected failure connecting to {}:{}", credentials.host, credentials.port)
            );
        }

        inner.next_connection_id += 1;
        let id = inner.next_connection_id;
        inner.open_connections.push(id);

        Ok(MemoryWarehouseConnection {
            id,
            warehouse: self.clone(),
        })
    }
}

/// Connection handed out by [`MemoryWarehouse`].
#[derive(Debug)]
pub struct MemoryWarehouseConnection {
    id: u64,
    warehouse: MemoryWarehouse,
}

impl MemoryWarehouseConnection {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl WarehouseConnection for MemoryWarehouseConnection {
    async fn fetch_table_state(&mut self, table_name: &str) -> EtlResult<Snapshot> {
        let delay = {
            let inner = self.warehouse.inner.lock().await;
            if inner
                .faults
                .contains(&Fault::FetchTableState(table_name.to_string()))
            {
                bail!(
                    ErrorKind::QueryError,
                    "Failed to read table state",
                    format!("injected failure reading {table_name}")
                );
            }

            inner.faults.iter().find_map(|fault| match fault {
                Fault::SlowFetchTableState(table, delay) if table == table_name => Some(*delay),
                _ => None,
            })
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let inner = self.warehouse.inner.lock().await;
        match inner.tables.get(table_name) {
            Some(table) => Ok(table.clone()),
            None => bail!(
                ErrorKind::QueryError,
                "Failed to read table state",
                format!("relation \"{table_name}\" does not exist")
            ),
        }
    }

    async fn execute_in_transaction(&mut self, statement: &WriteStatement) -> EtlResult<u64> {
        let mut inner = self.warehouse.inner.lock().await;
        let table_name = statement.table_name().to_string();

        let injected = match statement.kind() {
            StatementKind::Insert => Fault::Insert(table_name.clone()),
            StatementKind::Update => Fault::Update(table_name.clone()),
        };
        if inner.faults.contains(&injected) {
            bail!(
                ErrorKind::QueryError,
                "Statement failed",
                format!("injected {:?} failure on {table_name}", statement.kind())
            );
        }

        let Some(table) = inner.tables.get(&table_name) else {
            bail!(
                ErrorKind::QueryError,
                "Statement failed",
                format!("relation \"{table_name}\" does not exist")
            );
        };

        // Changes are applied to a copy which replaces the table only on success.
        let mut updated_table = table.clone();
        let affected = match statement.kind() {
            StatementKind::Insert => apply_insert(&mut updated_table, statement)?,
            StatementKind::Update => apply_update(&mut updated_table, statement)?,
        };

        inner.tables.insert(table_name, updated_table);
        inner.statements.push(ExecutedStatement {
            connection_id: self.id,
            statement: statement.clone(),
        });

        Ok(affected)
    }

    async fn close(self) -> EtlResult<()> {
        let mut inner = self.warehouse.inner.lock().await;
        inner.open_connections.retain(|id| *id != self.id);
        inner.closed_connections.push(self.id);

        info!(connection_id = self.id, "memory warehouse connection released");

        Ok(())
    }
}

fn key_position(table: &Snapshot, statement: &WriteStatement) -> EtlResult<usize> {
    match table
        .columns()
        .iter()
        .position(|column| column.name == statement.primary_key())
    {
        Some(position) => Ok(position),
        None => bail!(
            ErrorKind::QueryError,
            "Statement failed",
            format!(
                "column \"{}\" does not exist in {}",
                statement.primary_key(),
                statement.table_name()
            )
        ),
    }
}

/// Positions, in the stored table, of the statement's columns.
fn column_positions(table: &Snapshot, statement: &WriteStatement) -> EtlResult<Vec<usize>> {
    statement
        .columns()
        .iter()
        .map(|descriptor| {
            match table
                .columns()
                .iter()
                .position(|column| column.name == descriptor.name)
            {
                Some(position) => Ok(position),
                None => bail!(
                    ErrorKind::QueryError,
                    "Statement failed",
                    format!(
                        "column \"{}\" of relation \"{}\" does not exist",
                        descriptor.name,
                        statement.table_name()
                    )
                ),
            }
        })
        .collect()
}

fn apply_insert(table: &mut Snapshot, statement: &WriteStatement) -> EtlResult<u64> {
    let positions = column_positions(table, statement)?;
    let key_position = key_position(table, statement)?;

    let mut columns = std::mem::take(table).into_columns();
    let mut keys: HashSet<Cell> = columns[key_position].cells.iter().cloned().collect();
    for row in statement.rows() {
        if row.values().len() != positions.len() {
            bail!(
                ErrorKind::QueryError,
                "Statement failed",
                "INSERT has more expressions than target columns"
            );
        }

        let mut values = vec![Cell::Null; columns.len()];
        for (value, position) in row.values().iter().zip(&positions) {
            values[*position] = store_as(columns[*position].column_type, value);
        }

        let key = &values[key_position];
        if !keys.insert(key.clone()) {
            bail!(
                ErrorKind::QueryError,
                "Statement failed",
                format!(
                    "duplicate key value violates unique constraint: ({})=({key})",
                    statement.primary_key()
                )
            );
        }

        for (column, value) in columns.iter_mut().zip(values) {
            column.cells.push(value);
        }
    }

    *table = Snapshot::new(columns)?;

    Ok(statement.rows().len() as u64)
}

fn apply_update(table: &mut Snapshot, statement: &WriteStatement) -> EtlResult<u64> {
    let positions = column_positions(table, statement)?;
    let key_position = key_position(table, statement)?;
    let Some(row_key_index) = statement
        .columns()
        .iter()
        .position(|column| column.name == statement.primary_key())
    else {
        bail!(
            ErrorKind::QueryError,
            "Statement failed",
            "update rows do not carry the primary key"
        );
    };

    let mut columns = std::mem::take(table).into_columns();
    let mut affected = 0;
    for row in statement.rows() {
        let key = &row.values()[row_key_index];
        let Some(target) = columns[key_position].cells.iter().position(|cell| cell == key) else {
            continue;
        };

        for (value, position) in row.values().iter().zip(&positions) {
            if *position != key_position {
                columns[*position].cells[target] = store_as(columns[*position].column_type, value);
            }
        }
        affected += 1;
    }

    *table = Snapshot::new(columns)?;

    Ok(affected)
}

/// Converts a written value to the representation of the column it is stored in, as the
/// assignment casts of a relational warehouse do.
fn store_as(column_type: ColumnType, value: &Cell) -> Cell {
    match (column_type, value) {
        (ColumnType::Date, Cell::Timestamp(timestamp)) => Cell::Date(timestamp.date()),
        (ColumnType::Timestamp, Cell::Date(date)) => {
            date.and_hms_opt(0, 0, 0).map_or(Cell::Null, Cell::Timestamp)
        }
        (ColumnType::Int | ColumnType::NullableInt, Cell::F64(float))
            if float.fract() == 0.0 && float.is_finite() =>
        {
            Cell::I64(*float as i64)
        }
        (ColumnType::Float, cell) => match cell.as_i64() {
            Some(int) => Cell::F64(int as f64),
            None => cell.clone(),
        },
        (_, cell) => cell.clone(),
    }
}

/// Builds an empty warehouse table from `(name, type, warehouse type)` triples.
pub fn empty_table(columns: &[(&str, ColumnType, &str)]) -> Snapshot {
    let columns = columns
        .iter()
        .map(|(name, column_type, sql_type)| {
            Column::new(*name, *column_type, Vec::new()).with_sql_type(*sql_type)
        })
        .collect();

    // Names given by the caller are distinct and all columns are empty.
    Snapshot::new(columns).unwrap_or_default()
}
