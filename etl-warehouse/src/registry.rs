//! Static description of the warehouse tables that can be populated.
//!
//! Each table has one primary key column and an optional set of reconciliation rules. Adding a
//! table or a rule is a change to [`TABLES`] only.

use crate::types::ColumnType;

/// Whether a table holds entity attributes or event measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Dimension,
    Fact,
}

/// Canonical comparison type a column is cast to before diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    /// Dates and date-time strings become naive timestamps, dates at midnight.
    Timestamp,
    /// Integers, integral floats and numeric strings become `i64`, `NaN` becomes null.
    NullableInt,
}

impl TargetType {
    pub fn column_type(self) -> ColumnType {
        match self {
            TargetType::Timestamp => ColumnType::Timestamp,
            TargetType::NullableInt => ColumnType::NullableInt,
        }
    }
}

/// Casts `column` to `target` in both the snapshot and the warehouse state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReconciliationRule {
    pub column: &'static str,
    pub target: TargetType,
}

const fn rule(column: &'static str, target: TargetType) -> ReconciliationRule {
    ReconciliationRule { column, target }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: &'static str,
    pub kind: TableKind,
    pub primary_key: &'static str,
    pub rules: &'static [ReconciliationRule],
}

const fn dimension(
    name: &'static str,
    primary_key: &'static str,
    rules: &'static [ReconciliationRule],
) -> TableDefinition {
    TableDefinition {
        name,
        kind: TableKind::Dimension,
        primary_key,
        rules,
    }
}

const fn fact(
    name: &'static str,
    primary_key: &'static str,
    rules: &'static [ReconciliationRule],
) -> TableDefinition {
    TableDefinition {
        name,
        kind: TableKind::Fact,
        primary_key,
        rules,
    }
}

/// Every table in population order.
pub static TABLES: &[TableDefinition] = &[
    dimension("dim_staff", "staff_id", &[]),
    dimension(
        "dim_date",
        "date_id",
        &[rule("date_id", TargetType::Timestamp)],
    ),
    dimension("dim_location", "location_id", &[]),
    dimension("dim_design", "design_id", &[]),
    dimension("dim_counterparty", "counterparty_id", &[]),
    dimension(
        "dim_transaction",
        "transaction_id",
        &[
            rule("sales_order_id", TargetType::NullableInt),
            rule("purchase_order_id", TargetType::NullableInt),
        ],
    ),
    dimension("dim_payment_type", "payment_type_id", &[]),
    dimension("dim_currency", "currency_id", &[]),
    fact(
        "fact_sales_order",
        "sales_record_id",
        &[
            rule("agreed_delivery_date", TargetType::Timestamp),
            rule("agreed_payment_date", TargetType::Timestamp),
        ],
    ),
    fact(
        "fact_purchase_order",
        "purchase_record_id",
        &[
            rule("agreed_delivery_date", TargetType::Timestamp),
            rule("agreed_payment_date", TargetType::Timestamp),
        ],
    ),
    fact(
        "fact_payment",
        "payment_record_id",
        &[rule("payment_date", TargetType::Timestamp)],
    ),
];

/// Names of every table, in population order.
pub fn table_names() -> Vec<&'static str> {
    TABLES.iter().map(|table| table.name).collect()
}

pub fn lookup(table_name: &str) -> Option<&'static TableDefinition> {
    TABLES.iter().find(|table| table.name == table_name)
}

/// Returns the definition of a known table.
///
/// # Panics
///
/// Panics when `table_name` is not in [`TABLES`]. The table set is fixed at build time, so an
/// unknown name is a programming error. Configured table lists are validated against
/// [`table_names`] before a run starts.
pub fn definition_of(table_name: &str) -> &'static TableDefinition {
    match lookup(table_name) {
        Some(definition) => definition,
        None => panic!("table `{table_name}` is not registered"),
    }
}

/// Primary key column of a known table. Panics on unknown tables, see [`definition_of`].
pub fn primary_key_of(table_name: &str) -> &'static str {
    definition_of(table_name).primary_key
}

/// Reconciliation rules of a known table. Panics on unknown tables, see [`definition_of`].
pub fn reconciliation_rules_of(table_name: &str) -> &'static [ReconciliationRule] {
    definition_of(table_name).rules
}
