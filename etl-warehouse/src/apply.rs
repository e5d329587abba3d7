//! Writes a [`RowDiff`] to a warehouse table.

use tracing::info;

use crate::diff::RowDiff;
use crate::error::EtlResult;
use crate::sql::WriteStatement;
use crate::warehouse::WarehouseConnection;

/// Rows written by [`apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub inserted: u64,
    pub updated: u64,
}

/// Inserts the new rows, then updates the changed rows, each in its own transaction.
///
/// An empty set issues no statement. A failed update leaves the committed insert in place.
pub async fn apply<C>(
    connection: &mut C,
    table_name: &str,
    diff: RowDiff,
) -> EtlResult<ApplyOutcome>
where
    C: WarehouseConnection,
{
    let RowDiff {
        columns,
        primary_key,
        new_rows,
        updated_rows,
        ..
    } = diff;
    let mut outcome = ApplyOutcome::default();

    info!(table = table_name, "New rows to insert: {}", new_rows.len());
    if !new_rows.is_empty() {
        let statement = WriteStatement::insert(table_name, columns.clone(), &primary_key, new_rows);

        info!(table = table_name, "Inserting new data into table: {}", table_name);
        outcome.inserted = connection.execute_in_transaction(&statement).await?;
        info!(table = table_name, "New data commited to table: {}", table_name);
    }

    info!(table = table_name, "Existing rows to update: {}", updated_rows.len());
    if !updated_rows.is_empty() {
        match WriteStatement::update(table_name, columns, &primary_key, updated_rows) {
            Some(statement) => {
                info!(table = table_name, "Updating existing data in table: {}", table_name);
                outcome.updated = connection.execute_in_transaction(&statement).await?;
                info!(table = table_name, "Updated data commited to table: {}", table_name);
            }
            None => info!(
                table = table_name,
                "table has no column besides its primary key, skipping update"
            ),
        }
    }

    Ok(outcome)
}
