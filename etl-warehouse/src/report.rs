//! Per-table outcome reports shared by the population and transform runs.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::{EtlError, EtlResult};

/// Outcome of one table in a run.
#[derive(Debug, Clone)]
pub struct TableOutcome<T> {
    pub table_name: String,
    pub result: Result<T, EtlError>,
}

impl<T> TableOutcome<T> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-table outcomes of a run, in processing order.
///
/// Serializes as a map from table name to success flag.
#[derive(Debug, Clone)]
pub struct RunReport<T> {
    outcomes: Vec<TableOutcome<T>>,
}

impl<T> RunReport<T> {
    pub fn new(outcomes: Vec<TableOutcome<T>>) -> Self {
        Self { outcomes }
    }

    /// Whether `table_name` succeeded, [`None`] if it was not part of the run.
    pub fn get(&self, table_name: &str) -> Option<bool> {
        self.outcome(table_name).map(TableOutcome::succeeded)
    }

    pub fn outcome(&self, table_name: &str) -> Option<&TableOutcome<T>> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.table_name == table_name)
    }

    pub fn outcomes(&self) -> &[TableOutcome<T>] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(TableOutcome::succeeded)
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.succeeded())
            .map(|outcome| outcome.table_name.as_str())
            .collect()
    }

    /// Returns every table error aggregated into one, or `Ok` when all tables succeeded.
    pub fn into_result(self) -> EtlResult<()> {
        let errors: Vec<EtlError> = self
            .outcomes
            .into_iter()
            .filter_map(|outcome| outcome.result.err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

impl<T> Default for RunReport<T> {
    fn default() -> Self {
        Self {
            outcomes: Vec::new(),
        }
    }
}

impl<T> Serialize for RunReport<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.outcomes.len()))?;
        for outcome in &self.outcomes {
            map.serialize_entry(&outcome.table_name, &outcome.succeeded())?;
        }
        map.end()
    }
}

impl<T> fmt::Display for RunReport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, outcome) in self.outcomes.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{}': {}", outcome.table_name, outcome.succeeded())?;
        }
        f.write_str("}")
    }
}
