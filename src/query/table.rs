use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;

use crate::error::{CircuitError, Result};
use crate::population::Column;

/// Selected records: an id index plus named columns, in request order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeTable {
    index: Vec<usize>,
    columns: Vec<(String, Column)>,
}

impl NodeTable {
    /// Builds a table, checking that every column matches the index length.
    pub fn new(index: Vec<usize>, columns: Vec<(String, Column)>) -> Result<Self> {
        if let Some((name, column)) = columns.iter().find(|(_, c)| c.len() != index.len()) {
            return Err(CircuitError::circuit(format!(
                "column {name} has {} rows, index has {}",
                column.len(),
                index.len()
            )));
        }
        Ok(Self { index, columns })
    }

    /// Row ids.
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when no row was selected.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, column)| column)
    }

    /// Columns in order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(name, column)| (name.as_str(), column))
    }

    /// Column data types in order.
    pub fn dtypes(&self) -> Vec<(String, &'static str)> {
        self.columns
            .iter()
            .map(|(name, column)| (name.clone(), column.dtype()))
            .collect()
    }

    /// Replaces every column named `name` with `f(column)`.
    pub fn map_column<F>(&mut self, name: &str, f: F)
    where
        F: Fn(Column) -> Column,
    {
        for (candidate, column) in self.columns.iter_mut() {
            if candidate.as_str() == name {
                let taken = std::mem::replace(column, Column::Int64(Vec::new()));
                *column = f(taken);
            }
        }
    }

    /// Stacks tables with identical columns, keeping their row order.
    pub fn concat(tables: Vec<NodeTable>) -> Result<NodeTable> {
        let mut tables = tables.into_iter();
        let Some(first) = tables.next() else {
            return Ok(NodeTable::default());
        };
        let names: Vec<String> = first.columns.iter().map(|(n, _)| n.clone()).collect();
        let mut index = first.index;
        let mut parts: Vec<Vec<Column>> = first.columns.into_iter().map(|(_, c)| vec![c]).collect();
        for table in tables {
            let same = table.columns.len() == names.len()
                && table.columns.iter().zip(&names).all(|((n, _), m)| n == m);
            if !same {
                return Err(CircuitError::circuit("cannot concatenate tables with different columns"));
            }
            index.extend(table.index);
            for (slot, (_, column)) in parts.iter_mut().zip(table.columns) {
                slot.push(column);
            }
        }
        let columns = names
            .into_iter()
            .zip(parts)
            .map(|(name, chunks)| Column::concat(chunks).map(|column| (name, column)))
            .collect::<Result<Vec<_>>>()?;
        NodeTable::new(index, columns)
    }

    /// Reorders rows by ascending id.
    pub fn sort_by_index(&mut self) {
        if self.index.windows(2).all(|w| w[0] <= w[1]) {
            return;
        }
        let mut order: Vec<usize> = (0..self.index.len()).collect();
        order.sort_by_key(|&row| self.index[row]);
        self.index = order.iter().map(|&row| self.index[row]).collect();
        for (_, column) in self.columns.iter_mut() {
            *column = column.take(&order);
        }
    }

    /// Replaces ids with the dense range `0..len`.
    pub fn reset_index(&mut self) {
        self.index = (0..self.index.len()).collect();
    }

    /// Row-major values, one vector per row, in column order.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        (0..self.len())
            .map(|row| self.columns.iter().map(|(_, c)| c.value(row)).collect())
            .collect()
    }
}

/// Serialized as `{"columns": [...], "index": [...], "data": [[...], ...]}`.
impl Serialize for NodeTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("NodeTable", 3)?;
        state.serialize_field("columns", &self.column_names())?;
        state.serialize_field("index", &self.index)?;
        state.serialize_field("data", &self.rows())?;
        state.end()
    }
}
