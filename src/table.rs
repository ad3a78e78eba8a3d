// 📊 Canonical Table - columnar, typed, serializable
// Each column holds one kind of value; every cell is optional (null).

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// COLUMN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "cells", rename_all = "snake_case")]
pub enum ColumnValues {
    Text(Vec<Option<String>>),
    Number(Vec<Option<f64>>),
    Date(Vec<Option<NaiveDate>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Text(v) => v.len(),
            ColumnValues::Number(v) => v.len(),
            ColumnValues::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ColumnValues::Text(_) => "text",
            ColumnValues::Number(_) => "number",
            ColumnValues::Date(_) => "date",
        }
    }

    /// Same kind, `len` nulls
    fn nulls_like(&self, len: usize) -> ColumnValues {
        match self {
            ColumnValues::Text(_) => ColumnValues::Text(vec![None; len]),
            ColumnValues::Number(_) => ColumnValues::Number(vec![None; len]),
            ColumnValues::Date(_) => ColumnValues::Date(vec![None; len]),
        }
    }

    /// Display form of a cell; None for nulls
    pub fn display(&self, row: usize) -> Option<String> {
        match self {
            ColumnValues::Text(v) => v.get(row).cloned().flatten(),
            ColumnValues::Number(v) => v.get(row).copied().flatten().map(|n| n.to_string()),
            ColumnValues::Date(v) => v
                .get(row)
                .copied()
                .flatten()
                .map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }

    fn into_text(self) -> ColumnValues {
        let len = self.len();
        let texts = (0..len).map(|i| self.display(i)).collect();
        ColumnValues::Text(texts)
    }

    fn append(&mut self, other: ColumnValues) -> Result<()> {
        match (self, other) {
            (ColumnValues::Text(a), ColumnValues::Text(b)) => a.extend(b),
            (ColumnValues::Number(a), ColumnValues::Number(b)) => a.extend(b),
            (ColumnValues::Date(a), ColumnValues::Date(b)) => a.extend(b),
            (a, b) => bail!("cannot append {} values to a {} column", b.kind_name(), a.kind_name()),
        }
        Ok(())
    }

    fn select(&self, rows: &[usize]) -> ColumnValues {
        match self {
            ColumnValues::Text(v) => ColumnValues::Text(rows.iter().map(|&i| v[i].clone()).collect()),
            ColumnValues::Number(v) => ColumnValues::Number(rows.iter().map(|&i| v[i]).collect()),
            ColumnValues::Date(v) => ColumnValues::Date(rows.iter().map(|&i| v[i]).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

// ============================================================================
// TABLE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    row_count: usize,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(row_count: usize) -> Self {
        Table {
            row_count,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Add a column; its length must match the table
    pub fn push_column(&mut self, name: impl Into<String>, values: ColumnValues) -> Result<()> {
        let name = name.into();
        if values.len() != self.row_count {
            bail!(
                "column '{}' has {} values, table has {} rows",
                name,
                values.len(),
                self.row_count
            );
        }
        if self.has_column(&name) {
            bail!("duplicate column '{}'", name);
        }
        self.columns.push(Column { name, values });
        Ok(())
    }

    pub fn text(&self, name: &str) -> Option<&[Option<String>]> {
        match &self.column(name)?.values {
            ColumnValues::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn numbers(&self, name: &str) -> Option<&[Option<f64>]> {
        match &self.column(name)?.values {
            ColumnValues::Number(v) => Some(v),
            _ => None,
        }
    }

    pub fn dates(&self, name: &str) -> Option<&[Option<NaiveDate>]> {
        match &self.column(name)?.values {
            ColumnValues::Date(v) => Some(v),
            _ => None,
        }
    }

    /// Sum of the non-null cells of a numeric column; None when the column is absent
    pub fn sum(&self, name: &str) -> Option<f64> {
        self.numbers(name)
            .map(|v| v.iter().flatten().sum())
    }

    /// Count of null cells in a column
    pub fn null_count(&self, name: &str) -> Option<usize> {
        let col = self.column(name)?;
        Some((0..self.row_count).filter(|&i| col.values.display(i).is_none()).count())
    }

    /// Display values of one row, in column order
    pub fn row(&self, row: usize) -> Vec<Option<String>> {
        self.columns.iter().map(|c| c.values.display(row)).collect()
    }

    /// New table with only the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Table {
        Table {
            row_count: rows.len(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: c.values.select(rows),
                })
                .collect(),
        }
    }

    /// Keep rows where `keep[i]` is true
    pub fn filter(&self, keep: &[bool]) -> Table {
        let rows: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter(|(_, k)| **k)
            .map(|(i, _)| i)
            .collect();
        self.select_rows(&rows)
    }

    /// Stack tables vertically. Columns are the union in first-seen order;
    /// a column missing from one table is null for its rows. A name used with
    /// different kinds across tables degrades to text.
    pub fn concat(tables: Vec<Table>) -> Result<Table> {
        // (name, empty column of the target kind)
        let mut layout: Vec<(String, ColumnValues)> = Vec::new();
        for t in &tables {
            for c in &t.columns {
                match layout.iter_mut().find(|(n, _)| *n == c.name) {
                    Some((_, target)) => {
                        if target.kind_name() != c.values.kind_name() {
                            *target = ColumnValues::Text(Vec::new());
                        }
                    }
                    None => layout.push((c.name.clone(), c.values.nulls_like(0))),
                }
            }
        }

        let total: usize = tables.iter().map(|t| t.row_count).sum();
        let mut out: Vec<ColumnValues> = layout.iter().map(|(_, t)| t.clone()).collect();

        for t in tables {
            let rows = t.row_count;
            let mut cols = t.columns;
            for ((name, target), acc) in layout.iter().zip(out.iter_mut()) {
                let part = match cols.iter().position(|c| &c.name == name) {
                    Some(pos) => cols.swap_remove(pos).values,
                    None => target.nulls_like(rows),
                };
                let part = if part.kind_name() != target.kind_name() {
                    part.into_text()
                } else {
                    part
                };
                acc.append(part)?;
            }
        }

        let mut table = Table::new(total);
        for ((name, _), values) in layout.into_iter().zip(out) {
            table.push_column(name, values)?;
        }
        Ok(table)
    }
}

// ============================================================================
// TESTS
// ============================================================================
