use std::fmt;

use serde::{Deserialize, Serialize};
use snowpoll_core::to_column_name;

/// A single result cell. `None` represents SQL NULL.
pub type Cell = Option<String>;

/// Tabular result of a finished query.
///
/// Column ordering in each row matches the `columns` vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    /// Column names in result-set order.
    pub columns: Vec<String>,
    /// Row data. Each inner vector has the same length as `columns`.
    pub rows: Vec<Vec<Cell>>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }

    /// Returns the number of data rows in the result set.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the result set contains no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Finds the zero-based index of a column by name.
    ///
    /// Snowflake upper-cases unquoted identifiers, so an exact match is tried
    /// first and an ASCII case-insensitive one second.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    /// Retrieves the value at the given row index and column name.
    ///
    /// Returns `None` if the row index is out of bounds, the column name
    /// does not exist, or the cell value is SQL NULL.
    pub fn get_value(&self, row: usize, col: &str) -> Option<&str> {
        let col_idx = self.column_index(col)?;
        let row_data = self.rows.get(row)?;
        row_data.get(col_idx)?.as_deref()
    }

    /// Column names converted with [`to_column_name`].
    pub fn sanitized_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| to_column_name(c)).collect()
    }

    /// Flatten into a list whose first row holds the column names and whose
    /// remaining rows are the data rows.
    pub fn into_rows_with_header(self) -> Vec<Vec<Cell>> {
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        out.push(self.columns.into_iter().map(Some).collect());
        out.extend(self.rows);
        out
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "(empty result set)");
        }

        // Compute column widths (minimum = header length).
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    let cell_len = cell.as_deref().unwrap_or("NULL").chars().count();
                    if cell_len > widths[i] {
                        widths[i] = cell_len;
                    }
                }
            }
        }

        // Header row.
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{:<width$}", col, width = widths[i])?;
        }
        writeln!(f)?;

        // Separator.
        for (i, w) in widths.iter().enumerate() {
            if i > 0 {
                write!(f, "-+-")?;
            }
            write!(f, "{}", "-".repeat(*w))?;
        }
        writeln!(f)?;

        // Data rows.
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate().take(widths.len()) {
                if i > 0 {
                    write!(f, " | ")?;
                }
                let value = cell.as_deref().unwrap_or("NULL");
                write!(f, "{:<width$}", value, width = widths[i])?;
            }
            writeln!(f)?;
        }

        writeln!(f)?;
        write!(
            f,
            "{} row{}",
            self.rows.len(),
            if self.rows.len() == 1 { "" } else { "s" }
        )
    }
}
