//! Column-named tabular data.
//!
//! A `DataFrame` is a row-major `ndarray` matrix with one name per column.
//! Missing values are represented as `NaN`; any non-finite value counts as
//! missing when rows are filtered.

use crate::domain::errors::ModelError;
use ndarray::{Array2, ArrayView1, Axis};

/// A single named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

impl Series {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl Default for DataFrame {
    fn default() -> Self {
        DataFrame::empty(Vec::new())
    }
}

impl DataFrame {
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self, ModelError> {
        if columns.len() != values.ncols() {
            return Err(ModelError::ShapeMismatch {
                context: "dataframe columns".to_string(),
                expected: columns.len(),
                actual: values.ncols(),
            });
        }
        Ok(Self { columns, values })
    }

    /// A frame with the given columns and no rows.
    pub fn empty(columns: Vec<String>) -> Self {
        let values = Array2::zeros((0, columns.len()));
        Self { columns, values }
    }

    /// Build a frame from `(name, values)` pairs. All columns must have the same length.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self, ModelError> {
        let nrows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != nrows) {
            return Err(ModelError::ShapeMismatch {
                context: format!("column '{}'", name),
                expected: nrows,
                actual: values.len(),
            });
        }

        let values = Array2::from_shape_fn((nrows, columns.len()), |(r, c)| columns[c].1[r]);
        let names = columns.into_iter().map(|(name, _)| name).collect();
        Self::new(names, values)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.nrows() == 0
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>, ModelError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| ModelError::MissingColumn(name.to_string()))?;
        Ok(self.values.column(idx))
    }

    /// Project onto `names`, in the order given.
    pub fn select(&self, names: &[String]) -> Result<DataFrame, ModelError> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| ModelError::MissingColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            columns: names.to_vec(),
            values: self.values.select(Axis(1), &indices),
        })
    }

    pub fn take_rows(&self, rows: &[usize]) -> DataFrame {
        Self {
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), rows),
        }
    }

    /// Rows `start..end`, clamped to the frame length.
    pub fn slice_rows(&self, start: usize, end: usize) -> DataFrame {
        let end = end.min(self.nrows());
        let start = start.min(end);
        let rows: Vec<usize> = (start..end).collect();
        self.take_rows(&rows)
    }

    /// Append `series`, or replace the column of the same name.
    pub fn with_column(&self, series: &Series) -> Result<DataFrame, ModelError> {
        if !self.columns.is_empty() && series.len() != self.nrows() {
            return Err(ModelError::ShapeMismatch {
                context: format!("column '{}'", series.name),
                expected: self.nrows(),
                actual: series.len(),
            });
        }

        if let Some(idx) = self.column_index(&series.name) {
            let mut frame = self.clone();
            for (cell, value) in frame.values.column_mut(idx).iter_mut().zip(&series.values) {
                *cell = *value;
            }
            return Ok(frame);
        }

        let nrows = series.len();
        let ncols = self.ncols();
        let values = Array2::from_shape_fn((nrows, ncols + 1), |(r, c)| {
            if c < ncols {
                self.values[[r, c]]
            } else {
                series.values[r]
            }
        });

        let mut columns = self.columns.clone();
        columns.push(series.name.clone());
        Self::new(columns, values)
    }

    pub fn row_is_finite(&self, row: usize) -> bool {
        self.values.row(row).iter().all(|v| v.is_finite())
    }

    /// Rows as owned vectors, the layout smartcore's `DenseMatrix::from_2d_vec` expects.
    pub fn to_row_vecs(&self) -> Vec<Vec<f64>> {
        self.values.outer_iter().map(|row| row.to_vec()).collect()
    }
}
