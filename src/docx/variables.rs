/// Substitution variables supplied to a fill operation.
///
/// The catalog is an ordered collection built by the caller; the engine
/// reads it but never modifies it. Variable kinds are a small closed set,
/// so they are modeled as an enum with exhaustive dispatch in each
/// replacer rather than an open trait hierarchy.
use image::DynamicImage;
use thiserror::Error;

/// Error raised when a table column is rejected at add time.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TableColumnError {
    /// Cells within one column must share a single placeholder token.
    #[error("mixed placeholder tokens in column: expected {expected:?}, found {found:?}")]
    MixedTokens { expected: String, found: String },
}

/// Value of one table cell: scalar text or a raster image.
#[derive(Clone)]
pub enum CellValue {
    Text(String),
    Image {
        image: DynamicImage,
        width_px: u32,
        height_px: u32,
    },
}

/// One table column: a placeholder token and its ordered cell values.
#[derive(Clone)]
pub struct Column {
    token: String,
    cells: Vec<CellValue>,
}

impl Column {
    /// The placeholder token shared by every cell in this column.
    #[inline]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The ordered cell values.
    #[inline]
    pub fn cells(&self) -> &[CellValue] {
        &self.cells
    }
}

/// Column-major table data keyed by one placeholder token per column.
///
/// A template table row contains one occurrence of each column's token
/// (typically one per cell). During expansion the template row is cloned
/// once per data row and each token is replaced with that row's value.
#[derive(Clone, Default)]
pub struct TableVariable {
    columns: Vec<Column>,
}

impl TableVariable {
    /// Create an empty table variable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column of `(token, value)` cells.
    ///
    /// An empty column is ignored silently. A column whose cells do not all
    /// share one token is rejected and leaves the table unchanged; other
    /// columns are unaffected.
    pub fn add_column(
        &mut self,
        cells: impl IntoIterator<Item = (String, CellValue)>,
    ) -> Result<(), TableColumnError> {
        let mut iter = cells.into_iter();
        let Some((token, first)) = iter.next() else {
            return Ok(());
        };
        let mut values = vec![first];
        for (cell_token, value) in iter {
            if cell_token != token {
                return Err(TableColumnError::MixedTokens {
                    expected: token,
                    found: cell_token,
                });
            }
            values.push(value);
        }
        self.columns.push(Column {
            token,
            cells: values,
        });
        Ok(())
    }

    /// Add a column of text cells sharing one token.
    pub fn add_text_column(
        &mut self,
        token: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) {
        let cells: Vec<CellValue> = values
            .into_iter()
            .map(|v| CellValue::Text(v.into()))
            .collect();
        if cells.is_empty() {
            return;
        }
        self.columns.push(Column {
            token: token.into(),
            cells,
        });
    }

    /// Build a table from row-oriented input.
    ///
    /// `keys` fixes the column order; each row map supplies one value per
    /// key, missing entries becoming empty strings.
    pub fn from_rows(
        keys: &[&str],
        rows: &[std::collections::HashMap<String, String>],
    ) -> Self {
        let mut table = Self::new();
        if keys.is_empty() || rows.is_empty() {
            return table;
        }
        for &key in keys {
            let cells: Vec<CellValue> = rows
                .iter()
                .map(|row| CellValue::Text(row.get(key).cloned().unwrap_or_default()))
                .collect();
            table.columns.push(Column {
                token: key.to_string(),
                cells,
            });
        }
        table
    }

    /// The columns, in declaration order.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Per-column placeholder tokens, in declaration order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.token.as_str())
    }

    /// Number of rows: first column's length, or 0 for an empty table.
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.cells.len())
    }

    /// Row count after length reconciliation.
    ///
    /// Returns the minimum column length plus a flag telling whether the
    /// columns disagreed (in which case rows beyond the minimum are
    /// dropped by the replacer).
    pub fn validated_row_count(&self) -> (usize, bool) {
        let Some(first) = self.columns.first() else {
            return (0, false);
        };
        let mut expected = first.cells.len();
        let mut mismatch = false;
        for column in &self.columns {
            if column.cells.len() != expected {
                mismatch = true;
                expected = expected.min(column.cells.len());
            }
        }
        (expected, mismatch)
    }
}

/// A single substitution variable.
#[derive(Clone)]
pub enum Variable {
    /// Scalar text replacement.
    Text { token: String, value: String },
    /// Inline raster image replacement, sized in pixels.
    Image {
        token: String,
        image: DynamicImage,
        width_px: u32,
        height_px: u32,
    },
    /// One paragraph per item, bullet-numbered.
    BulletList { token: String, items: Vec<String> },
    /// Template-row replication over column-major data.
    Table(TableVariable),
}

/// Ordered collection of variables for one fill operation.
///
/// No deduplication is performed; lookups resolve to the first variable
/// declaring a token.
#[derive(Clone, Default)]
pub struct Variables {
    vars: Vec<Variable>,
}

impl Variables {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a variable.
    pub fn add(&mut self, variable: Variable) {
        self.vars.push(variable);
    }

    /// Convenience: append a text variable.
    pub fn add_text(&mut self, token: impl Into<String>, value: impl Into<String>) {
        self.add(Variable::Text {
            token: token.into(),
            value: value.into(),
        });
    }

    /// Convenience: append an image variable.
    pub fn add_image(
        &mut self,
        token: impl Into<String>,
        image: DynamicImage,
        width_px: u32,
        height_px: u32,
    ) {
        self.add(Variable::Image {
            token: token.into(),
            image,
            width_px,
            height_px,
        });
    }

    /// Convenience: append a bullet-list variable.
    pub fn add_bullet_list(
        &mut self,
        token: impl Into<String>,
        items: impl IntoIterator<Item = impl Into<String>>,
    ) {
        self.add(Variable::BulletList {
            token: token.into(),
            items: items.into_iter().map(Into::into).collect(),
        });
    }

    /// Convenience: append a table variable.
    pub fn add_table(&mut self, table: TableVariable) {
        self.add(Variable::Table(table));
    }

    /// Iterate over the variables in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    /// Number of variables.
    #[inline]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check whether the catalog is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
