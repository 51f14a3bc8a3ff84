// src/domain/model/window.rs
use crate::domain::errors::{SignalError, SignalResult};
use crate::domain::model::bar::Bar;
use chrono::{DateTime, Utc};

/// Per-bar derived series stored next to the bars of a window.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Indicator values; `None` marks a bar without a value (e.g. warm-up).
    Numeric(Vec<Option<f64>>),
    /// Event flags such as `buy_signal`.
    Flag(Vec<bool>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Flag(flags) => flags.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_blank(&mut self, index: usize) {
        match self {
            Column::Numeric(values) => values.insert(index, None),
            Column::Flag(flags) => flags.insert(index, false),
        }
    }

    fn drain_front(&mut self, count: usize) {
        match self {
            Column::Numeric(values) => {
                values.drain(..count);
            }
            Column::Flag(flags) => {
                flags.drain(..count);
            }
        }
    }
}

/// What happened to the window when a bar was merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Appended,
    Replaced(usize),
    Inserted(usize),
}

/// Ascending, timestamp-unique bar sequence with named derived columns.
///
/// Every column always has exactly one entry per bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarWindow {
    bars: Vec<Bar>,
    columns: Vec<(String, Column)>,
}

/// Lowercase with spaces, underscores and hyphens removed, so that
/// `"RSI 14"`, `"rsi_14"` and `"Rsi-14"` all compare equal.
pub fn normalize_column_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

impl BarWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a window from bars in any order; a later duplicate timestamp
    /// replaces an earlier one.
    pub fn from_bars(bars: impl IntoIterator<Item = Bar>) -> Self {
        let mut window = Self::new();
        for bar in bars {
            window.upsert(bar);
        }
        window
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn bar(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|b| b.timestamp)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// Merge a bar: replace in place on an existing timestamp, otherwise
    /// insert at its ordered position.
    ///
    /// A replaced bar keeps its event flags but loses its numeric values,
    /// which no longer describe the revised bar.
    pub fn upsert(&mut self, bar: Bar) -> Upsert {
        match self.bars.binary_search_by(|b| b.timestamp.cmp(&bar.timestamp)) {
            Ok(index) => {
                self.bars[index] = bar;
                for (_, column) in &mut self.columns {
                    if let Column::Numeric(values) = column {
                        values[index] = None;
                    }
                }
                Upsert::Replaced(index)
            }
            Err(index) => {
                let appended = index == self.bars.len();
                self.bars.insert(index, bar);
                for (_, column) in &mut self.columns {
                    column.insert_blank(index);
                }
                if appended {
                    Upsert::Appended
                } else {
                    Upsert::Inserted(index)
                }
            }
        }
    }

    /// Keep only the most recent `keep` bars. Returns how many were dropped.
    pub fn retain_latest(&mut self, keep: usize) -> usize {
        let excess = self.bars.len().saturating_sub(keep);
        if excess > 0 {
            self.bars.drain(..excess);
            for (_, column) in &mut self.columns {
                column.drain_front(excess);
            }
        }
        excess
    }

    /// A bars-only copy of the last `count` bars.
    pub fn tail(&self, count: usize) -> BarWindow {
        let start = self.bars.len().saturating_sub(count);
        BarWindow {
            bars: self.bars[start..].to_vec(),
            columns: Vec::new(),
        }
    }

    /// A copy of the bars without any derived columns.
    pub fn bars_only(&self) -> BarWindow {
        self.tail(self.bars.len())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, column)| column)
    }

    fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, column)| column)
    }

    /// Find a numeric column by exact name, falling back to a normalized
    /// (case, space and underscore insensitive) match.
    pub fn find_numeric_column(&self, name: &str) -> Option<&str> {
        let numeric = |c: &&(String, Column)| matches!(c.1, Column::Numeric(_));
        if let Some((found, _)) = self.columns.iter().filter(numeric).find(|(n, _)| n == name) {
            return Some(found.as_str());
        }
        let wanted = normalize_column_name(name);
        self.columns
            .iter()
            .filter(numeric)
            .find(|(n, _)| normalize_column_name(n) == wanted)
            .map(|(n, _)| n.as_str())
    }

    pub fn numeric(&self, name: &str) -> SignalResult<&[Option<f64>]> {
        match self.column(name) {
            Some(Column::Numeric(values)) => Ok(values),
            Some(Column::Flag(_)) => Err(SignalError::malformed(name, "expected numeric values")),
            None => Err(SignalError::malformed(name, "column is missing")),
        }
    }

    pub fn flags(&self, name: &str) -> SignalResult<&[bool]> {
        match self.column(name) {
            Some(Column::Flag(flags)) if flags.len() == self.bars.len() => Ok(flags),
            Some(Column::Flag(flags)) => Err(SignalError::malformed(
                name,
                format!("has {} entries for {} bars", flags.len(), self.bars.len()),
            )),
            Some(Column::Numeric(_)) => Err(SignalError::malformed(name, "expected boolean flags")),
            None => Err(SignalError::malformed(name, "column is missing")),
        }
    }

    /// Insert or overwrite a numeric column.
    pub fn set_numeric_column(&mut self, name: &str, values: Vec<Option<f64>>) -> SignalResult<()> {
        self.set_column(name, Column::Numeric(values))
    }

    /// Insert or overwrite a flag column.
    pub fn set_flag_column(&mut self, name: &str, flags: Vec<bool>) -> SignalResult<()> {
        self.set_column(name, Column::Flag(flags))
    }

    fn set_column(&mut self, name: &str, column: Column) -> SignalResult<()> {
        if column.len() != self.bars.len() {
            return Err(SignalError::malformed(
                name,
                format!("has {} entries for {} bars", column.len(), self.bars.len()),
            ));
        }
        match self.column_mut(name) {
            Some(existing) => *existing = column,
            None => self.columns.push((name.to_string(), column)),
        }
        Ok(())
    }

    /// Mutable access to a flag column, creating it all-false when absent.
    pub fn ensure_flag_column(&mut self, name: &str) -> SignalResult<&mut Vec<bool>> {
        if !self.has_column(name) {
            let blank = vec![false; self.bars.len()];
            self.columns.push((name.to_string(), Column::Flag(blank)));
        }
        match self.column_mut(name) {
            Some(Column::Flag(flags)) => Ok(flags),
            _ => Err(SignalError::malformed(name, "expected boolean flags")),
        }
    }

    /// Mutable access to a numeric column, creating it all-missing when absent.
    pub fn ensure_numeric_column(&mut self, name: &str) -> SignalResult<&mut Vec<Option<f64>>> {
        if !self.has_column(name) {
            let blank = vec![None; self.bars.len()];
            self.columns.push((name.to_string(), Column::Numeric(blank)));
        }
        match self.column_mut(name) {
            Some(Column::Numeric(values)) => Ok(values),
            _ => Err(SignalError::malformed(name, "expected numeric values")),
        }
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let index = self.columns.iter().position(|(n, _)| n == name)?;
        Some(self.columns.remove(index).1)
    }
}
