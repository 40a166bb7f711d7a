// 📈 Time-Indexed Table - one attribute over the shared time axis
// Rows follow the network snapshots, one column per entity

use crate::error::ReductionError;
use std::collections::BTreeMap;

/// Values of one attribute over time, keyed by entity identifier.
///
/// `None` marks a missing observation. Every column has exactly `len` rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    len: usize,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl TimeSeries {
    pub fn new(len: usize) -> Self {
        TimeSeries {
            len,
            columns: BTreeMap::new(),
        }
    }

    /// Number of time steps
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the series has no entity columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.columns.contains_key(entity)
    }

    pub fn column(&self, entity: &str) -> Option<&[Option<f64>]> {
        self.columns.get(entity).map(|c| c.as_slice())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn insert(
        &mut self,
        entity: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), ReductionError> {
        let entity = entity.into();
        if values.len() != self.len {
            return Err(ReductionError::SeriesLength {
                entity,
                expected: self.len,
                found: values.len(),
            });
        }
        self.columns.insert(entity, values);
        Ok(())
    }

    pub fn remove(&mut self, entity: &str) -> Option<Vec<Option<f64>>> {
        self.columns.remove(entity)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.columns.retain(|k, _| keep(k));
    }

    /// Apply `f` to every present value
    pub fn map_values(&mut self, f: impl Fn(f64) -> f64) {
        for column in self.columns.values_mut() {
            for value in column.iter_mut().flatten() {
                *value = f(*value);
            }
        }
    }

    /// Per-step sum across all columns, skipping missing values
    pub fn row_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.len];
        for column in self.columns.values() {
            for (sum, value) in sums.iter_mut().zip(column) {
                if let Some(v) = value {
                    *sum += v;
                }
            }
        }
        sums
    }

    /// Keep rows in `start..end`
    pub fn slice(&mut self, start: usize, end: usize) {
        for column in self.columns.values_mut() {
            *column = column[start..end].to_vec();
        }
        self.len = end - start;
    }

    /// Replace all columns with already-reduced ones of a new length
    pub(crate) fn replace_all(&mut self, len: usize, columns: BTreeMap<String, Vec<Option<f64>>>) {
        self.len = len;
        self.columns = columns;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_rejects_wrong_length() {
        let mut series = TimeSeries::new(3);
        assert!(series.insert("g1", vec![Some(1.0), None, Some(2.0)]).is_ok());
        let err = series.insert("g2", vec![Some(1.0)]).unwrap_err();
        assert!(matches!(err, ReductionError::SeriesLength { expected: 3, found: 1, .. }));
    }

    #[test]
    fn test_row_sums_skip_missing() {
        let mut series = TimeSeries::new(2);
        series.insert("a", vec![Some(1.0), None]).unwrap();
        series.insert("b", vec![Some(2.0), Some(5.0)]).unwrap();
        assert_eq!(series.row_sums(), vec![3.0, 5.0]);
    }

    #[test]
    fn test_slice() {
        let mut series = TimeSeries::new(4);
        series
            .insert("a", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)])
            .unwrap();
        series.slice(1, 3);
        assert_eq!(series.len(), 2);
        assert_eq!(series.column("a").unwrap(), &[Some(2.0), Some(3.0)]);
    }
}
