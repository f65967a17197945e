//! Category-value quota targets.
//!
//! A [`QuotaTable`] lists, for every value of every stratification category,
//! how many panel members must have that value: an exact `[min, max]` range
//! and a looser `[min_flex, max_flex]` range used only if the exact quotas
//! cannot be met.

use crate::error::{Result, SelectionError};
use std::collections::HashSet;

/// Which pair of bounds a constraint set uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BoundKind {
    /// `[min, max]`.
    #[default]
    Exact,
    /// `[min_flex, max_flex]`.
    Flex,
}

/// Target range for one `(category, value)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QuotaTarget {
    /// Category name, e.g. `"gender"`.
    pub category: String,
    /// Category value, e.g. `"female"`.
    pub value: String,
    /// Minimum number of panel members with this value.
    pub min: usize,
    /// Maximum number of panel members with this value.
    pub max: usize,
    /// Relaxed minimum, `<= min`.
    pub min_flex: usize,
    /// Relaxed maximum, `>= max`.
    pub max_flex: usize,
}

impl QuotaTarget {
    /// Creates a target whose flex bounds equal its exact bounds.
    pub fn new(
        category: impl Into<String>,
        value: impl Into<String>,
        min: usize,
        max: usize,
    ) -> Self {
        Self {
            category: category.into(),
            value: value.into(),
            min,
            max,
            min_flex: min,
            max_flex: max,
        }
    }

    /// Sets the relaxed bounds.
    pub fn with_flex(mut self, min_flex: usize, max_flex: usize) -> Self {
        self.min_flex = min_flex;
        self.max_flex = max_flex;
        self
    }

    /// Whether the flex range is wider than the exact one.
    pub fn has_flex(&self) -> bool {
        self.min_flex < self.min || self.max_flex > self.max
    }

    /// `(lower, upper)` for the given bound kind.
    pub fn bounds(&self, kind: BoundKind) -> (usize, usize) {
        match kind {
            BoundKind::Exact => (self.min, self.max),
            BoundKind::Flex => (self.min_flex, self.max_flex),
        }
    }

    /// Checks `min <= max`, `min_flex <= min` and `max_flex >= max`.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.category.is_empty() || self.value.is_empty() {
            return Err("category and value must not be empty".into());
        }
        if self.min > self.max {
            return Err(format!(
                "{}:{} has min {} above max {}",
                self.category, self.value, self.min, self.max
            ));
        }
        if self.min_flex > self.min || self.max_flex < self.max {
            return Err(format!(
                "{}:{} flex bounds [{}, {}] must lie outside [{}, {}]",
                self.category, self.value, self.min_flex, self.max_flex, self.min, self.max
            ));
        }
        Ok(())
    }
}

/// All targets of one selection, one row per `(category, value)`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QuotaTable {
    targets: Vec<QuotaTarget>,
}

impl QuotaTable {
    /// Creates a table, validating every target and rejecting duplicates.
    pub fn new(targets: Vec<QuotaTarget>) -> Result<Self> {
        let mut seen = HashSet::new();
        for target in &targets {
            target.validate().map_err(SelectionError::Validation)?;
            if !seen.insert((target.category.as_str(), target.value.as_str())) {
                return Err(SelectionError::Validation(format!(
                    "duplicate target row for {}:{}",
                    target.category, target.value
                )));
            }
        }
        Ok(Self { targets })
    }

    /// Parses a string table with columns `category, name, min, max` and,
    /// optionally, both of `min_flex, max_flex`.
    ///
    /// Rows with a blank category are skipped. Category and value cells are
    /// trimmed.
    pub fn from_rows(header: &[String], rows: &[Vec<String>]) -> Result<Self> {
        let column = |name: &str| -> Result<Option<usize>> {
            let positions: Vec<usize> = header
                .iter()
                .enumerate()
                .filter(|(_, h)| h.trim() == name)
                .map(|(i, _)| i)
                .collect();
            match positions.as_slice() {
                [] => Ok(None),
                [pos] => Ok(Some(*pos)),
                _ => Err(SelectionError::Validation(format!(
                    "found more than one column named '{name}' in the targets"
                ))),
            }
        };
        let required = |name: &str| -> Result<usize> {
            column(name)?.ok_or_else(|| {
                SelectionError::Validation(format!(
                    "did not find required column '{name}' in the targets"
                ))
            })
        };

        let category_pos = required("category")?;
        let name_pos = required("name")?;
        let min_pos = required("min")?;
        let max_pos = required("max")?;
        let flex_pos = match (column("min_flex")?, column("max_flex")?) {
            (Some(lo), Some(hi)) => Some((lo, hi)),
            _ => None,
        };

        let mut targets = Vec::new();
        for row in rows {
            let cell = |pos: usize| row.get(pos).map(|s| s.trim()).unwrap_or("");
            let category = cell(category_pos);
            if category.is_empty() {
                continue;
            }
            let value = cell(name_pos);
            let parse = |pos: usize, what: &str| -> Result<usize> {
                let raw = cell(pos);
                if raw.is_empty() {
                    return Err(SelectionError::Validation(format!(
                        "blank {what} cell in a row of category '{category}'"
                    )));
                }
                raw.parse().map_err(|_| {
                    SelectionError::Validation(format!(
                        "{what} '{raw}' of {category}:{value} is not a non-negative integer"
                    ))
                })
            };
            if value.is_empty() {
                return Err(SelectionError::Validation(format!(
                    "blank name cell in a row of category '{category}'"
                )));
            }
            let mut target =
                QuotaTarget::new(category, value, parse(min_pos, "min")?, parse(max_pos, "max")?);
            if let Some((lo, hi)) = flex_pos {
                target = target.with_flex(parse(lo, "min_flex")?, parse(hi, "max_flex")?);
            }
            targets.push(target);
        }
        Self::new(targets)
    }

    /// All targets in table order.
    pub fn targets(&self) -> &[QuotaTarget] {
        &self.targets
    }

    /// Category names in order of first appearance.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.targets
            .iter()
            .map(|t| t.category.as_str())
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// Targets of one category.
    pub fn values_of<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a QuotaTarget> + 'a {
        self.targets.iter().filter(move |t| t.category == category)
    }

    /// Whether any target can be relaxed.
    pub fn has_flex(&self) -> bool {
        self.targets.iter().any(QuotaTarget::has_flex)
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_target_validation() {
        assert!(QuotaTarget::new("g", "M", 2, 3).validate().is_ok());
        assert!(QuotaTarget::new("g", "M", 4, 3).validate().is_err());
        assert!(QuotaTarget::new("g", "M", 2, 3).with_flex(3, 3).validate().is_err());
        assert!(QuotaTarget::new("g", "M", 2, 3).with_flex(1, 2).validate().is_err());
        assert!(QuotaTarget::new("g", "M", 2, 3).with_flex(0, 5).validate().is_ok());
    }

    #[test]
    fn test_bounds() {
        let t = QuotaTarget::new("g", "M", 2, 3).with_flex(1, 4);
        assert_eq!(t.bounds(BoundKind::Exact), (2, 3));
        assert_eq!(t.bounds(BoundKind::Flex), (1, 4));
        assert!(t.has_flex());
        assert!(!QuotaTarget::new("g", "M", 2, 3).has_flex());
    }

    #[test]
    fn test_duplicate_rows_rejected() {
        let err = QuotaTable::new(vec![
            QuotaTarget::new("g", "M", 1, 2),
            QuotaTarget::new("g", "M", 1, 2),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_from_rows_with_flex() {
        let header = strings(&["category", "name", "min", "max", "min_flex", "max_flex"]);
        let rows = vec![
            strings(&[" gender ", "M", "2", "3", "1", "4"]),
            strings(&["", "", "", "", "", ""]),
            strings(&["gender", " F", "2", "3", "2", "3"]),
            strings(&["age", "young", "0", "5", "0", "5"]),
        ];
        let table = QuotaTable::from_rows(&header, &rows).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.categories(), vec!["gender", "age"]);
        assert_eq!(table.targets()[1].value, "F");
        assert_eq!(table.targets()[0].bounds(BoundKind::Flex), (1, 4));
        assert!(table.has_flex());
        assert_eq!(table.values_of("gender").count(), 2);
    }

    #[test]
    fn test_from_rows_without_flex() {
        let header = strings(&["category", "name", "min", "max"]);
        let rows = vec![strings(&["gender", "M", "2", "3"])];
        let table = QuotaTable::from_rows(&header, &rows).unwrap();
        assert!(!table.has_flex());
        assert_eq!(table.targets()[0].bounds(BoundKind::Flex), (2, 3));
    }

    #[test]
    fn test_from_rows_errors() {
        let header = strings(&["category", "name", "min", "max"]);
        assert!(QuotaTable::from_rows(&header, &[strings(&["g", "M", "", "3"])]).is_err());
        assert!(QuotaTable::from_rows(&header, &[strings(&["g", "M", "-1", "3"])]).is_err());
        assert!(QuotaTable::from_rows(&header, &[strings(&["g", "", "1", "3"])]).is_err());
        assert!(QuotaTable::from_rows(&strings(&["category", "name", "min"]), &[]).is_err());
    }
}
