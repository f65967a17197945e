//! String-table ingestion for candidate pools.

use super::{Candidate, CandidatePool};
use crate::error::{Result, SelectionError};
use tracing::warn;

/// Address columns are joined with this separator into one household key.
const ADDRESS_SEPARATOR: &str = "\u{1f}";

/// A raw respondent table: a header row and string rows.
///
/// This is the shape handed over by CSV or spreadsheet adapters.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CandidateTable {
    /// Column names.
    pub header: Vec<String>,
    /// Rows, each as long as `header`.
    pub rows: Vec<Vec<String>>,
}

impl CandidateTable {
    /// Creates a table from anything string-like.
    pub fn new<H, R, S>(header: H, rows: R) -> Self
    where
        H: IntoIterator<Item = S>,
        R: IntoIterator<Item = Vec<S>>,
        S: Into<String>,
    {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// Builds a [`CandidatePool`].
    ///
    /// `categories` are read (trimmed) into [`Candidate::features`]; the
    /// `address_columns` values are joined into [`Candidate::address`] when at
    /// least one of them is non-blank, so people with no address never share
    /// a household. Every non-id column is kept verbatim in
    /// [`Candidate::columns`]. Rows with a blank id are skipped; a warning for
    /// each is returned alongside the pool.
    ///
    /// # Errors
    ///
    /// [`SelectionError::Validation`] if a named column is missing or appears
    /// more than once, if a row has the wrong length, or if ids repeat.
    pub fn into_pool(
        &self,
        id_column: &str,
        categories: &[String],
        address_columns: &[String],
    ) -> Result<(CandidatePool, Vec<String>)> {
        let id_pos = self.column(id_column, "unique id")?;
        let category_pos = categories
            .iter()
            .map(|c| self.column(c, "category"))
            .collect::<Result<Vec<_>>>()?;
        let address_pos = address_columns
            .iter()
            .map(|c| self.column(c, "same address"))
            .collect::<Result<Vec<_>>>()?;

        let mut warnings = Vec::new();
        let mut candidates = Vec::with_capacity(self.rows.len());
        for (line, row) in self.rows.iter().enumerate() {
            if row.len() != self.header.len() {
                return Err(SelectionError::Validation(format!(
                    "row {} has {} cells, header has {}",
                    line + 1,
                    row.len(),
                    self.header.len()
                )));
            }
            let id = row[id_pos].trim();
            if id.is_empty() {
                let msg = format!(
                    "blank cell found in id column on row {}; skipped that row",
                    line + 1
                );
                warn!("{msg}");
                warnings.push(msg);
                continue;
            }

            let mut candidate = Candidate::new(id);
            for (category, &pos) in categories.iter().zip(&category_pos) {
                candidate
                    .features
                    .insert(category.clone(), row[pos].trim().to_string());
            }
            let key: Vec<&str> = address_pos.iter().map(|&p| row[p].trim()).collect();
            if key.iter().any(|part| !part.is_empty()) {
                candidate.address = Some(key.join(ADDRESS_SEPARATOR));
            }
            candidate.columns = self
                .header
                .iter()
                .zip(row)
                .enumerate()
                .filter(|&(pos, _)| pos != id_pos)
                .map(|(_, (name, value))| (name.clone(), value.clone()))
                .collect();
            candidates.push(candidate);
        }

        Ok((CandidatePool::new(candidates)?, warnings))
    }

    fn column(&self, name: &str, role: &str) -> Result<usize> {
        let mut found = self
            .header
            .iter()
            .enumerate()
            .filter(|(_, h)| h.trim() == name);
        match (found.next(), found.next()) {
            (Some((pos, _)), None) => Ok(pos),
            (None, _) => Err(SelectionError::Validation(format!(
                "no '{name}' column ({role}) found in people data"
            ))),
            (Some(_), Some(_)) => Err(SelectionError::Validation(format!(
                "more than one '{name}' column ({role}) found in people data"
            ))),
        }
    }
}
