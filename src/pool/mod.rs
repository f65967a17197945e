//! Candidate pool.
//!
//! A [`CandidatePool`] is the read-only respondent list of one run. Each
//! [`Candidate`] carries its category values (used for stratification), an
//! optional address key (used for the same-household rule), and its original
//! table columns, which are passed through to the result untouched.
//!
//! Pools are usually built from a string table with
//! [`CandidateTable::into_pool`].

mod table;

pub use table::CandidateTable;

use crate::error::{Result, SelectionError};
use std::collections::{BTreeMap, HashMap};

/// One respondent.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Candidate {
    /// Unique identifier.
    pub id: String,

    /// Category name → value.
    pub features: BTreeMap<String, String>,

    /// Household key; candidates with equal keys share an address.
    pub address: Option<String>,

    /// Original non-id columns in table order, never interpreted.
    pub columns: Vec<(String, String)>,
}

impl Candidate {
    /// Creates a candidate with no features.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            features: BTreeMap::new(),
            address: None,
            columns: Vec::new(),
        }
    }

    /// Sets a category value.
    pub fn with_feature(mut self, category: impl Into<String>, value: impl Into<String>) -> Self {
        self.features.insert(category.into(), value.into());
        self
    }

    /// Sets the household key.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Appends an opaque column.
    pub fn with_column(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.columns.push((name.into(), value.into()));
        self
    }

    /// Value of `category`, if the candidate has one.
    pub fn feature(&self, category: &str) -> Option<&str> {
        self.features.get(category).map(String::as_str)
    }
}

/// The candidates of one run, indexed by position.
///
/// Positions are stable for the lifetime of the pool and are what every
/// algorithm works with; ids appear only at the edges.
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    candidates: Vec<Candidate>,
    index: HashMap<String, usize>,
}

impl CandidatePool {
    /// Creates a pool, rejecting empty or duplicate ids.
    pub fn new(candidates: Vec<Candidate>) -> Result<Self> {
        let mut index = HashMap::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            if candidate.id.trim().is_empty() {
                return Err(SelectionError::Validation(format!(
                    "candidate at position {i} has an empty id"
                )));
            }
            if index.insert(candidate.id.clone(), i).is_some() {
                return Err(SelectionError::Validation(format!(
                    "duplicate candidate id '{}'",
                    candidate.id
                )));
            }
        }
        Ok(Self { candidates, index })
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidate at `position`.
    pub fn get(&self, position: usize) -> Option<&Candidate> {
        self.candidates.get(position)
    }

    /// Position of the candidate with `id`.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Iterates candidates in position order.
    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }

    /// All candidates as a slice.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Groups of two or more candidates sharing an address key.
    ///
    /// Groups are in order of first appearance; members in position order.
    pub fn households(&self) -> Vec<Vec<usize>> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, candidate) in self.candidates.iter().enumerate() {
            if let Some(address) = candidate.address.as_deref() {
                let members = groups.entry(address).or_default();
                if members.is_empty() {
                    order.push(address);
                }
                members.push(i);
            }
        }
        order
            .into_iter()
            .filter_map(|address| groups.remove(address))
            .filter(|members| members.len() > 1)
            .collect()
    }
}

impl<'a> IntoIterator for &'a CandidatePool {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_builder() {
        let c = Candidate::new("a1")
            .with_feature("gender", "F")
            .with_address("1 Main St")
            .with_column("email", "a@x.org");
        assert_eq!(c.feature("gender"), Some("F"));
        assert_eq!(c.feature("age"), None);
        assert_eq!(c.address.as_deref(), Some("1 Main St"));
        assert_eq!(c.columns, vec![("email".to_string(), "a@x.org".to_string())]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = CandidatePool::new(vec![Candidate::new("a"), Candidate::new("a")]).unwrap_err();
        assert!(matches!(err, SelectionError::Validation(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(CandidatePool::new(vec![Candidate::new(" ")]).is_err());
    }

    #[test]
    fn test_index_of() {
        let pool = CandidatePool::new(vec![Candidate::new("a"), Candidate::new("b")]).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.index_of("b"), Some(1));
        assert_eq!(pool.index_of("z"), None);
        assert_eq!(pool.get(0).map(|c| c.id.as_str()), Some("a"));
    }

    #[test]
    fn test_households() {
        let pool = CandidatePool::new(vec![
            Candidate::new("a").with_address("x"),
            Candidate::new("b").with_address("y"),
            Candidate::new("c").with_address("x"),
            Candidate::new("d"),
            Candidate::new("e").with_address("y"),
            Candidate::new("f").with_address("z"),
        ])
        .unwrap();
        assert_eq!(pool.households(), vec![vec![0, 2], vec![1, 4]]);
    }
}
