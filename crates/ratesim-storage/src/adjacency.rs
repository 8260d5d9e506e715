//! Sparse adjacency input in list-of-lists (LIL) form
//!
//! For every post-synaptic (row) rank with at least one connection, the list
//! of pre-synaptic (column) ranks it receives from. This is the only
//! supported way of declaring connectivity.

use crate::{
    error::{Result, StorageError},
    index::MatrixIndex,
};

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Connectivity declared as `post_ranks[i] <- pre_ranks[i]`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Adjacency<IT = u32> {
    /// Global row ranks, one per dendrite
    pub post_ranks: Vec<IT>,
    /// Global column ranks feeding each dendrite
    pub pre_ranks: Vec<Vec<IT>>,
}

impl<IT: MatrixIndex> Adjacency<IT> {
    /// Create an adjacency input, checking that both sequences line up
    pub fn new(post_ranks: Vec<IT>, pre_ranks: Vec<Vec<IT>>) -> Result<Self> {
        let adjacency = Self {
            post_ranks,
            pre_ranks,
        };
        adjacency.validate()?;
        Ok(adjacency)
    }

    /// Group `(post, pre)` pairs by post rank. Rows come out sorted by rank,
    /// pre ranks keep their input order.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (IT, IT)>,
    {
        let mut rows: BTreeMap<IT, Vec<IT>> = BTreeMap::new();
        for (post, pre) in pairs {
            rows.entry(post).or_default().push(pre);
        }

        let (post_ranks, pre_ranks) = rows.into_iter().unzip();
        Self {
            post_ranks,
            pre_ranks,
        }
    }

    /// Check the structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.post_ranks.len() != self.pre_ranks.len() {
            return Err(StorageError::length_mismatch(
                "pre_ranks",
                self.post_ranks.len(),
                self.pre_ranks.len(),
            ));
        }
        if IT::from_usize(self.post_ranks.len()).is_none() {
            return Err(StorageError::index_overflow(
                "number of post ranks",
                self.post_ranks.len() as u128,
                IT::WIDTH,
            ));
        }
        Ok(())
    }

    /// Number of dendrites (rows with at least one connection)
    pub fn len(&self) -> usize {
        self.post_ranks.len()
    }

    /// Whether no dendrite is declared
    pub fn is_empty(&self) -> bool {
        self.post_ranks.is_empty()
    }

    /// Total number of declared `(post, pre)` pairs
    pub fn nb_synapses(&self) -> usize {
        self.pre_ranks.iter().map(Vec::len).sum()
    }

    /// Iterate dendrites as `(post_rank, pre_ranks)`
    pub fn dendrites(&self) -> impl Iterator<Item = (IT, &[IT])> + '_ {
        self.post_ranks
            .iter()
            .copied()
            .zip(self.pre_ranks.iter().map(Vec::as_slice))
    }

    /// Iterate all `(post_rank, pre_rank)` pairs
    pub fn pairs(&self) -> impl Iterator<Item = (IT, IT)> + '_ {
        self.dendrites()
            .flat_map(|(post, pres)| pres.iter().map(move |&pre| (post, pre)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_lengths() {
        let err = Adjacency::<u32>::new(vec![0, 1], vec![vec![0]]).unwrap_err();
        assert!(matches!(err, StorageError::LengthMismatch { expected: 2, found: 1, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_post_count_must_fit_index_type() {
        let post: Vec<u8> = (0..=255u8).chain(std::iter::once(0)).collect();
        let pre = vec![Vec::new(); post.len()];
        let err = Adjacency::<u8>::new(post, pre).unwrap_err();
        assert!(matches!(err, StorageError::IndexOverflow { width: "u8", .. }));
    }

    #[test]
    fn test_from_pairs_groups_rows() {
        let adj = Adjacency::<u32>::from_pairs([(5, 1), (2, 0), (2, 3)]);
        assert_eq!(adj.post_ranks, vec![2, 5]);
        assert_eq!(adj.pre_ranks, vec![vec![0, 3], vec![1]]);
        assert_eq!(adj.nb_synapses(), 3);
        assert_eq!(adj.pairs().collect::<Vec<_>>(), vec![(2, 0), (2, 3), (5, 1)]);
    }
}
