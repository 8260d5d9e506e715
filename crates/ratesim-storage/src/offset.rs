//! Offset-addressed dense connectivity
//!
//! Maps the local index ranges `[0, num_rows)` and `[0, num_columns)` of a
//! [`DenseMatrix`] onto windows of global neuron ranks, so one matrix can
//! cover a slice of a partitioned population.

use crate::{
    adjacency::Adjacency,
    dense::{DenseMatrix, Layout, LineScan},
    error::{Result, StorageError},
    index::{MaskValue, MatrixIndex},
    memory::MemoryBudget,
};

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Half-open window `[low, high)` of global ranks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RankWindow<IT> {
    /// First rank in the window
    pub low: IT,
    /// One past the last rank in the window
    pub high: IT,
}

impl<IT: MatrixIndex> RankWindow<IT> {
    /// Create a window, rejecting `high < low`
    pub fn new(low: IT, high: IT, axis: &'static str) -> Result<Self> {
        if high < low {
            return Err(StorageError::InvalidRankWindow {
                axis,
                low: low.to_u64(),
                high: high.to_u64(),
            });
        }
        Ok(Self { low, high })
    }

    /// Window `[0, len)`
    pub fn from_len(len: IT) -> Self {
        Self {
            low: IT::ZERO,
            high: len,
        }
    }

    /// Number of ranks in the window
    pub fn len(&self) -> IT {
        // high >= low is guaranteed by construction
        IT::from_u128((self.high.to_u64() - self.low.to_u64()) as u128).unwrap_or(IT::ZERO)
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.low == self.high
    }

    /// Whether `rank` lies in the window
    pub fn contains(&self, rank: IT) -> bool {
        rank >= self.low && rank < self.high
    }

    /// Local index of a global rank
    pub fn to_local(&self, rank: IT, axis: &'static str) -> Result<IT> {
        if !self.contains(rank) {
            return Err(StorageError::RankOutOfWindow {
                axis,
                rank: rank.to_u64(),
                low: self.low.to_u64(),
                high: self.high.to_u64(),
            });
        }
        IT::from_u128((rank.to_u64() - self.low.to_u64()) as u128)
            .ok_or_else(|| StorageError::index_overflow("local index", rank.to_u64() as u128, IT::WIDTH))
    }

    /// Global rank of a local index
    pub fn to_global(&self, local: IT) -> Result<IT> {
        let rank = local.to_u64() as u128 + self.low.to_u64() as u128;
        IT::from_u128(rank).ok_or_else(|| StorageError::index_overflow("global rank", rank, IT::WIDTH))
    }
}

/// Dense matrix addressed by global row and column rank windows
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetMatrix<IT = u32, ST = u64, MT = u8>
where
    IT: MatrixIndex,
    ST: MatrixIndex,
    MT: MaskValue,
{
    rows: RankWindow<IT>,
    columns: RankWindow<IT>,
    dense: DenseMatrix<IT, ST, MT>,
}

impl<IT, ST, MT> OffsetMatrix<IT, ST, MT>
where
    IT: MatrixIndex,
    ST: MatrixIndex,
    MT: MaskValue,
{
    /// Create an unallocated matrix covering the given rank windows
    ///
    /// `num_rows = high_row_rank - low_row_rank`, columns likewise. Inverted
    /// windows and a cell count that does not fit `ST` are rejected.
    pub fn new(
        low_row_rank: IT,
        high_row_rank: IT,
        low_column_rank: IT,
        high_column_rank: IT,
        layout: Layout,
    ) -> Result<Self> {
        let rows = RankWindow::new(low_row_rank, high_row_rank, "row")?;
        let columns = RankWindow::new(low_column_rank, high_column_rank, "column")?;
        Self::from_windows(rows, columns, layout)
    }

    /// Create an unallocated matrix from prepared windows
    pub fn from_windows(rows: RankWindow<IT>, columns: RankWindow<IT>, layout: Layout) -> Result<Self> {
        let dense = DenseMatrix::with_shape(rows.len(), columns.len(), layout)?;
        Ok(Self {
            rows,
            columns,
            dense,
        })
    }

    /// Ingest an adjacency input, allocating the mask
    ///
    /// Precondition violations (length mismatch, counts beyond `IT`, ranks
    /// outside the windows) are reported before anything is allocated and
    /// leave an earlier mask untouched. A refused free-memory check returns
    /// [`StorageError::InsufficientMemory`] and leaves the matrix
    /// unallocated, dropping the mask of any earlier ingestion.
    pub fn init_from_lil(
        &mut self,
        post_ranks: &[IT],
        pre_ranks: &[Vec<IT>],
        budget: &MemoryBudget,
    ) -> Result<()> {
        if post_ranks.len() != pre_ranks.len() {
            return Err(StorageError::length_mismatch(
                "pre_ranks",
                post_ranks.len(),
                pre_ranks.len(),
            ));
        }
        if IT::from_usize(post_ranks.len()).is_none() {
            return Err(StorageError::index_overflow(
                "number of post ranks",
                post_ranks.len() as u128,
                IT::WIDTH,
            ));
        }

        let mut cells = Vec::with_capacity(pre_ranks.iter().map(Vec::len).sum());
        for (&post, pres) in post_ranks.iter().zip(pre_ranks) {
            let row = self.rows.to_local(post, "row")?;
            for &pre in pres {
                let col = self.columns.to_local(pre, "column")?;
                cells.push((row, col));
            }
        }

        self.dense.allocate(budget)?;
        for (row, col) in cells {
            self.dense.set(row, col)?;
        }

        log::debug!(
            "Ingested {} dendrites into {}x{} mask ({} nonzeros)",
            post_ranks.len(),
            self.dense.num_rows(),
            self.dense.num_columns(),
            self.dense.nb_synapses()?
        );
        Ok(())
    }

    /// Ingest an [`Adjacency`] value
    pub fn init_from_adjacency(&mut self, adjacency: &Adjacency<IT>, budget: &MemoryBudget) -> Result<()> {
        self.init_from_lil(&adjacency.post_ranks, &adjacency.pre_ranks, budget)
    }

    /// Row rank window
    pub fn row_window(&self) -> RankWindow<IT> {
        self.rows
    }

    /// Column rank window
    pub fn column_window(&self) -> RankWindow<IT> {
        self.columns
    }

    /// Number of local rows
    pub fn num_rows(&self) -> IT {
        self.dense.num_rows()
    }

    /// Number of local columns
    pub fn num_columns(&self) -> IT {
        self.dense.num_columns()
    }

    /// Underlying dense storage
    pub fn dense(&self) -> &DenseMatrix<IT, ST, MT> {
        &self.dense
    }

    /// Mutable access to the underlying storage, for structural changes
    pub fn dense_mut(&mut self) -> &mut DenseMatrix<IT, ST, MT> {
        &mut self.dense
    }

    /// Local column indices populated in a local row
    ///
    /// Add `column_window().low` to obtain global ranks.
    pub fn decode_column_indices(&self, row: IT) -> Result<LineScan<'_, IT, MT>> {
        self.dense.decode_column_indices(row)
    }

    /// Global pre-synaptic ranks connected to a global post-synaptic rank
    pub fn decode_pre_ranks(&self, post_rank: IT) -> Result<Vec<IT>> {
        let row = self.rows.to_local(post_rank, "row")?;
        self.dense
            .decode_column_indices(row)?
            .map(|col| self.columns.to_global(col))
            .collect()
    }

    /// Set a connection by global ranks; returns `true` if it was new
    pub fn connect(&mut self, post_rank: IT, pre_rank: IT) -> Result<bool> {
        let row = self.rows.to_local(post_rank, "row")?;
        let col = self.columns.to_local(pre_rank, "column")?;
        self.dense.set(row, col)
    }

    /// Remove a connection by global ranks; returns `true` if it existed
    pub fn disconnect(&mut self, post_rank: IT, pre_rank: IT) -> Result<bool> {
        let row = self.rows.to_local(post_rank, "row")?;
        let col = self.columns.to_local(pre_rank, "column")?;
        self.dense.unset(row, col)
    }

    /// Number of rows connected to each global column rank
    ///
    /// Columns without any connection are absent. Visits every cell once.
    pub fn count_incoming_per_column(&self) -> Result<BTreeMap<IT, usize>> {
        let mask = self.dense.mask()?;
        let mut per_column = vec![0usize; self.dense.num_columns().as_usize()];
        for (idx, cell) in mask.iter().enumerate() {
            if cell.is_set() {
                per_column[self.dense.column_of(idx)] += 1;
            }
        }

        let mut counts = BTreeMap::new();
        for (col, count) in per_column.into_iter().enumerate() {
            if count == 0 {
                continue;
            }
            let local = IT::from_usize(col)
                .ok_or_else(|| StorageError::index_overflow("column", col as u128, IT::WIDTH))?;
            counts.insert(self.columns.to_global(local)?, count);
        }
        Ok(counts)
    }

    /// Export the populated cells back to LIL form, rows in rank order
    pub fn to_adjacency(&self) -> Result<Adjacency<IT>> {
        let mut post_ranks = Vec::new();
        let mut pre_ranks = Vec::new();
        let num_rows = self.dense.num_rows().as_usize();

        for row in 0..num_rows {
            let local = IT::from_usize(row)
                .ok_or_else(|| StorageError::index_overflow("row", row as u128, IT::WIDTH))?;
            let pres = self
                .dense
                .decode_column_indices(local)?
                .map(|col| self.columns.to_global(col))
                .collect::<Result<Vec<_>>>()?;
            if !pres.is_empty() {
                post_ranks.push(self.rows.to_global(local)?);
                pre_ranks.push(pres);
            }
        }

        Ok(Adjacency {
            post_ranks,
            pre_ranks,
        })
    }

    /// Bytes currently held by the matrix
    pub fn size_in_bytes(&self) -> usize {
        self.dense.size_in_bytes() + 2 * std::mem::size_of::<RankWindow<IT>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Matrix = OffsetMatrix<u32, u64, u8>;

    fn ingest(layout: Layout) -> Matrix {
        let mut m = Matrix::new(0, 10, 0, 10, layout).unwrap();
        m.init_from_lil(&[2, 5], &[vec![0, 3], vec![1]], &MemoryBudget::Unlimited)
            .unwrap();
        m
    }

    #[test]
    fn test_end_to_end_ingestion() {
        for layout in [Layout::RowMajor, Layout::ColumnMajor] {
            let m = ingest(layout);
            assert_eq!(m.decode_column_indices(2).unwrap().collect::<Vec<_>>(), vec![0, 3]);
            assert_eq!(m.decode_column_indices(5).unwrap().collect::<Vec<_>>(), vec![1]);
            for row in [0, 1, 3, 4, 6, 7, 8, 9] {
                assert_eq!(m.decode_column_indices(row).unwrap().count(), 0);
            }

            let counts = m.count_incoming_per_column().unwrap();
            let expected: BTreeMap<u32, usize> = [(0, 1), (1, 1), (3, 1)].into_iter().collect();
            assert_eq!(counts, expected);
        }
    }

    #[test]
    fn test_offset_windows() {
        let mut m = Matrix::new(100, 104, 50, 53, Layout::RowMajor).unwrap();
        assert_eq!(m.num_rows(), 4);
        assert_eq!(m.num_columns(), 3);

        m.init_from_lil(&[101, 103], &[vec![50, 52], vec![52]], &MemoryBudget::Unlimited)
            .unwrap();

        // local indices
        assert_eq!(m.decode_column_indices(1).unwrap().collect::<Vec<_>>(), vec![0, 2]);
        // global ranks
        assert_eq!(m.decode_pre_ranks(101).unwrap(), vec![50, 52]);
        assert_eq!(m.decode_pre_ranks(103).unwrap(), vec![52]);

        let counts = m.count_incoming_per_column().unwrap();
        assert_eq!(counts.get(&52), Some(&2));
        assert_eq!(counts.get(&50), Some(&1));
        assert_eq!(counts.get(&51), None);

        let adj = m.to_adjacency().unwrap();
        assert_eq!(adj.post_ranks, vec![101, 103]);
        assert_eq!(adj.pre_ranks, vec![vec![50, 52], vec![52]]);
    }

    #[test]
    fn test_inverted_window_is_fatal() {
        let err = Matrix::new(5, 4, 0, 1, Layout::RowMajor).unwrap_err();
        assert!(matches!(err, StorageError::InvalidRankWindow { axis: "row", .. }));
    }

    #[test]
    fn test_flat_index_width_checked() {
        let err = OffsetMatrix::<u32, u32, u8>::new(0, 70_000, 0, 70_000, Layout::RowMajor).unwrap_err();
        assert!(matches!(err, StorageError::IndexOverflow { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_out_of_window_ranks_rejected() {
        let mut m = Matrix::new(0, 4, 0, 4, Layout::RowMajor).unwrap();
        let err = m
            .init_from_lil(&[1], &[vec![4]], &MemoryBudget::Unlimited)
            .unwrap_err();
        assert!(matches!(err, StorageError::RankOutOfWindow { axis: "column", rank: 4, .. }));
        assert!(!m.dense().is_allocated());

        let err = m
            .init_from_lil(&[7], &[vec![0]], &MemoryBudget::Unlimited)
            .unwrap_err();
        assert!(matches!(err, StorageError::RankOutOfWindow { axis: "row", rank: 7, .. }));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut m = Matrix::new(0, 4, 0, 4, Layout::RowMajor).unwrap();
        let err = m
            .init_from_lil(&[0, 1], &[vec![0]], &MemoryBudget::Unlimited)
            .unwrap_err();
        assert!(matches!(err, StorageError::LengthMismatch { .. }));
    }

    #[test]
    fn test_insufficient_memory_leaves_matrix_unallocated() {
        let mut m = Matrix::new(0, 100, 0, 100, Layout::RowMajor).unwrap();
        let err = m
            .init_from_lil(&[0], &[vec![0]], &MemoryBudget::Limit(100))
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(!m.dense().is_allocated());
    }

    #[test]
    fn test_refused_reingestion_drops_previous_mask() {
        let mut m = ingest(Layout::RowMajor);
        assert!(m.dense().is_allocated());

        let err = m
            .init_from_lil(&[0], &[vec![0]], &MemoryBudget::Limit(0))
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(!m.dense().is_allocated());
        assert_eq!(m.decode_pre_ranks(2).unwrap_err(), StorageError::Unallocated);
    }

    #[test]
    fn test_connect_and_disconnect() {
        let mut m = ingest(Layout::RowMajor);
        assert!(m.connect(9, 9).unwrap());
        assert!(!m.connect(9, 9).unwrap());
        assert!(m.disconnect(2, 0).unwrap());
        assert_eq!(m.decode_pre_ranks(2).unwrap(), vec![3]);
        assert_eq!(m.decode_pre_ranks(9).unwrap(), vec![9]);
    }
}
