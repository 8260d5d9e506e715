//! Dense mask-backed matrix storage
//!
//! The matrix keeps one mask cell per (row, column) pair. Enumeration of the
//! nonzeros of a row or a column always visits every cell of that line, so it
//! costs O(num_columns) or O(num_rows) regardless of sparsity.

use crate::{
    error::{Result, StorageError},
    index::{MaskValue, MatrixIndex},
    memory::MemoryBudget,
};

use core::marker::PhantomData;
use core::mem;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Flat addressing scheme of a matrix, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Layout {
    /// `addr(row, col) = row * num_columns + col`
    #[default]
    RowMajor,
    /// `addr(row, col) = col * num_rows + row`
    ColumnMajor,
}

impl Layout {
    /// Flat address of a cell
    #[inline]
    pub fn addr(self, row: usize, col: usize, num_rows: usize, num_columns: usize) -> usize {
        match self {
            Self::RowMajor => row * num_columns + col,
            Self::ColumnMajor => col * num_rows + row,
        }
    }
}

/// Dense matrix with a parallel mask marking populated entries
///
/// - `IT` bounds the number of rows and columns
/// - `ST` must hold `num_rows * num_columns`
/// - `MT` is the mask cell type
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix<IT = u32, ST = u64, MT = u8>
where
    IT: MatrixIndex,
    ST: MatrixIndex,
    MT: MaskValue,
{
    num_rows: IT,
    num_columns: IT,
    layout: Layout,
    mask: Vec<MT>,
    allocated: bool,
    _flat: PhantomData<ST>,
}

impl<IT, ST, MT> DenseMatrix<IT, ST, MT>
where
    IT: MatrixIndex,
    ST: MatrixIndex,
    MT: MaskValue,
{
    /// Create a matrix shape without allocating the mask
    ///
    /// Fails if `num_rows * num_columns` cannot be represented by `ST` (or by
    /// `usize` on this platform). The product is never truncated.
    pub fn with_shape(num_rows: IT, num_columns: IT, layout: Layout) -> Result<Self> {
        let cells = num_rows.to_u64() as u128 * num_columns.to_u64() as u128;
        if ST::from_u128(cells).is_none() {
            return Err(StorageError::index_overflow("num_rows * num_columns", cells, ST::WIDTH));
        }
        if usize::from_u128(cells).is_none() {
            return Err(StorageError::index_overflow("num_rows * num_columns", cells, "usize"));
        }

        Ok(Self {
            num_rows,
            num_columns,
            layout,
            mask: Vec::new(),
            allocated: false,
            _flat: PhantomData,
        })
    }

    /// Create a matrix and allocate a zeroed mask
    ///
    /// Returns [`StorageError::InsufficientMemory`] if the budget refuses the
    /// allocation.
    pub fn new(num_rows: IT, num_columns: IT, layout: Layout, budget: &MemoryBudget) -> Result<Self> {
        let mut matrix = Self::with_shape(num_rows, num_columns, layout)?;
        matrix.allocate(budget)?;
        Ok(matrix)
    }

    /// Allocate (or re-zero) the mask after a free-memory check
    ///
    /// A mask whose byte count overflows `u64` is an [`StorageError::IndexOverflow`].
    /// A refused check or a failed reservation leaves the matrix unallocated.
    pub fn allocate(&mut self, budget: &MemoryBudget) -> Result<()> {
        self.clear();
        let requested = self.required_bytes()?;
        budget.check(requested)?;

        let cells = self.cells();
        let mut mask = Vec::new();
        mask.try_reserve_exact(cells)
            .map_err(|_| StorageError::InsufficientMemory {
                requested,
                available: budget.available_bytes(),
            })?;
        mask.resize(cells, MT::UNSET);
        self.mask = mask;
        self.allocated = true;
        Ok(())
    }

    /// Release the mask, keeping the shape
    pub fn clear(&mut self) {
        self.mask = Vec::new();
        self.allocated = false;
    }

    /// Number of rows
    pub fn num_rows(&self) -> IT {
        self.num_rows
    }

    /// Number of columns
    pub fn num_columns(&self) -> IT {
        self.num_columns
    }

    /// Addressing layout
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Whether the mask has been allocated
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Number of cells (`num_rows * num_columns`)
    pub fn cells(&self) -> usize {
        self.num_rows.as_usize() * self.num_columns.as_usize()
    }

    /// Bytes needed by the mask
    pub fn required_bytes(&self) -> Result<u64> {
        let bytes = self.cells() as u128 * mem::size_of::<MT>() as u128;
        u64::try_from(bytes).map_err(|_| StorageError::index_overflow("mask bytes", bytes, "u64"))
    }

    /// Bytes currently held by the matrix
    pub fn size_in_bytes(&self) -> usize {
        mem::size_of::<Self>() + self.mask.capacity() * mem::size_of::<MT>()
    }

    /// Read-only view of the mask in layout order
    pub fn mask(&self) -> Result<&[MT]> {
        self.ensure_allocated()?;
        Ok(&self.mask)
    }

    /// Flat address of a cell
    pub fn flat_index(&self, row: IT, col: IT) -> Result<usize> {
        self.check_row(row)?;
        self.check_column(col)?;
        Ok(self.addr(row.as_usize(), col.as_usize()))
    }

    /// Whether a cell holds a connection
    pub fn is_set(&self, row: IT, col: IT) -> Result<bool> {
        self.ensure_allocated()?;
        let idx = self.flat_index(row, col)?;
        Ok(self.mask[idx].is_set())
    }

    /// Mark a cell as populated; returns `true` if it was empty before
    pub fn set(&mut self, row: IT, col: IT) -> Result<bool> {
        self.ensure_allocated()?;
        let idx = self.flat_index(row, col)?;
        let was_set = self.mask[idx].is_set();
        self.mask[idx] = MT::SET;
        Ok(!was_set)
    }

    /// Mark a cell as empty; returns `true` if it was populated before
    pub fn unset(&mut self, row: IT, col: IT) -> Result<bool> {
        self.ensure_allocated()?;
        let idx = self.flat_index(row, col)?;
        let was_set = self.mask[idx].is_set();
        self.mask[idx] = MT::UNSET;
        Ok(was_set)
    }

    /// Lazily enumerate the column indices populated in `row`
    pub fn decode_column_indices(&self, row: IT) -> Result<LineScan<'_, IT, MT>> {
        self.ensure_allocated()?;
        self.check_row(row)?;
        let (rows, cols) = (self.num_rows.as_usize(), self.num_columns.as_usize());
        let row = row.as_usize();
        let scan = match self.layout {
            Layout::RowMajor => LineScan::new(&self.mask, row * cols, 1, cols),
            Layout::ColumnMajor => LineScan::new(&self.mask, row, rows, cols),
        };
        Ok(scan)
    }

    /// Lazily enumerate the row indices populated in `col`
    pub fn decode_row_indices(&self, col: IT) -> Result<LineScan<'_, IT, MT>> {
        self.ensure_allocated()?;
        self.check_column(col)?;
        let (rows, cols) = (self.num_rows.as_usize(), self.num_columns.as_usize());
        let col = col.as_usize();
        let scan = match self.layout {
            Layout::RowMajor => LineScan::new(&self.mask, col, cols, rows),
            Layout::ColumnMajor => LineScan::new(&self.mask, col * rows, 1, rows),
        };
        Ok(scan)
    }

    /// Total number of populated cells
    pub fn nb_synapses(&self) -> Result<usize> {
        self.ensure_allocated()?;
        Ok(self.mask.iter().filter(|cell| cell.is_set()).count())
    }

    /// Number of populated cells in one row
    pub fn nb_synapses_per_row(&self, row: IT) -> Result<usize> {
        Ok(self.decode_column_indices(row)?.count())
    }

    /// Column of a flat address
    pub(crate) fn column_of(&self, idx: usize) -> usize {
        match self.layout {
            Layout::RowMajor => idx % self.num_columns.as_usize(),
            Layout::ColumnMajor => idx / self.num_rows.as_usize(),
        }
    }

    #[inline]
    fn addr(&self, row: usize, col: usize) -> usize {
        self.layout.addr(row, col, self.num_rows.as_usize(), self.num_columns.as_usize())
    }

    fn ensure_allocated(&self) -> Result<()> {
        if self.allocated {
            Ok(())
        } else {
            Err(StorageError::Unallocated)
        }
    }

    fn check_row(&self, row: IT) -> Result<()> {
        if row >= self.num_rows {
            return Err(StorageError::out_of_bounds("row", row.to_u64(), self.num_rows.to_u64()));
        }
        Ok(())
    }

    fn check_column(&self, col: IT) -> Result<()> {
        if col >= self.num_columns {
            return Err(StorageError::out_of_bounds(
                "column",
                col.to_u64(),
                self.num_columns.to_u64(),
            ));
        }
        Ok(())
    }
}

/// Strided scan over one row or column of a mask, yielding populated positions
#[derive(Debug, Clone)]
pub struct LineScan<'a, IT, MT> {
    mask: &'a [MT],
    base: usize,
    stride: usize,
    len: usize,
    next: usize,
    _index: PhantomData<IT>,
}

impl<'a, IT, MT> LineScan<'a, IT, MT> {
    fn new(mask: &'a [MT], base: usize, stride: usize, len: usize) -> Self {
        Self {
            mask,
            base,
            stride,
            len,
            next: 0,
            _index: PhantomData,
        }
    }
}

impl<'a, IT: MatrixIndex, MT: MaskValue> Iterator for LineScan<'a, IT, MT> {
    type Item = IT;

    fn next(&mut self) -> Option<IT> {
        while self.next < self.len {
            let pos = self.next;
            self.next += 1;
            if self.mask[self.base + pos * self.stride].is_set() {
                // pos < line length, which is itself an IT value
                return IT::from_usize(pos);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.len - self.next))
    }
}
