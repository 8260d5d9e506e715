//! Numeric width traits for matrix indices and mask cells
//!
//! A matrix is parameterized over three element types:
//!
//! - `IT`: rank and local index type. Bounds the number of rows and columns.
//! - `ST`: flat index type. Must hold `num_rows * num_columns`.
//! - `MT`: mask cell type. Only needs a "set" and an "unset" value.
//!
//! | `IT`  | max rows/columns        |
//! |-------|-------------------------|
//! | `u8`  | 255                     |
//! | `u16` | 65 535                  |
//! | `u32` | 4 294 967 295           |
//! | `u64` | 18 446 744 073 709 551 615 |

use core::fmt::{Debug, Display};
use core::hash::Hash;

/// Unsigned integer usable as a rank, local index or flat index
pub trait MatrixIndex:
    Copy + Ord + Eq + Hash + Debug + Display + Default + Send + Sync + 'static
{
    /// Zero value
    const ZERO: Self;
    /// Largest representable value
    const MAX: Self;
    /// Type name used in diagnostics
    const WIDTH: &'static str;

    /// Widen to `u64`
    fn to_u64(self) -> u64;

    /// Narrow from `u128`, `None` if the value does not fit
    fn from_u128(value: u128) -> Option<Self>;

    /// Narrow from `usize`, `None` if the value does not fit
    fn from_usize(value: usize) -> Option<Self> {
        Self::from_u128(value as u128)
    }

    /// Convert to a `usize` position.
    ///
    /// Callers only use this for values already checked against a matrix
    /// shape whose size fits `usize`.
    fn as_usize(self) -> usize {
        self.to_u64() as usize
    }
}

macro_rules! impl_matrix_index {
    ($($t:ty),*) => {
        $(
            impl MatrixIndex for $t {
                const ZERO: Self = 0;
                const MAX: Self = <$t>::MAX;
                const WIDTH: &'static str = stringify!($t);

                #[inline]
                fn to_u64(self) -> u64 {
                    self as u64
                }

                #[inline]
                fn from_u128(value: u128) -> Option<Self> {
                    <$t>::try_from(value).ok()
                }
            }
        )*
    };
}

impl_matrix_index!(u8, u16, u32, u64, usize);

/// Mask cell type recording whether a matrix entry holds a connection
pub trait MaskValue: Copy + PartialEq + Debug + Send + Sync + 'static {
    /// Value stored for a populated cell
    const SET: Self;
    /// Value stored for an empty cell
    const UNSET: Self;

    /// Whether this cell is populated
    #[inline]
    fn is_set(self) -> bool {
        self != Self::UNSET
    }
}

impl MaskValue for bool {
    const SET: Self = true;
    const UNSET: Self = false;
}

macro_rules! impl_mask_value {
    ($($t:ty),*) => {
        $(
            impl MaskValue for $t {
                const SET: Self = 1;
                const UNSET: Self = 0;
            }
        )*
    };
}

impl_mask_value!(u8, i8, u16, u32);
