//! Free-memory checks performed before dense allocations

use crate::error::{Result, StorageError};

use sysinfo::System;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Policy deciding how many bytes a dense allocation may use
///
/// The check is advisory and synchronous: a refusal means the connectivity
/// cannot be built in dense form under this policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MemoryBudget {
    /// Query the operating system for currently available memory
    #[default]
    System,
    /// Fixed byte limit
    Limit(u64),
    /// Skip the check
    Unlimited,
}

impl MemoryBudget {
    /// Bytes available under this policy
    pub fn available_bytes(&self) -> u64 {
        match self {
            Self::System => {
                let mut sys = System::new();
                sys.refresh_memory();
                sys.available_memory()
            }
            Self::Limit(bytes) => *bytes,
            Self::Unlimited => u64::MAX,
        }
    }

    /// Check that `requested` bytes can be allocated
    pub fn check(&self, requested: u64) -> Result<()> {
        if matches!(self, Self::Unlimited) {
            return Ok(());
        }

        let available = self.available_bytes();
        if requested > available {
            log::warn!(
                "Dense allocation refused: {} bytes requested, {} bytes available",
                requested,
                available
            );
            return Err(StorageError::InsufficientMemory {
                requested,
                available,
            });
        }
        Ok(())
    }
}
