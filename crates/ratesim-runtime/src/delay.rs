//! Rate history for delayed synaptic transmission

use crate::error::*;
use std::collections::VecDeque;

/// Ring of past rate snapshots, most recent first
///
/// Slot `d - 1` holds the snapshot pushed `d` pushes ago, so a history of
/// depth `D` serves every delay in `1..=D`. Depth only grows, and only
/// before the first push.
#[derive(Debug, Clone)]
pub struct DelayHistory {
    size: usize,
    slots: VecDeque<Vec<f32>>,
    started: bool,
}

impl DelayHistory {
    /// Create an empty history for a population of `size` neurons
    pub fn new(size: usize) -> Self {
        Self {
            size,
            slots: VecDeque::new(),
            started: false,
        }
    }

    /// Number of stored snapshots
    pub fn depth(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Number of neurons per snapshot
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether a snapshot has been pushed since creation or the last reset
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Grow the history to `max_delay` zero-filled snapshots
    pub fn set_max_delay(&mut self, max_delay: u32) -> Result<()> {
        let current = self.depth();
        if max_delay == current {
            return Ok(());
        }
        if self.started {
            return Err(RuntimeError::DelayFrozen {
                requested: max_delay,
            });
        }
        if max_delay < current {
            return Err(RuntimeError::DelayShrink {
                requested: max_delay,
                current,
            });
        }

        log::debug!("Growing delay history from {} to {} steps", current, max_delay);
        let size = self.size;
        self.slots.resize_with(max_delay as usize, || vec![0.0; size]);
        Ok(())
    }

    /// Record the rates produced by the step that just finished
    ///
    /// The oldest snapshot is evicted and its buffer reused.
    pub fn push(&mut self, rates: &[f32]) -> Result<()> {
        if rates.len() != self.size {
            return Err(RuntimeError::size_mismatch("rate snapshot", self.size, rates.len()));
        }
        self.started = true;
        if let Some(mut oldest) = self.slots.pop_back() {
            oldest.copy_from_slice(rates);
            self.slots.push_front(oldest);
        }
        Ok(())
    }

    /// Snapshot pushed `delay` pushes ago
    pub fn read(&self, delay: u32) -> Result<&[f32]> {
        if delay == 0 || delay > self.depth() {
            return Err(RuntimeError::DelayOutOfRange {
                delay,
                max: self.depth(),
            });
        }
        Ok(&self.slots[delay as usize - 1])
    }

    /// Gather `rates[delays[i]][ranks[i]]` for each `i`
    pub fn gather(&self, delays: &[u32], ranks: &[usize]) -> Result<Vec<f32>> {
        if delays.len() != ranks.len() {
            return Err(RuntimeError::size_mismatch("delayed ranks", delays.len(), ranks.len()));
        }

        delays
            .iter()
            .zip(ranks)
            .map(|(&delay, &rank)| {
                let snapshot = self.read(delay)?;
                snapshot
                    .get(rank)
                    .copied()
                    .ok_or(RuntimeError::RankOutOfRange {
                        rank,
                        size: self.size,
                    })
            })
            .collect()
    }

    /// Overwrite every snapshot with `rates` and allow resizing again
    pub fn fill(&mut self, rates: &[f32]) -> Result<()> {
        if rates.len() != self.size {
            return Err(RuntimeError::size_mismatch("rate snapshot", self.size, rates.len()));
        }
        for slot in &mut self.slots {
            slot.copy_from_slice(rates);
        }
        self.started = false;
        Ok(())
    }

    /// Heap bytes held by the snapshots
    pub fn size_in_bytes(&self) -> usize {
        self.slots.len() * self.size * std::mem::size_of::<f32>()
    }
}
