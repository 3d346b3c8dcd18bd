//! Packed ragged-batch bookkeeping.
//!
//! A packed batch stores, for every timestep `t`, the frames of the
//! `batch_at(t)` sequences still active at `t`, back to back and without
//! padding. Sequences are sorted by descending length, so the active rows at
//! `t` are always rows `0..batch_at(t)` and the counts never grow.

use std::ops::Range;

use crate::{Error, Result};

/// Direction of a walk over the timesteps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOrder {
    /// `0..T`.
    Forward,
    /// `T-1..=0`.
    Reverse,
}

impl TimeOrder {
    /// Walk of recurrence direction `dir` (0 forward, 1 reverse).
    #[inline]
    pub const fn of_direction(dir: usize) -> Self {
        if dir == 0 {
            TimeOrder::Forward
        } else {
            TimeOrder::Reverse
        }
    }

    #[inline]
    pub const fn reversed(self) -> Self {
        match self {
            TimeOrder::Forward => TimeOrder::Reverse,
            TimeOrder::Reverse => TimeOrder::Forward,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedBatchProfile {
    batch_at: Vec<usize>,
    /// `offsets[t]` is the first frame of timestep `t`; `offsets[T]` is the frame total.
    offsets: Vec<usize>,
}

impl PackedBatchProfile {
    /// Validate and index a per-timestep active-count list.
    pub fn new(batch_at: Vec<usize>) -> Result<Self> {
        if batch_at.is_empty() {
            return Err(Error::InvalidProfile(
                "profile must have at least one timestep".to_owned(),
            ));
        }
        if let Some(t) = batch_at.iter().position(|&b| b == 0) {
            return Err(Error::InvalidProfile(format!(
                "batch size at timestep {t} must be > 0"
            )));
        }
        if let Some(t) = batch_at.windows(2).position(|w| w[1] > w[0]) {
            return Err(Error::InvalidProfile(format!(
                "batch sizes must be non-increasing, but timestep {} has {} after {}",
                t + 1,
                batch_at[t + 1],
                batch_at[t]
            )));
        }

        let mut offsets = Vec::with_capacity(batch_at.len() + 1);
        let mut acc = 0_usize;
        offsets.push(0);
        for &b in &batch_at {
            acc = acc
                .checked_add(b)
                .ok_or_else(|| Error::InvalidProfile("total frame count overflow".to_owned()))?;
            offsets.push(acc);
        }

        Ok(Self { batch_at, offsets })
    }

    /// Like [`PackedBatchProfile::new`], but also checks the configured sequence length.
    pub fn for_seq_len(seq_len: usize, batch_at: Vec<usize>) -> Result<Self> {
        if batch_at.len() != seq_len {
            return Err(Error::InvalidProfile(format!(
                "profile has {} timesteps, expected sequence length {seq_len}",
                batch_at.len()
            )));
        }
        Self::new(batch_at)
    }

    /// `seq_len` timesteps of `batch` sequences each.
    pub fn uniform(batch: usize, seq_len: usize) -> Result<Self> {
        Self::new(vec![batch; seq_len])
    }

    #[inline]
    pub fn seq_len(&self) -> usize {
        self.batch_at.len()
    }

    #[inline]
    pub fn batch_at(&self, t: usize) -> usize {
        self.batch_at[t]
    }

    #[inline]
    pub fn batch_sizes(&self) -> &[usize] {
        &self.batch_at
    }

    /// Number of sequences in the batch (`batch_at(0)`).
    #[inline]
    pub fn max_batch(&self) -> usize {
        self.batch_at[0]
    }

    #[inline]
    pub fn total_frames(&self) -> usize {
        self.offsets[self.batch_at.len()]
    }

    /// First frame of timestep `t`.
    #[inline]
    pub fn frame_offset(&self, t: usize) -> usize {
        self.offsets[t]
    }

    #[inline]
    pub fn frame_range(&self, t: usize) -> Range<usize> {
        self.offsets[t]..self.offsets[t + 1]
    }

    /// Timesteps in `order`.
    pub fn steps(
        &self,
        order: TimeOrder,
    ) -> impl DoubleEndedIterator<Item = usize> + ExactSizeIterator + use<> {
        let len = self.batch_at.len();
        (0..len).map(move |i| match order {
            TimeOrder::Forward => i,
            TimeOrder::Reverse => len - 1 - i,
        })
    }

    /// Step visited before `t` in `order`.
    #[inline]
    pub fn prev_step(&self, t: usize, order: TimeOrder) -> Option<usize> {
        match order {
            TimeOrder::Forward => t.checked_sub(1),
            TimeOrder::Reverse => (t + 1 < self.batch_at.len()).then_some(t + 1),
        }
    }

    /// Step visited after `t` in `order`.
    #[inline]
    pub fn next_step(&self, t: usize, order: TimeOrder) -> Option<usize> {
        self.prev_step(t, order.reversed())
    }

    /// Rows of `t` that were also active at the previous step of `order`.
    #[inline]
    pub fn carried_rows(&self, t: usize, order: TimeOrder) -> usize {
        self.prev_step(t, order)
            .map_or(0, |p| self.batch_at[p].min(self.batch_at[t]))
    }

    /// Rows of `t` that are still active at the next step of `order`.
    #[inline]
    pub fn continued_rows(&self, t: usize, order: TimeOrder) -> usize {
        self.next_step(t, order)
            .map_or(0, |n| self.batch_at[n].min(self.batch_at[t]))
    }

    /// Rows whose walk in `order` begins at `t`.
    ///
    /// Walking in reverse, rows `batch_at(t+1)..batch_at(t)` begin at an
    /// interior `t`, not only at `T-1`.
    #[inline]
    pub fn starting_rows(&self, t: usize, order: TimeOrder) -> Range<usize> {
        self.carried_rows(t, order)..self.batch_at[t]
    }

    /// Rows whose walk in `order` ends at `t`.
    #[inline]
    pub fn ending_rows(&self, t: usize, order: TimeOrder) -> Range<usize> {
        self.continued_rows(t, order)..self.batch_at[t]
    }

    /// Length of every sequence in the batch, longest first.
    pub fn sequence_lengths(&self) -> Vec<usize> {
        (0..self.max_batch())
            .map(|row| self.batch_at.iter().take_while(|&&b| b > row).count())
            .collect()
    }
}
