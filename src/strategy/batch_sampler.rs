use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::data::ExampleId;

/// Yields the training minibatch for each reflective proposal.
#[derive(Debug, Clone)]
pub enum BatchSampler {
    /// Cycles the training IDs in natural order: iteration `i` gets the
    /// circular slice starting at `i * batch_size mod n`.
    Simple { batch_size: usize },
    /// Reshuffles the IDs once per epoch with a seeded RNG, padding the tail
    /// so every batch is full.
    EpochShuffled(EpochShuffledSampler),
}

impl BatchSampler {
    pub fn simple(batch_size: usize) -> Self {
        Self::Simple { batch_size }
    }

    pub fn epoch_shuffled(batch_size: usize, seed: u64) -> Self {
        Self::EpochShuffled(EpochShuffledSampler::new(batch_size, seed))
    }

    pub fn batch_size(&self) -> usize {
        match self {
            Self::Simple { batch_size } => *batch_size,
            Self::EpochShuffled(sampler) => sampler.batch_size,
        }
    }

    pub fn next_batch(&mut self, iteration: usize, ids: &[ExampleId]) -> Vec<ExampleId> {
        match self {
            Self::Simple { batch_size } => {
                let n = ids.len();
                let m = *batch_size;
                if n == 0 || m == 0 {
                    return Vec::new();
                }
                let start = (iteration * m) % n;
                (0..m).map(|offset| ids[(start + offset) % n]).collect()
            }
            Self::EpochShuffled(sampler) => sampler.next_batch(ids),
        }
    }
}

/// Epoch-shuffled sampling state.
///
/// At each epoch boundary (schedule exhausted, or the training set changed
/// size) the IDs are shuffled and padded to a multiple of the batch size by
/// appending the IDs with the lowest cumulative pick count, ties broken by
/// ID order. Within one epoch no ID repeats except as padding.
#[derive(Debug, Clone)]
pub struct EpochShuffledSampler {
    batch_size: usize,
    rng: StdRng,
    schedule: Vec<ExampleId>,
    cursor: usize,
    pick_counts: BTreeMap<ExampleId, u64>,
    last_size: usize,
}

impl EpochShuffledSampler {
    fn new(batch_size: usize, seed: u64) -> Self {
        Self {
            batch_size,
            rng: StdRng::seed_from_u64(seed),
            schedule: Vec::new(),
            cursor: 0,
            pick_counts: BTreeMap::new(),
            last_size: 0,
        }
    }

    fn next_batch(&mut self, ids: &[ExampleId]) -> Vec<ExampleId> {
        if ids.is_empty() || self.batch_size == 0 {
            return Vec::new();
        }
        if self.cursor + self.batch_size > self.schedule.len() || self.last_size != ids.len() {
            self.reshuffle(ids);
        }
        let batch: Vec<ExampleId> =
            self.schedule[self.cursor..self.cursor + self.batch_size].to_vec();
        self.cursor += self.batch_size;
        for &id in &batch {
            *self.pick_counts.entry(id).or_insert(0) += 1;
        }
        batch
    }

    fn reshuffle(&mut self, ids: &[ExampleId]) {
        let mut schedule = ids.to_vec();
        schedule.shuffle(&mut self.rng);

        let pad = (self.batch_size - ids.len() % self.batch_size) % self.batch_size;
        if pad > 0 {
            let mut by_count = ids.to_vec();
            by_count.sort_by_key(|&id| (self.pick_counts.get(&id).copied().unwrap_or(0), id));
            schedule.extend(by_count.iter().copied().cycle().take(pad));
        }

        self.schedule = schedule;
        self.cursor = 0;
        self.last_size = ids.len();
    }
}
