//! Spectrum partition tables mapping FFT bins to display buckets.
//!
//! Boundaries are inclusive upper bin indices. Bucket `i` covers bins
//! `(b[i-1], b[i]]` with `b[-1] = 0`, so the DC bin never lands in a bucket
//! and the last bucket ends on `limit` (the Nyquist bin).

use crate::PartitionMode;

/// Inputs that determine a partition table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionKey {
    /// Highest bin index to cover
    pub limit: usize,
    /// Number of buckets
    pub buckets: usize,
    pub mode: PartitionMode,
}

/// Cached bucket boundaries. Recomputed only when the key changes.
#[derive(Debug, Clone, Default)]
pub struct PartitionTable {
    key: Option<PartitionKey>,
    boundaries: Vec<usize>,
}

impl PartitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the table match `key`. Returns `true` if it was regenerated.
    pub fn ensure(&mut self, key: PartitionKey) -> bool {
        if self.key == Some(key) {
            return false;
        }
        generate(key, &mut self.boundaries);
        self.key = Some(key);
        true
    }

    pub fn key(&self) -> Option<PartitionKey> {
        self.key
    }

    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Inclusive bin range of bucket `index`.
    pub fn bucket_bins(&self, index: usize) -> core::ops::RangeInclusive<usize> {
        let lo = if index == 0 {
            1
        } else {
            self.boundaries[index - 1] + 1
        };
        lo..=self.boundaries[index]
    }

    /// Fractional bin at the center of bucket `index`.
    pub fn center_bin(&self, index: usize) -> f32 {
        let bins = self.bucket_bins(index);
        (*bins.start() + *bins.end()) as f32 * 0.5
    }
}

/// Fill `out` with strictly increasing boundaries ending at `key.limit`.
///
/// With `buckets > limit` there are not enough bins; the bucket count is
/// reduced to `limit`.
fn generate(key: PartitionKey, out: &mut Vec<usize>) {
    out.clear();
    let limit = key.limit;
    let n = key.buckets.min(limit);
    if n == 0 {
        return;
    }
    let sharpness = key.mode.sharpness();

    let mut last = 0usize;
    for i in 0..n {
        let t = (i + 1) as f64 / n as f64;
        let step = match key.mode {
            PartitionMode::Linear => (limit as f64 * t).round() as usize,
            PartitionMode::PowerCurve { .. } => {
                (limit as f64 * t.powf(sharpness as f64)).round() as usize
            }
        };
        // Leave one bin for each remaining bucket.
        let ceiling = limit - (n - 1 - i);
        let boundary = step.max(last + 1).min(ceiling);
        out.push(boundary);
        last = boundary;
    }
}
