//! Lock-free primitives for real-time audio.

use crate::BAND_COUNT;
use atomic_float::AtomicF32;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};

/// Cache-line aligned atomic f32.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFloat {
    value: AtomicF32,
}

impl AtomicFloat {
    pub fn new(value: f32) -> Self {
        Self {
            value: AtomicF32::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn get_relaxed(&self) -> f32 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: f32) -> f32 {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Default for AtomicFloat {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Cache-line aligned atomic bool.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Four-lane band aggregate with consistent snapshot reads.
///
/// Single writer (the channel's analysis worker), any number of readers.
/// A sequence counter is odd while a write is in progress; readers retry
/// instead of observing a half-written vector. The writer never waits.
#[derive(Debug, Default)]
pub struct AtomicBands {
    seq: AtomicU64,
    lanes: [AtomicFloat; BAND_COUNT],
}

impl AtomicBands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new band vector. Must only be called from one thread.
    pub fn store(&self, bands: [f32; BAND_COUNT]) {
        self.seq.fetch_add(1, Ordering::AcqRel);
        fence(Ordering::Release);
        for (lane, value) in self.lanes.iter().zip(bands) {
            lane.value.store(value, Ordering::Relaxed);
        }
        self.seq.fetch_add(1, Ordering::AcqRel);
    }

    /// Read the latest complete band vector.
    pub fn load(&self) -> [f32; BAND_COUNT] {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let bands = self.read_lanes();
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return bands;
            }
        }
    }

    /// Blend `bands` into the stored value: `new * factor + old * (1 - factor)`.
    pub fn blend(&self, bands: [f32; BAND_COUNT], factor: f32) {
        let factor = factor.clamp(0.0, 1.0);
        let previous = self.read_lanes();
        let mut mixed = [0.0; BAND_COUNT];
        for i in 0..BAND_COUNT {
            mixed[i] = bands[i] * factor + previous[i] * (1.0 - factor);
        }
        self.store(mixed);
    }

    pub fn reset(&self) {
        self.store([0.0; BAND_COUNT]);
    }

    #[inline]
    fn read_lanes(&self) -> [f32; BAND_COUNT] {
        let mut bands = [0.0; BAND_COUNT];
        for (out, lane) in bands.iter_mut().zip(&self.lanes) {
            *out = lane.value.load(Ordering::Relaxed);
        }
        bands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    #[test]
    fn test_atomic_float() {
        let val = AtomicFloat::new(1.0);
        assert_eq!(val.get(), 1.0);
        val.set(2.5);
        assert_eq!(val.get(), 2.5);
    }

    #[test]
    fn test_atomic_flag() {
        let flag = AtomicFlag::new(false);
        assert!(!flag.get());
        flag.set(true);
        assert!(flag.get());
        assert!(flag.swap(false));
    }

    #[test]
    fn test_bands_store_load() {
        let bands = AtomicBands::new();
        assert_eq!(bands.load(), [0.0; 4]);
        bands.store([0.1, 0.2, 0.3, 0.4]);
        assert_eq!(bands.load(), [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_bands_blend() {
        let bands = AtomicBands::new();
        bands.store([1.0; 4]);
        bands.blend([0.0; 4], 0.25);
        for v in bands.load() {
            assert_relative_eq!(v, 0.75);
        }
        bands.blend([0.5; 4], 1.0);
        assert_eq!(bands.load(), [0.5; 4]);
    }

    #[test]
    fn test_bands_snapshot_is_never_torn() {
        let bands = Arc::new(AtomicBands::new());
        let writer = {
            let bands = bands.clone();
            std::thread::spawn(move || {
                for i in 0..20_000 {
                    let v = i as f32;
                    bands.store([v, v, v, v]);
                }
            })
        };

        for _ in 0..20_000 {
            let snapshot = bands.load();
            assert!(snapshot.iter().all(|&v| v == snapshot[0]));
        }
        writer.join().unwrap();
    }
}
