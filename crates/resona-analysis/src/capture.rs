//! Dump of raw input samples to a WAV file, written by the analysis worker.

use crate::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Mono 32-bit float WAV spec at `sample_rate`.
pub fn capture_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    }
}

/// In-progress capture of one channel.
///
/// Samples are streamed to disk as bundles arrive; the file is finalized once
/// `max_samples` have been written.
pub struct InputCapture {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    written: usize,
    max_samples: usize,
}

impl InputCapture {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32, max_samples: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = WavWriter::create(&path, capture_spec(sample_rate))?;
        Ok(Self {
            path,
            writer: Some(writer),
            written: 0,
            max_samples,
        })
    }

    /// Append samples. Returns `true` once the capture is complete and the
    /// file has been finalized.
    pub fn push(&mut self, samples: &[f32]) -> Result<bool> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(true);
        };
        let take = samples.len().min(self.max_samples - self.written);
        for &sample in &samples[..take] {
            writer.write_sample(sample)?;
        }
        self.written += take;

        if self.written >= self.max_samples {
            self.finish()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Finalize the file with whatever has been written so far.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            tracing::info!(
                "Captured {} samples to {}",
                self.written,
                self.path.display()
            );
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn is_complete(&self) -> bool {
        self.writer.is_none()
    }
}

impl Drop for InputCapture {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!("Failed to finalize capture {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_stops_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in0.wav");

        let mut capture = InputCapture::create(&path, 48000, 100).unwrap();
        assert!(!capture.push(&[0.25; 64]).unwrap());
        assert!(capture.push(&[0.5; 64]).unwrap());
        assert!(capture.is_complete());
        assert_eq!(capture.written(), 100);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.sample_format, SampleFormat::Float);

        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 100);
        assert_eq!(samples[63], 0.25);
        assert_eq!(samples[64], 0.5);
    }

    #[test]
    fn test_drop_finalizes_partial_capture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.wav");
        {
            let mut capture = InputCapture::create(&path, 44100, 1000).unwrap();
            capture.push(&[0.1; 10]).unwrap();
        }
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 10);
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("x.wav");
        assert!(InputCapture::create(path, 44100, 10).is_err());
    }
}
