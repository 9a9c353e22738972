use crate::{Result, ZelnaError};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

const CHUNK_FRAMES: usize = 1024;

/// Mono resampler fed with arbitrarily sized callback frames.
///
/// Input is buffered until a full rubato chunk is available; leftovers carry
/// over to the next call. Equal rates pass samples straight through.
pub struct StreamResampler {
    resampler: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(ZelnaError::Config(
                "Sample rates must be greater than 0".into(),
            ));
        }

        let resampler = if input_rate == output_rate {
            None
        } else {
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };

            let resampler = SincFixedIn::<f32>::new(
                output_rate as f64 / input_rate as f64,
                2.0,
                params,
                CHUNK_FRAMES,
                1,
            )
            .map_err(|e| ZelnaError::Transcription(format!("Failed to create resampler: {}", e)))?;

            debug!("Created resampler: {} Hz -> {} Hz", input_rate, output_rate);
            Some(resampler)
        };

        Ok(Self {
            resampler,
            pending: Vec::with_capacity(CHUNK_FRAMES * 2),
        })
    }

    /// Resample whatever full chunks are available
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(input.to_vec());
        };

        self.pending.extend_from_slice(input);
        let mut output = Vec::new();

        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }

            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            let out = resampler
                .process(&[chunk], None)
                .map_err(|e| ZelnaError::Transcription(format!("Resampling failed: {}", e)))?;
            if let Some(channel) = out.into_iter().next() {
                output.extend(channel);
            }
        }

        Ok(output)
    }

    /// Drop buffered input and filter state
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let mut resampler = StreamResampler::new(16000, 16000).unwrap();
        let input = vec![0.25f32; 100];
        assert_eq!(resampler.process(&input).unwrap(), input);
    }

    #[test]
    fn test_buffers_partial_chunks() {
        let mut resampler = StreamResampler::new(48000, 16000).unwrap();
        // Less than one chunk yields nothing yet
        assert!(resampler.process(&[0.0; 100]).unwrap().is_empty());

        let out = resampler.process(&vec![0.0; 4800]).unwrap();
        assert!(!out.is_empty());
        assert!(out.len() < 4900);
    }

    #[test]
    fn test_rejects_zero_rate() {
        assert!(StreamResampler::new(0, 16000).is_err());
    }
}
