//! Conversion from a device's native input format to 16 kHz mono

use anyhow::{Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Average interleaved frames down to one channel
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Streaming downmix and resample for live capture
///
/// Device callbacks deliver arbitrary block sizes; input is accumulated
/// until the resampler has a full block, so output arrives in steps of
/// `block_ms`. Equal rates skip resampling entirely.
pub struct MonoConverter {
    channels: usize,
    resampler: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
}

impl MonoConverter {
    pub fn new(from_rate: u32, channels: u16, to_rate: u32, block_ms: u64) -> Result<Self> {
        let resampler = if from_rate == to_rate {
            None
        } else {
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            let block_frames = (from_rate as u64 * block_ms.max(1) / 1000).max(1) as usize;

            let resampler = SincFixedIn::<f32>::new(
                to_rate as f64 / from_rate as f64,
                2.0,
                params,
                block_frames,
                1,
            )
            .with_context(|| format!("Failed to create {}Hz -> {}Hz resampler", from_rate, to_rate))?;
            Some(resampler)
        };

        Ok(Self {
            channels: channels.max(1) as usize,
            resampler,
            pending: Vec::new(),
        })
    }

    /// Feed interleaved device samples; returns whatever mono output is ready
    pub fn push(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let mono = downmix(interleaved, self.channels);

        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(mono);
        };

        self.pending.extend_from_slice(&mono);

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }

            let block: Vec<f32> = self.pending.drain(..needed).collect();
            let waves_out = resampler
                .process(&[block], None)
                .context("Resampling failed")?;
            output.extend_from_slice(&waves_out[0]);
        }

        Ok(output)
    }
}
