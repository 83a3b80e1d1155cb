//! Inline sample-rate conversion for the output line.
//!
//! When the device cannot open at the source rate, the line converts with a
//! streaming Rubato sinc resampler. Conversion runs inline on the playback
//! worker as part of each write, so the session keeps a single worker
//! thread.

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::error::PlayerError;

/// Input chunk size in frames for the steady-state loop.
const CHUNK_FRAMES: usize = 1024;

/// Streaming converter from the source rate to the device rate.
pub(crate) struct StreamResampler {
    resampler: Async<f32>,
    channels: usize,
    /// Carry-over input that has not yet filled a whole chunk.
    input: Vec<f32>,
    /// Scratch sized to the resampler's maximum output.
    output: Vec<f32>,
}

impl StreamResampler {
    pub(crate) fn new(
        src_rate: u32,
        dst_rate: u32,
        channels: usize,
    ) -> Result<Self, PlayerError> {
        let f_ratio = dst_rate as f64 / src_rate as f64;

        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };

        let resampler = Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &params,
            CHUNK_FRAMES,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| PlayerError::DeviceUnavailable(format!("resampler init: {e}")))?;

        let output = vec![0.0f32; resampler.output_frames_max() * channels];
        Ok(Self {
            resampler,
            channels,
            input: Vec::new(),
            output,
        })
    }

    /// Feed interleaved source-rate samples; append device-rate output to
    /// `out`.
    pub(crate) fn process(&mut self, samples: &[f32], out: &mut Vec<f32>) -> Result<(), PlayerError> {
        self.input.extend_from_slice(samples);
        let chunk_samples = CHUNK_FRAMES * self.channels;
        let mut consumed = 0;
        while self.input.len() - consumed >= chunk_samples {
            let produced = run_chunk(
                &mut self.resampler,
                &mut self.output,
                self.channels,
                &self.input[consumed..consumed + chunk_samples],
                CHUNK_FRAMES,
                None,
            )?;
            out.extend_from_slice(&self.output[..produced]);
            consumed += chunk_samples;
        }
        self.input.drain(..consumed);
        Ok(())
    }

    /// Drain the partial tail at end-of-stream.
    pub(crate) fn finish(&mut self, out: &mut Vec<f32>) -> Result<(), PlayerError> {
        let tail_frames = self.input.len() / self.channels;
        if tail_frames == 0 {
            self.input.clear();
            return Ok(());
        }
        let tail: Vec<f32> = self.input.drain(..).collect();
        let produced = run_chunk(
            &mut self.resampler,
            &mut self.output,
            self.channels,
            &tail,
            tail_frames,
            Some(tail_frames),
        )?;
        out.extend_from_slice(&self.output[..produced]);
        Ok(())
    }
}

/// Resample one input chunk into `output` scratch.
///
/// Returns the produced sample count.
fn run_chunk(
    resampler: &mut Async<f32>,
    output: &mut [f32],
    channels: usize,
    chunk: &[f32],
    frames: usize,
    partial_len: Option<usize>,
) -> Result<usize, PlayerError> {
    let input_adapter = InterleavedSlice::new(chunk, channels, frames)
        .map_err(|e| PlayerError::DeviceUnavailable(format!("resampler input: {e}")))?;

    let out_capacity_frames = output.len() / channels;
    let mut output_adapter = InterleavedSlice::new_mut(output, channels, out_capacity_frames)
        .map_err(|e| PlayerError::DeviceUnavailable(format!("resampler output: {e}")))?;

    let indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len,
    };

    let (_consumed, produced_frames) = resampler
        .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
        .map_err(|e| PlayerError::DeviceUnavailable(format!("resampler process: {e}")))?;

    Ok(produced_frames * channels)
}
