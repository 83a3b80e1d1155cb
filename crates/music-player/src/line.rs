//! The output line: negotiated CPAL stream, bounded buffer, and gain.
//!
//! An [`OutputLine`] is the open handle to the output device accepting
//! target-format PCM writes. It lives entirely on the playback worker
//! thread (CPAL streams do not move across threads); the real-time callback
//! drains the line buffer, maps channels, applies gain, and converts to the
//! device sample format.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::PlayerConfig;
use crate::decode::TargetFormat;
use crate::device;
use crate::error::PlayerError;
use crate::queue::{LineBuffer, buffer_capacity_samples};
use crate::resample::StreamResampler;

/// Max frames pulled from the line buffer per callback refill.
const REFILL_MAX_FRAMES: usize = 4096;

/// Master-gain control in decibels, applied by the output callback.
#[derive(Clone, Debug)]
pub(crate) struct GainControl {
    level_db_bits: Arc<AtomicU32>,
}

impl GainControl {
    pub(crate) const MIN_DB: f32 = -80.0;
    pub(crate) const MAX_DB: f32 = 6.0;

    pub(crate) fn new() -> Self {
        Self {
            level_db_bits: Arc::new(AtomicU32::new(0.0f32.to_bits())),
        }
    }

    pub(crate) fn value(&self) -> f32 {
        f32::from_bits(self.level_db_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set(&self, db: f32) {
        let clamped = db.clamp(Self::MIN_DB, Self::MAX_DB);
        self.level_db_bits.store(clamped.to_bits(), Ordering::Relaxed);
    }

    /// Linear amplitude for the current decibel level.
    fn amplitude(&self) -> f32 {
        10f32.powf(self.value() / 20.0)
    }
}

/// Open handle to an output device accepting PCM writes.
pub(crate) struct OutputLine {
    // held for its lifetime; dropping releases the device
    _stream: cpal::Stream,
    buffer: Arc<LineBuffer>,
    resampler: Option<StreamResampler>,
    gain: Option<GainControl>,
    staging: Vec<f32>,
    resampled: Vec<f32>,
}

impl OutputLine {
    /// Negotiate a device config for the target format and start the
    /// stream.
    ///
    /// The stream keeps the device's default buffer size; the line buffer
    /// is sized to `buffer_seconds` and provides the write backpressure.
    pub(crate) fn open(target: &TargetFormat, cfg: &PlayerConfig) -> Result<Self, PlayerError> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, cfg.device.as_deref())?;
        let config = device::pick_output_config(&device, Some(target.sample_rate))?;
        let stream_config: cpal::StreamConfig = config.clone().into();
        let device_rate = stream_config.sample_rate;

        let capacity = buffer_capacity_samples(device_rate, target.channels, cfg.buffer_seconds);
        let buffer = Arc::new(LineBuffer::new(target.channels, capacity));
        let gain = GainControl::new();

        let stream = build_output_stream(
            &device,
            &stream_config,
            config.sample_format(),
            &buffer,
            gain.clone(),
        )?;
        stream
            .play()
            .map_err(|e| PlayerError::DeviceUnavailable(format!("start output stream: {e}")))?;

        let resampler = if device_rate != target.sample_rate {
            tracing::info!(
                from_hz = target.sample_rate,
                to_hz = device_rate,
                "line resampling"
            );
            Some(StreamResampler::new(
                target.sample_rate,
                device_rate,
                target.channels,
            )?)
        } else {
            None
        };

        tracing::info!(
            device = %device
                .description()
                .map(|d| d.to_string())
                .unwrap_or_else(|_| "unknown".into()),
            rate_hz = device_rate,
            buffer_samples = capacity,
            "output line open"
        );

        Ok(Self {
            _stream: stream,
            buffer,
            resampler,
            gain: Some(gain),
            staging: Vec::new(),
            resampled: Vec::new(),
        })
    }

    /// The line's master-gain control, when it carries one.
    pub(crate) fn gain(&self) -> Option<GainControl> {
        self.gain.clone()
    }

    /// Write target-format PCM, blocking while the line buffer is full.
    pub(crate) fn write(&mut self, pcm: &[i16]) -> Result<(), PlayerError> {
        self.staging.clear();
        self.staging
            .extend(pcm.iter().map(|s| f32::from(*s) / 32768.0));

        match self.resampler.as_mut() {
            Some(rs) => {
                self.resampled.clear();
                rs.process(&self.staging, &mut self.resampled)?;
                self.buffer.push_blocking(&self.resampled);
            }
            None => self.buffer.push_blocking(&self.staging),
        }
        Ok(())
    }

    /// Natural end-of-stream: flush the conversion tail and block until the
    /// device has consumed everything, then release it.
    pub(crate) fn drain(mut self) -> Result<(), PlayerError> {
        if let Some(mut rs) = self.resampler.take() {
            let mut tail = Vec::new();
            rs.finish(&mut tail)?;
            self.buffer.push_blocking(&tail);
        }
        self.buffer.close();
        self.buffer.wait_drained();
        // let the device play out its in-flight callback buffer
        std::thread::sleep(Duration::from_millis(100));
        Ok(())
    }

    /// Stop request: discard buffered audio and release the device.
    pub(crate) fn flush(self) {
        self.buffer.clear_and_close();
    }
}

/// Build a CPAL output stream draining `buffer`, dispatched on the device
/// sample format.
fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    buffer: &Arc<LineBuffer>,
    gain: GainControl,
) -> Result<cpal::Stream, PlayerError> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, buffer, gain),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, buffer, gain),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, buffer, gain),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, buffer, gain),
        other => Err(PlayerError::DeviceUnavailable(format!(
            "unsupported sample format: {other:?}"
        ))),
    }
}

/// Local render state for the output callback.
///
/// A small vector of samples fetched from the line buffer keeps the
/// callback from locking the queue for every frame.
struct RenderState {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: &Arc<LineBuffer>,
    gain: GainControl,
) -> Result<cpal::Stream, PlayerError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;

    let state = Arc::new(Mutex::new(RenderState {
        pos: 0,
        src_channels: buffer.channels(),
        src: Vec::new(),
    }));

    let queue = buffer.clone();
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let state_cb = state.clone();
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let amp = gain.amplitude();
                let mut st = state_cb.lock().unwrap();

                let frames = data.len() / channels_out;
                for frame in 0..frames {
                    if st.pos >= st.src.len() {
                        st.pos = 0;
                        st.src.clear();
                        if let Some(v) = queue.pop_chunk(REFILL_MAX_FRAMES) {
                            st.src = v;
                        } else {
                            // no audio ready; fill the rest with silence
                            for idx in (frame * channels_out)..data.len() {
                                data[idx] = <T as cpal::Sample>::from_sample::<f32>(0.0);
                            }
                            break;
                        }
                    }
                    for ch in 0..channels_out {
                        let sample = next_sample_mapped(&mut st, channels_out, ch) * amp;
                        data[frame * channels_out + ch] =
                            <T as cpal::Sample>::from_sample::<f32>(sample);
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| PlayerError::DeviceUnavailable(format!("build output stream: {e}")))?;

    Ok(stream)
}

/// Read one output sample for `dst_ch`, applying a simple channel mapping.
///
/// Mapping rules:
/// - mono -> stereo: duplicate channel 0
/// - stereo -> mono: average L/R
/// - matching layouts: pass-through
/// - other layouts: clamp to available channels
///
/// `st.pos` advances one source frame after the last destination channel.
fn next_sample_mapped(st: &mut RenderState, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }

    let frame_start = st.pos;
    let get_src = |ch: usize, st: &RenderState| -> f32 {
        if ch < st.src_channels && frame_start + ch < st.src.len() {
            st.src[frame_start + ch]
        } else {
            0.0
        }
    };

    let out = match (st.src_channels, dst_channels) {
        (1, 1) => get_src(0, st),
        (2, 2) => get_src(dst_ch.min(1), st),
        (2, 1) => 0.5 * (get_src(0, st) + get_src(1, st)),
        (1, 2) => get_src(0, st),
        _ => get_src(dst_ch.min(st.src_channels.saturating_sub(1)), st),
    };

    if dst_ch + 1 == dst_channels {
        st.pos += st.src_channels;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_defaults_to_unity() {
        let gain = GainControl::new();
        assert_eq!(gain.value(), 0.0);
        assert!((gain.amplitude() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn gain_clamps_to_bounds() {
        let gain = GainControl::new();
        gain.set(-200.0);
        assert_eq!(gain.value(), GainControl::MIN_DB);
        gain.set(40.0);
        assert_eq!(gain.value(), GainControl::MAX_DB);
    }

    #[test]
    fn gain_attenuation_halves_amplitude_near_six_db() {
        let gain = GainControl::new();
        gain.set(-6.0);
        let amp = gain.amplitude();
        assert!((amp - 0.501).abs() < 0.01, "got {amp}");
    }

    #[test]
    fn mono_source_duplicates_into_stereo() {
        let mut st = RenderState {
            pos: 0,
            src_channels: 1,
            src: vec![0.5, -0.5],
        };
        assert_eq!(next_sample_mapped(&mut st, 2, 0), 0.5);
        assert_eq!(next_sample_mapped(&mut st, 2, 1), 0.5);
        assert_eq!(next_sample_mapped(&mut st, 2, 0), -0.5);
        assert_eq!(next_sample_mapped(&mut st, 2, 1), -0.5);
    }

    #[test]
    fn stereo_source_averages_into_mono() {
        let mut st = RenderState {
            pos: 0,
            src_channels: 2,
            src: vec![1.0, 0.0, 0.0, 1.0],
        };
        assert_eq!(next_sample_mapped(&mut st, 1, 0), 0.5);
        assert_eq!(next_sample_mapped(&mut st, 1, 0), 0.5);
    }

    #[test]
    fn stereo_passthrough_keeps_order() {
        let mut st = RenderState {
            pos: 0,
            src_channels: 2,
            src: vec![0.1, 0.2, 0.3, 0.4],
        };
        assert_eq!(next_sample_mapped(&mut st, 2, 0), 0.1);
        assert_eq!(next_sample_mapped(&mut st, 2, 1), 0.2);
        assert_eq!(next_sample_mapped(&mut st, 2, 0), 0.3);
        assert_eq!(next_sample_mapped(&mut st, 2, 1), 0.4);
    }

    #[test]
    fn exhausted_state_yields_silence() {
        let mut st = RenderState {
            pos: 0,
            src_channels: 2,
            src: Vec::new(),
        };
        assert_eq!(next_sample_mapped(&mut st, 2, 0), 0.0);
    }
}
