//! Output device discovery and config negotiation.
//!
//! Picks an output device (host default or by substring) and the supported
//! config nearest the source sample rate. Failure to obtain either is fatal
//! for the `play` call that asked.

use std::cmp::Reverse;

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::PlayerError;

/// Pick the output device for a session: the host default, or the first
/// device whose name contains `needle` (case-insensitive).
pub(crate) fn pick_device(
    host: &cpal::Host,
    needle: Option<&str>,
) -> Result<cpal::Device, PlayerError> {
    let Some(needle) = needle else {
        return host
            .default_output_device()
            .ok_or_else(|| PlayerError::DeviceUnavailable("no default output device".into()));
    };

    let wanted = needle.trim().to_lowercase();
    let mut devices = host
        .output_devices()
        .map_err(|e| PlayerError::DeviceUnavailable(format!("no output devices: {e}")))?;
    if wanted.is_empty() {
        return Err(no_match(needle));
    }
    devices
        .find(|d| device_name(d).is_some_and(|name| name.to_lowercase().contains(&wanted)))
        .ok_or_else(|| no_match(needle))
}

/// Choose the supported output config nearest `target_rate`.
///
/// Each supported range contributes one candidate at the target rate when
/// covered, clamped to the nearer bound otherwise; [`rank`] orders the
/// candidates.
pub(crate) fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig, PlayerError> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| PlayerError::DeviceUnavailable(format!("no supported output configs: {e}")))?;

    ranges
        .map(|range| {
            let rate = match target_rate {
                Some(t) => t.clamp(range.min_sample_rate(), range.max_sample_rate()),
                None => range.max_sample_rate(),
            };
            let key = rank(rate, target_rate, range.sample_format());
            (key, range.with_sample_rate(rate))
        })
        .min_by_key(|(key, _)| *key)
        .map(|(_, cfg)| cfg)
        .ok_or_else(|| PlayerError::DeviceUnavailable("no supported output configs".into()))
}

/// Print the host's output devices.
pub fn list_devices() -> Result<(), PlayerError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| PlayerError::DeviceUnavailable(format!("no output devices: {e}")))?;
    for (i, device) in devices.enumerate() {
        match device.description() {
            Ok(description) => println!("#{i}: {description}"),
            Err(e) => println!("#{i}: <unavailable: {e}>"),
        }
    }
    Ok(())
}

/// Candidate order, lower is better: rates at or below the target beat
/// rates above it, higher rates win within a group, then the friendlier
/// sample format breaks ties.
fn rank(rate: u32, target_rate: Option<u32>, format: cpal::SampleFormat) -> (bool, Reverse<u32>, u8) {
    let above = target_rate.is_some_and(|t| rate > t);
    (above, Reverse(rate), format_preference(format))
}

fn format_preference(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn device_name(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|d| d.name().to_string())
}

fn no_match(needle: &str) -> PlayerError {
    PlayerError::DeviceUnavailable(format!("no output device matched: {needle}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::SampleFormat;

    #[test]
    fn rank_prefers_rates_at_or_below_target() {
        assert!(rank(48_000, Some(48_000), SampleFormat::F32) < rank(96_000, Some(48_000), SampleFormat::F32));
        assert!(rank(44_100, Some(48_000), SampleFormat::F32) < rank(88_200, Some(48_000), SampleFormat::F32));
    }

    #[test]
    fn rank_prefers_higher_rate_within_a_group() {
        assert!(rank(48_000, Some(96_000), SampleFormat::I16) < rank(44_100, Some(96_000), SampleFormat::I16));
    }

    #[test]
    fn rank_breaks_rate_ties_on_format() {
        assert!(rank(48_000, Some(48_000), SampleFormat::F32) < rank(48_000, Some(48_000), SampleFormat::I16));
        assert!(rank(48_000, Some(48_000), SampleFormat::I16) < rank(48_000, Some(48_000), SampleFormat::U16));
    }

    #[test]
    fn rank_without_target_treats_all_rates_as_usable() {
        assert!(rank(96_000, None, SampleFormat::F32) < rank(48_000, None, SampleFormat::F32));
    }

    #[test]
    fn target_clamps_into_each_range() {
        // in range: exact match
        assert_eq!(48_000u32.clamp(44_100, 96_000), 48_000);
        // below the range: its minimum
        assert_eq!(22_050u32.clamp(44_100, 96_000), 44_100);
        // above the range: its maximum
        assert_eq!(192_000u32.clamp(44_100, 96_000), 96_000);
    }
}
