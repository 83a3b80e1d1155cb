//! Decoding setup and the decoded-audio cursor.
//!
//! Format sniffing and packet decoding are delegated to Symphonia. The
//! negotiated target is always 16-bit signed little-endian PCM at the
//! source sample rate and channel count; [`DecodedStream`] serves the copy
//! loop fixed-size chunks of that format.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::PlayerError;
use crate::metadata::Metadata;

/// Fixed PCM format negotiated from the source.
///
/// Always 16-bit signed little-endian interleaved, regardless of the depth
/// the source reports; sample rate and channel count follow the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

impl TargetFormat {
    pub const BITS_PER_SAMPLE: u16 = 16;

    /// Bytes per frame: one 16-bit sample per channel.
    pub fn frame_bytes(&self) -> usize {
        self.channels * 2
    }

    fn from_params(params: &CodecParameters) -> Result<Self, PlayerError> {
        let sample_rate = params
            .sample_rate
            .filter(|rate| *rate > 0)
            .ok_or_else(|| PlayerError::UnsupportedFormat("source reports no sample rate".into()))?;
        let channels = params
            .channels
            .map(|c| c.count())
            .filter(|count| *count > 0)
            .ok_or_else(|| PlayerError::UnsupportedFormat("source reports no channels".into()))?;
        Ok(Self {
            sample_rate,
            channels,
        })
    }
}

/// Probe a resolved media source, set up decoding, and capture metadata.
///
/// Failures leave nothing half-initialized: either a usable cursor and a
/// fresh metadata dictionary come back, or a typed error does.
pub(crate) fn open_stream(
    source: Box<dyn MediaSource>,
    hint: Hint,
) -> Result<(DecodedStream, Metadata), PlayerError> {
    let mss = MediaSourceStream::new(source, Default::default());
    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(setup_error)?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| PlayerError::UnsupportedFormat("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let target = TargetFormat::from_params(&codec_params)?;

    let decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(setup_error)?;

    let mut metadata = Metadata::default();
    metadata.apply_codec_params(&codec_params);
    if let Some(rev) = probed.format.metadata().current() {
        metadata.apply_tags(rev.tags());
    } else if let Some(rev) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
        metadata.apply_tags(rev.tags());
    }

    tracing::info!(
        rate_hz = target.sample_rate,
        channels = target.channels,
        "decode session open"
    );

    Ok((
        DecodedStream {
            format: probed.format,
            decoder,
            track_id,
            target,
            sample_buf: None,
            pending: Vec::new(),
        },
        metadata,
    ))
}

/// Cursor over the decoded PCM of one source.
///
/// Owned exclusively by the playback worker while a session is active.
pub struct DecodedStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    target: TargetFormat,
    sample_buf: Option<SampleBuffer<i16>>,
    pending: Vec<i16>,
}

impl std::fmt::Debug for DecodedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedStream")
            .field("track_id", &self.track_id)
            .field("target", &self.target)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl DecodedStream {
    pub fn target(&self) -> TargetFormat {
        self.target
    }

    /// Read the next chunk of target-format samples, up to `max_samples`.
    ///
    /// Returns whole frames only, and `None` once the decoder reports
    /// end-of-data and the pending buffer is exhausted. Malformed packets
    /// are skipped; I/O failures propagate and end the session.
    pub fn read_chunk(&mut self, max_samples: usize) -> Result<Option<Vec<i16>>, PlayerError> {
        let max = max_samples.max(self.target.channels);
        while self.pending.len() < max {
            if !self.decode_next_packet()? {
                break;
            }
        }
        if self.pending.is_empty() {
            return Ok(None);
        }
        let mut take = self.pending.len().min(max);
        take -= take % self.target.channels;
        if take == 0 {
            // trailing partial frame; hand it out rather than spin
            take = self.pending.len();
        }
        Ok(Some(self.pending.drain(..take).collect()))
    }

    /// Decode one packet into `pending`. Returns `false` at end-of-data.
    fn decode_next_packet(&mut self) -> Result<bool, PlayerError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(SymphoniaError::IoError(e)) => return Err(PlayerError::Io(e)),
                Err(other) => {
                    return Err(PlayerError::UnsupportedFormat(other.to_string()));
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(err)) => {
                    tracing::warn!("skipping malformed packet: {err}");
                    continue;
                }
                Err(SymphoniaError::IoError(e)) => return Err(PlayerError::Io(e)),
                Err(other) => {
                    return Err(PlayerError::UnsupportedFormat(other.to_string()));
                }
            };
            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let capacity = decoded.capacity() as u64;
            let buf = self
                .sample_buf
                .get_or_insert_with(|| SampleBuffer::new(capacity, spec));
            buf.copy_interleaved_ref(decoded);
            self.pending.extend_from_slice(buf.samples());
            return Ok(true);
        }
    }
}

fn setup_error(e: SymphoniaError) -> PlayerError {
    match e {
        SymphoniaError::IoError(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            PlayerError::UnsupportedFormat("end of stream before any recognizable format".into())
        }
        SymphoniaError::IoError(e) => PlayerError::Io(e),
        other => PlayerError::UnsupportedFormat(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use symphonia::core::io::MediaSource;

    struct MemSource(Cursor<Vec<u8>>);

    impl std::io::Read for MemSource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl std::io::Seek for MemSource {
        fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
            self.0.seek(pos)
        }
    }

    impl MediaSource for MemSource {
        fn is_seekable(&self) -> bool {
            true
        }

        fn byte_len(&self) -> Option<u64> {
            Some(self.0.get_ref().len() as u64)
        }
    }

    /// Minimal PCM WAV container around `samples`.
    fn wav_bytes(rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + samples.len() * 2);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * u32::from(channels) * 2).to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    fn open_wav(rate: u32, channels: u16, samples: &[i16]) -> (DecodedStream, Metadata) {
        let bytes = wav_bytes(rate, channels, samples);
        let mut hint = Hint::new();
        hint.with_extension("wav");
        open_stream(Box::new(MemSource(Cursor::new(bytes))), hint).unwrap()
    }

    #[test]
    fn negotiates_target_from_source() {
        let (stream, _meta) = open_wav(44_100, 2, &[0i16; 8]);
        let target = stream.target();
        assert_eq!(target.sample_rate, 44_100);
        assert_eq!(target.channels, 2);
        assert_eq!(target.frame_bytes(), 4);
    }

    #[test]
    fn reads_all_samples_then_end_of_data() {
        let samples: Vec<i16> = (0..32).collect();
        let (mut stream, _meta) = open_wav(8_000, 2, &samples);

        let mut got = Vec::new();
        while let Some(chunk) = stream.read_chunk(1024).unwrap() {
            got.extend_from_slice(&chunk);
        }
        assert_eq!(got, samples);
        assert!(stream.read_chunk(1024).unwrap().is_none());
    }

    #[test]
    fn read_chunk_caps_at_whole_frames() {
        let samples: Vec<i16> = (0..24).collect();
        let (mut stream, _meta) = open_wav(8_000, 2, &samples);

        let chunk = stream.read_chunk(7).unwrap().unwrap();
        // 7 samples rounds down to 3 whole stereo frames
        assert_eq!(chunk.len(), 6);
        assert_eq!(chunk, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn wav_metadata_has_stream_fields_but_no_tags() {
        let (_stream, meta) = open_wav(8_000, 1, &[0i16; 16]);
        assert_eq!(
            meta.get("sample.rate.hz"),
            Some(&crate::metadata::MetaValue::Integer(8_000))
        );
        assert_eq!(
            meta.get("duration.ms"),
            Some(&crate::metadata::MetaValue::Integer(2))
        );
        for key in ["title", "author", "album", "date", "copyright", "comment"] {
            assert!(meta.get(key).is_none(), "unexpected tag key {key}");
        }
    }

    #[test]
    fn garbage_input_is_unsupported() {
        let bytes = vec![0u8; 64];
        let err = open_stream(
            Box::new(MemSource(Cursor::new(bytes))),
            Hint::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PlayerError::UnsupportedFormat(_)));
    }
}
