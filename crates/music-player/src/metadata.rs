//! Per-session metadata dictionary.
//!
//! Rebuilt from scratch on every `play` from what the prober reports:
//! tag-derived entries when the source carries tag metadata, and
//! stream-derived technical entries from the codec parameters. Never merged
//! across sessions.

use std::collections::HashMap;
use std::fmt;

use symphonia::core::codecs::CodecParameters;
use symphonia::core::meta::{StandardTagKey, Tag};

/// An opaque metadata value.
#[derive(Clone, Debug, PartialEq)]
pub enum MetaValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Text(s) => f.write_str(s),
            MetaValue::Integer(v) => write!(f, "{v}"),
            MetaValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// String-keyed dictionary describing the currently opened source.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    entries: HashMap<String, MetaValue>,
}

impl Metadata {
    /// Look up a value; unknown keys and tag keys of tag-less sources are
    /// absent.
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over all present keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn insert_text(&mut self, key: &str, value: String) {
        if !value.is_empty() {
            self.entries.insert(key.to_string(), MetaValue::Text(value));
        }
    }

    fn insert_int(&mut self, key: &str, value: i64) {
        self.entries.insert(key.to_string(), MetaValue::Integer(value));
    }

    /// Fold decoder-reported tags into the dictionary.
    ///
    /// Only the first occurrence of each mapped key wins, matching the
    /// prober's revision ordering.
    pub(crate) fn apply_tags(&mut self, tags: &[Tag]) {
        for tag in tags {
            let Some(key) = tag.std_key.and_then(tag_key_name) else {
                continue;
            };
            if self.entries.contains_key(key) {
                continue;
            }
            self.insert_text(key, tag.value.to_string());
        }
    }

    /// Fold stream parameters into the dictionary.
    pub(crate) fn apply_codec_params(&mut self, params: &CodecParameters) {
        if let Some(ms) = duration_ms_from_params(params) {
            self.insert_int("duration.ms", ms as i64);
        }
        if let Some(name) = codec_name_from_params(params) {
            self.insert_text("codec", name);
        }
        if let Some(rate) = params.sample_rate {
            self.insert_int("sample.rate.hz", rate as i64);
        }
        if let Some(channels) = params.channels {
            self.insert_int("channels", channels.count() as i64);
        }
        if let Some(bits) = params.bits_per_sample.or(params.bits_per_coded_sample) {
            self.insert_int("bits.per.sample", bits as i64);
        }
        if let Some(frames) = params.n_frames {
            self.insert_int("length.frames", frames as i64);
        }
    }
}

/// Dictionary key for a standard tag, or `None` for tags we do not carry.
fn tag_key_name(key: StandardTagKey) -> Option<&'static str> {
    let name = match key {
        StandardTagKey::TrackTitle => "title",
        StandardTagKey::Artist => "author",
        StandardTagKey::Album => "album",
        StandardTagKey::Date => "date",
        StandardTagKey::Copyright => "copyright",
        StandardTagKey::Comment => "comment",
        StandardTagKey::Genre => "genre",
        StandardTagKey::Composer => "composer",
        StandardTagKey::TrackNumber => "track.number",
        StandardTagKey::Encoder => "encoder",
        _ => return None,
    };
    Some(name)
}

/// Best-effort duration in milliseconds from codec parameters.
fn duration_ms_from_params(params: &CodecParameters) -> Option<u64> {
    let frames = params.n_frames?;
    let rate = params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

/// Best-effort codec label.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::codecs::CODEC_TYPE_FLAC;
    use symphonia::core::meta::Value;

    fn tag(std_key: StandardTagKey, value: &str) -> Tag {
        Tag::new(Some(std_key), "", Value::String(value.to_string()))
    }

    #[test]
    fn apply_tags_maps_standard_keys() {
        let mut meta = Metadata::default();
        meta.apply_tags(&[
            tag(StandardTagKey::TrackTitle, "Some Song"),
            tag(StandardTagKey::Artist, "Some Artist"),
            tag(StandardTagKey::Album, "Some Album"),
            tag(StandardTagKey::Comment, "hello"),
        ]);

        assert_eq!(
            meta.get("title"),
            Some(&MetaValue::Text("Some Song".to_string()))
        );
        assert_eq!(
            meta.get("author"),
            Some(&MetaValue::Text("Some Artist".to_string()))
        );
        assert_eq!(
            meta.get("album"),
            Some(&MetaValue::Text("Some Album".to_string()))
        );
        assert_eq!(
            meta.get("comment"),
            Some(&MetaValue::Text("hello".to_string()))
        );
    }

    #[test]
    fn apply_tags_first_occurrence_wins() {
        let mut meta = Metadata::default();
        meta.apply_tags(&[
            tag(StandardTagKey::TrackTitle, "first"),
            tag(StandardTagKey::TrackTitle, "second"),
        ]);
        assert_eq!(meta.get("title"), Some(&MetaValue::Text("first".to_string())));
    }

    #[test]
    fn apply_tags_skips_unmapped_and_empty() {
        let mut meta = Metadata::default();
        meta.apply_tags(&[
            Tag::new(None, "CUSTOM", Value::String("x".to_string())),
            tag(StandardTagKey::TrackTitle, ""),
        ]);
        assert!(meta.is_empty());
    }

    #[test]
    fn tag_less_source_has_no_tag_keys() {
        let meta = Metadata::default();
        for key in [
            "title",
            "author",
            "album",
            "date",
            "copyright",
            "comment",
        ] {
            assert!(meta.get(key).is_none());
        }
    }

    #[test]
    fn apply_codec_params_reports_stream_fields() {
        let mut params = CodecParameters::new();
        params.codec = CODEC_TYPE_FLAC;
        params.sample_rate = Some(48_000);
        params.n_frames = Some(96_000);
        params.bits_per_sample = Some(16);

        let mut meta = Metadata::default();
        meta.apply_codec_params(&params);

        assert_eq!(meta.get("duration.ms"), Some(&MetaValue::Integer(2000)));
        assert_eq!(
            meta.get("codec"),
            Some(&MetaValue::Text("FLAC".to_string()))
        );
        assert_eq!(meta.get("sample.rate.hz"), Some(&MetaValue::Integer(48_000)));
        assert_eq!(meta.get("bits.per.sample"), Some(&MetaValue::Integer(16)));
        assert_eq!(meta.get("length.frames"), Some(&MetaValue::Integer(96_000)));
    }

    #[test]
    fn duration_ms_handles_zero_rate() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(0);
        params.n_frames = Some(100);
        assert!(duration_ms_from_params(&params).is_none());
    }

    #[test]
    fn unknown_key_is_absent() {
        let meta = Metadata::default();
        assert!(meta.get("no.such.key").is_none());
    }
}
