//! Input source selection and resolution.
//!
//! The player accepts a local file path, an already-open byte stream, or a
//! URL. The three kinds are a tagged variant resolved once per `play` into
//! a decoder media source plus a format hint.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use symphonia::core::io::{MediaSource, ReadOnlySource};
use symphonia::core::probe::Hint;

use crate::error::PlayerError;
use crate::http_stream::HttpReader;

/// One input for the player. Mutually exclusive; the last `open_*` wins.
pub enum Source {
    /// Local file path; the extension becomes the probe hint.
    Path(PathBuf),
    /// An already-open byte stream, consumed by the first playback session.
    Stream(Option<Box<dyn Read + Send + Sync>>),
    /// Remote URL, handed verbatim to the HTTP range loader.
    Url(String),
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Source::Stream(_) => f.write_str("Stream(..)"),
            Source::Url(url) => f.debug_tuple("Url").field(url).finish(),
        }
    }
}

impl Source {
    /// Resolve into a decoder media source plus a format hint.
    ///
    /// Byte streams can only be resolved once; a second attempt reports
    /// [`PlayerError::SourceConsumed`].
    pub(crate) fn resolve(&mut self) -> Result<(Box<dyn MediaSource>, Hint), PlayerError> {
        match self {
            Source::Path(path) => resolve_path(path),
            Source::Stream(reader) => {
                let reader = reader.take().ok_or(PlayerError::SourceConsumed)?;
                Ok((Box::new(ReadOnlySource::new(reader)), Hint::new()))
            }
            Source::Url(url) => resolve_url(url),
        }
    }

    /// Descriptor the worker uses to re-resolve this source on loop
    /// restarts. Byte streams are not reopenable.
    pub(crate) fn reopen_spec(&self) -> ReopenSpec {
        match self {
            Source::Path(path) => ReopenSpec::Path(path.clone()),
            Source::Stream(_) => ReopenSpec::None,
            Source::Url(url) => ReopenSpec::Url(url.clone()),
        }
    }
}

/// Reopenable description of a session's source.
#[derive(Clone, Debug)]
pub(crate) enum ReopenSpec {
    Path(PathBuf),
    Url(String),
    None,
}

impl ReopenSpec {
    /// Re-resolve for a loop restart; `None` when the source kind cannot be
    /// reopened.
    pub(crate) fn resolve(&self) -> Option<Result<(Box<dyn MediaSource>, Hint), PlayerError>> {
        match self {
            ReopenSpec::Path(path) => Some(resolve_path(path)),
            ReopenSpec::Url(url) => Some(resolve_url(url)),
            ReopenSpec::None => None,
        }
    }
}

fn resolve_path(path: &Path) -> Result<(Box<dyn MediaSource>, Hint), PlayerError> {
    let file = File::open(path)?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    Ok((Box::new(file), hint))
}

fn resolve_url(url: &str) -> Result<(Box<dyn MediaSource>, Hint), PlayerError> {
    let mut hint = Hint::new();
    if let Some(ext) = infer_ext_from_url(url) {
        hint.with_extension(&ext);
    }
    Ok((Box::new(HttpReader::new(url.to_string())), hint))
}

/// Infer a file extension from the URL path if present.
fn infer_ext_from_url(url: &str) -> Option<String> {
    let tail = url.split('?').next().unwrap_or(url);
    let file = tail.rsplit('/').next().unwrap_or(tail);
    let mut parts = file.rsplit('.');
    let ext = parts.next()?;
    if parts.next().is_some() {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_ext_from_url_handles_query_and_missing_ext() {
        assert_eq!(
            infer_ext_from_url("http://example/a.flac?x=1"),
            Some("flac".to_string())
        );
        assert_eq!(infer_ext_from_url("http://example/a"), None);
    }

    #[test]
    fn infer_ext_from_url_takes_last_dot_segment() {
        assert_eq!(
            infer_ext_from_url("http://example/archive.track.FLAC"),
            Some("flac".to_string())
        );
    }

    #[test]
    fn stream_resolves_once_then_reports_consumed() {
        let mut source = Source::Stream(Some(Box::new(std::io::empty())));
        assert!(source.resolve().is_ok());
        assert!(matches!(
            source.resolve(),
            Err(PlayerError::SourceConsumed)
        ));
    }

    #[test]
    fn missing_file_reports_io() {
        let mut source = Source::Path(PathBuf::from("/definitely/not/here.flac"));
        assert!(matches!(source.resolve(), Err(PlayerError::Io(_))));
    }

    #[test]
    fn reopen_spec_follows_source_kind() {
        assert!(matches!(
            Source::Path(PathBuf::from("x.wav")).reopen_spec(),
            ReopenSpec::Path(_)
        ));
        assert!(matches!(
            Source::Url("http://example/x.wav".to_string()).reopen_spec(),
            ReopenSpec::Url(_)
        ));
        assert!(matches!(
            Source::Stream(Some(Box::new(std::io::empty()))).reopen_spec(),
            ReopenSpec::None
        ));
    }
}
