//! HTTP range loader for URL sources.
//!
//! Presents a remote file to the decoder as a seekable media source. Bytes
//! arrive through Range requests one block at a time, and the most recent
//! block stays cached so the prober's short back-and-forth seeks do not
//! refetch. The URL is used verbatim; a server that ignores Range still
//! works as long as it reports a content length.

use std::io::{self, Read, Seek, SeekFrom};
use std::time::Duration;

use symphonia::core::io::MediaSource;

/// Bytes fetched per Range request.
const BLOCK_BYTES: u64 = 256 * 1024;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Seekable reader over a remote file.
pub(crate) struct HttpReader {
    url: String,
    pos: u64,
    /// Total remote length, once a response has reported it.
    total: Option<u64>,
    /// Most recently fetched block and its absolute start offset.
    window: Vec<u8>,
    window_at: u64,
}

impl HttpReader {
    pub(crate) fn new(url: String) -> Self {
        Self {
            url,
            pos: 0,
            total: None,
            window: Vec::new(),
            window_at: 0,
        }
    }

    /// Offset of `pos` inside the cached window, when the window covers it.
    fn window_offset(&self) -> Option<usize> {
        let rel = self.pos.checked_sub(self.window_at)?;
        (rel < self.window.len() as u64).then_some(rel as usize)
    }

    /// Replace the window with the block starting at `start`.
    fn load_window(&mut self, start: u64) -> io::Result<()> {
        let mut end = start.saturating_add(BLOCK_BYTES - 1);
        if let Some(total) = self.total.filter(|t| *t > 0) {
            end = end.min(total - 1);
        }

        let resp = ureq::get(&self.url)
            .config()
            .timeout_per_call(Some(REQUEST_TIMEOUT))
            .build()
            .header("Range", &format!("bytes={start}-{end}"))
            .call()
            .map_err(|e| io::Error::other(format!("http range request failed: {e}")))?;

        let reported = match resp.status() {
            ureq::http::StatusCode::PARTIAL_CONTENT => header(&resp, "Content-Range")
                .as_deref()
                .and_then(content_range_total)
                .or_else(|| header(&resp, "Content-Length").and_then(|v| v.parse().ok())),
            // server ignored the range and sent the file from the top
            ureq::http::StatusCode::OK if start == 0 => {
                header(&resp, "Content-Length").and_then(|v| v.parse().ok())
            }
            ureq::http::StatusCode::OK => {
                return Err(io::Error::other("server ignored range request"));
            }
            other => {
                return Err(io::Error::other(format!(
                    "http range request failed with status {other}"
                )));
            }
        };
        if reported.is_some() {
            self.total = reported;
        }

        let (_, body) = resp.into_parts();
        self.window.clear();
        body.into_reader()
            .read_to_end(&mut self.window)
            .map_err(|e| io::Error::other(format!("http read failed: {e}")))?;
        self.window_at = start;
        Ok(())
    }

    /// Total remote length, fetching the first block to learn it if needed.
    fn require_total(&mut self) -> io::Result<u64> {
        if self.total.is_none() {
            self.load_window(0)?;
        }
        self.total
            .ok_or_else(|| io::Error::other("remote source reports no content length"))
    }
}

impl Read for HttpReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.total.is_some_and(|t| self.pos >= t) {
            return Ok(0);
        }

        if self.window_offset().is_none() {
            self.load_window(self.pos)?;
        }
        let Some(rel) = self.window_offset() else {
            // short or empty response past the end
            return Ok(0);
        };

        let n = (self.window.len() - rel).min(out.len());
        out[..n].copy_from_slice(&self.window[rel..rel + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for HttpReader {
    fn seek(&mut self, to: SeekFrom) -> io::Result<u64> {
        self.pos = match to {
            SeekFrom::Start(at) => at,
            SeekFrom::Current(delta) => self.pos.saturating_add_signed(delta),
            SeekFrom::End(delta) => self.require_total()?.saturating_add_signed(delta),
        };
        Ok(self.pos)
    }
}

impl MediaSource for HttpReader {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.total
    }
}

fn header(resp: &ureq::http::Response<ureq::Body>, name: &str) -> Option<String> {
    resp.headers()
        .get(name)?
        .to_str()
        .ok()
        .map(str::to_string)
}

/// Total length from a `Content-Range` header (`bytes start-end/total`).
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.parse().ok()
}
