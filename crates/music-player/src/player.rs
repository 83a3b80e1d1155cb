//! The player: transport API, session lifecycle, and the playback worker.
//!
//! Two threads matter here: the caller thread drives
//! play/pause/resume/stop and reads status/metadata/gain, and one worker
//! thread per active session runs the decode-to-line copy loop. Status is
//! the only shared control state; stopping is cooperative, observed at the
//! top of the copy loop.

use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;

use crate::config::PlayerConfig;
use crate::decode::{self, DecodedStream};
use crate::error::PlayerError;
use crate::line::{GainControl, OutputLine};
use crate::metadata::{MetaValue, Metadata};
use crate::source::{ReopenSpec, Source};
use crate::status::{Status, Transport};

/// Gain control of the current line, installed by the worker for the
/// session's lifetime.
type GainSlot = Arc<Mutex<Option<GainControl>>>;

/// A single-source audio player with transport controls.
///
/// The output line and decode cursor exist only while the status is
/// `Playing`/`Paused`; both are owned by the worker thread and torn down
/// before the session's terminal status write.
pub struct Player {
    source: Option<Source>,
    config: PlayerConfig,
    transport: Arc<Transport>,
    looping: Arc<AtomicBool>,
    metadata: Metadata,
    gain: GainSlot,
    worker: Option<JoinHandle<()>>,
}

impl Player {
    pub fn new() -> Self {
        Self::with_config(PlayerConfig::default())
    }

    pub fn with_config(config: PlayerConfig) -> Self {
        Self {
            source: None,
            config,
            transport: Arc::new(Transport::new()),
            looping: Arc::new(AtomicBool::new(false)),
            metadata: Metadata::default(),
            gain: Arc::new(Mutex::new(None)),
            worker: None,
        }
    }

    /// Select a local file as the input. The last `open_*` call wins.
    pub fn open_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        tracing::info!(path = %path.display(), "open");
        self.source = Some(Source::Path(path));
    }

    /// Select an already-open byte stream as the input.
    ///
    /// The stream is consumed by the first playback session; replaying or
    /// looping it is not possible.
    pub fn open_stream(&mut self, reader: impl Read + Send + Sync + 'static) {
        tracing::info!("open byte stream");
        self.source = Some(Source::Stream(Some(Box::new(reader))));
    }

    /// Select a URL as the input, handed verbatim to the HTTP loader.
    pub fn open_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        tracing::info!(url = %url, "open");
        self.source = Some(Source::Url(url));
    }

    /// Start playback of the current source.
    ///
    /// An active session is stopped first. The source is resolved and
    /// probed, the metadata dictionary is rebuilt, and the worker acquires
    /// the output line before this call returns with the session `Playing`.
    /// On error the player is left `Unknown`/`Stopped`, never
    /// half-initialized.
    pub fn play(&mut self) -> Result<(), PlayerError> {
        self.halt_session();

        let source = self.source.as_mut().ok_or(PlayerError::NoSource)?;
        let reopen = source.reopen_spec();
        let (media, hint) = source.resolve()?;
        let (decoded, metadata) = decode::open_stream(media, hint)?;
        self.metadata = metadata;

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let ctx = SessionContext {
            transport: self.transport.clone(),
            looping: self.looping.clone(),
            gain: self.gain.clone(),
            config: self.config.clone(),
            reopen,
        };
        self.worker = Some(
            std::thread::Builder::new()
                .name("music-player".into())
                .spawn(move || run_session(decoded, ctx, ready_tx))?,
        );

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!("playback started");
                Ok(())
            }
            Ok(Err(e)) => {
                self.join_worker();
                Err(e)
            }
            Err(_) => {
                self.join_worker();
                Err(PlayerError::DeviceUnavailable(
                    "playback worker exited during line setup".into(),
                ))
            }
        }
    }

    /// Pause playback. Effective only while `Playing`.
    pub fn pause(&self) {
        if self.transport.pause() {
            tracing::info!("playback paused");
        }
    }

    /// Resume playback. Effective only while `Paused`.
    pub fn resume(&self) {
        if self.transport.resume() {
            tracing::info!("playback resumed");
        }
    }

    /// Stop playback and release the line and decode cursor.
    ///
    /// Effective only from `Playing`/`Paused`; idempotent afterwards.
    pub fn stop(&mut self) {
        if self.transport.request_stop() {
            tracing::info!("playback stopped");
        }
        self.join_worker();
    }

    pub fn status(&self) -> Status {
        self.transport.current()
    }

    /// When set, a finished source restarts from the beginning instead of
    /// stopping, until `stop` is called or the flag is cleared.
    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
        tracing::info!(looping, "loop flag updated");
    }

    pub fn looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    /// The current source's metadata dictionary.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Look up one metadata value; absent for unknown keys and for tag
    /// keys of sources that expose no tags.
    pub fn property(&self, key: &str) -> Option<&MetaValue> {
        self.metadata.get(key)
    }

    /// Current master gain in decibels, or 0.0 without a gain control.
    pub fn gain(&self) -> f32 {
        self.gain
            .lock()
            .unwrap()
            .as_ref()
            .map(|g| g.value())
            .unwrap_or(0.0)
    }

    /// Set the master gain in decibels, clamped to the control's bounds.
    /// No effect without a gain control.
    pub fn set_gain(&self, db: f32) {
        match self.gain.lock().unwrap().as_ref() {
            Some(g) => g.set(db),
            None => tracing::info!("master gain is not supported"),
        }
    }

    /// Lower gain bound in decibels, or 0.0 without a gain control.
    pub fn gain_min(&self) -> f32 {
        match self.gain.lock().unwrap().as_ref() {
            Some(_) => GainControl::MIN_DB,
            None => 0.0,
        }
    }

    /// Upper gain bound in decibels, or 0.0 without a gain control.
    pub fn gain_max(&self) -> f32 {
        match self.gain.lock().unwrap().as_ref() {
            Some(_) => GainControl::MAX_DB,
            None => 0.0,
        }
    }

    /// Stop any active session and reap the worker.
    fn halt_session(&mut self) {
        self.transport.request_stop();
        self.join_worker();
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.halt_session();
    }
}

/// Everything the worker needs besides the decode cursor.
struct SessionContext {
    transport: Arc<Transport>,
    looping: Arc<AtomicBool>,
    gain: GainSlot,
    config: PlayerConfig,
    reopen: ReopenSpec,
}

enum SessionEnd {
    /// The decoder reported end-of-data.
    Exhausted,
    /// `Stopped`/`Unknown` was observed at the top of the copy loop.
    Interrupted,
}

/// Worker thread body: open the line, report readiness, run the copy loop,
/// handle loop restarts, and tear down before the terminal status write.
fn run_session(
    mut decoded: DecodedStream,
    ctx: SessionContext,
    ready_tx: mpsc::SyncSender<Result<(), PlayerError>>,
) {
    let mut line = match OutputLine::open(&decoded.target(), &ctx.config) {
        Ok(line) => line,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    *ctx.gain.lock().unwrap() = line.gain();
    ctx.transport.begin();
    let _ = ready_tx.send(Ok(()));

    let chunk_samples = (ctx.config.chunk_bytes / 2).max(decoded.target().channels);

    loop {
        match copy_until_end(&mut decoded, &mut line, &ctx.transport, chunk_samples) {
            Ok(SessionEnd::Exhausted) => {
                if let Err(e) = line.drain() {
                    tracing::warn!("line drain failed: {e}");
                }
                if ctx.looping.load(Ordering::Relaxed)
                    && ctx.transport.current() == Status::Playing
                {
                    match reopen_session(&ctx) {
                        Ok(Some((next_decoded, next_line))) => {
                            *ctx.gain.lock().unwrap() = next_line.gain();
                            decoded = next_decoded;
                            line = next_line;
                            tracing::info!("loop restart");
                            continue;
                        }
                        Ok(None) => {
                            tracing::warn!(
                                "loop requested but stream sources cannot be reopened"
                            );
                        }
                        Err(e) => tracing::error!("loop restart failed: {e}"),
                    }
                }
                break;
            }
            Ok(SessionEnd::Interrupted) => {
                line.flush();
                break;
            }
            Err(e) => {
                tracing::error!("playback session failed: {e}");
                line.flush();
                break;
            }
        }
    }

    *ctx.gain.lock().unwrap() = None;
    ctx.transport.finish();
}

/// The streaming copy loop.
///
/// While `Playing`, read one chunk from the decode cursor and write it to
/// the line (blocking; the line buffer provides backpressure). While
/// `Paused`, park on the transport condvar.
fn copy_until_end(
    decoded: &mut DecodedStream,
    line: &mut OutputLine,
    transport: &Transport,
    chunk_samples: usize,
) -> Result<SessionEnd, PlayerError> {
    loop {
        match transport.current() {
            Status::Playing => match decoded.read_chunk(chunk_samples)? {
                Some(pcm) => line.write(&pcm)?,
                None => return Ok(SessionEnd::Exhausted),
            },
            Status::Paused => transport.wait_while_paused(),
            Status::Stopped | Status::Unknown => return Ok(SessionEnd::Interrupted),
        }
    }
}

/// Re-resolve the session source for a loop restart.
///
/// Returns `Ok(None)` when the source kind cannot be reopened.
fn reopen_session(
    ctx: &SessionContext,
) -> Result<Option<(DecodedStream, OutputLine)>, PlayerError> {
    match ctx.reopen.resolve() {
        None => Ok(None),
        Some(resolved) => {
            let (media, hint) = resolved?;
            let (decoded, _metadata) = decode::open_stream(media, hint)?;
            let line = OutputLine::open(&decoded.target(), &ctx.config)?;
            Ok(Some((decoded, line)))
        }
    }
}
