//! Command-line front end for the music-player library.
//!
//! Plays one file or URL and exits when playback finishes or on Ctrl-C.

mod cli;

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use music_player::config::PlayerConfig;
use music_player::device;
use music_player::player::Player;
use music_player::status::Status;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.list_devices {
        device::list_devices()?;
        return Ok(());
    }

    let Some(input) = args.input else {
        bail!("no input given; pass an audio file path or URL");
    };

    let mut player = Player::with_config(PlayerConfig {
        device: args.device.clone(),
        buffer_seconds: args.buffer_seconds,
        ..PlayerConfig::default()
    });

    if input.starts_with("http://") || input.starts_with("https://") {
        player.open_url(input.as_str());
    } else {
        player.open_path(input.as_str());
    }
    player.set_looping(args.loop_playback);
    player.play()?;
    if let Some(db) = args.gain {
        player.set_gain(db);
    }

    if let Some(title) = player.property("title") {
        tracing::info!(title = %title, "now playing");
    } else {
        tracing::info!(input = %input, "now playing");
    }

    let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })?;

    loop {
        match interrupt_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(()) => {
                tracing::info!("interrupted");
                player.stop();
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                if player.status() == Status::Stopped {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}
