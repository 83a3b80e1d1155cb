use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "music-cli", version, about = "Play a sound file")]
pub struct Args {
    /// Audio file path or http(s) URL to play
    pub input: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Restart from the beginning at end-of-stream until interrupted
    #[arg(long = "loop")]
    pub loop_playback: bool,

    /// Initial master gain in decibels
    #[arg(long)]
    pub gain: Option<f32>,

    /// Output buffer target in seconds
    #[arg(long, default_value_t = 2.0)]
    pub buffer_seconds: f32,
}
