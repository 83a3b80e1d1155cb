/// Tuning parameters for playback sessions.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Output device selector (case-insensitive substring match).
    /// `None` picks the host default output device.
    pub device: Option<String>,
    /// Copy-loop chunk size in bytes of target-format PCM.
    pub chunk_bytes: usize,
    /// Output buffer duration target used to size the line queue.
    pub buffer_seconds: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            device: None,
            chunk_bytes: 40 * 1024,
            buffer_seconds: 2.0,
        }
    }
}
