//! Sound channel.

use tracing::info;

use super::SoundPlayer;
use crate::domain::Tone;

/// Headless sound player. The host UI subscribes to the `sound` log target
/// and plays the named tone.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSoundPlayer;

impl SoundPlayer for TracingSoundPlayer {
    fn play(&self, tone: Tone, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        info!(target: "sound", %tone, volume, "Playing alert tone");
    }
}
