mod filter;
mod key;

pub use filter::{exp_curve, highpass_hz, lowpass_hz};
pub use key::{
    KeyId, NoteBlock, OscConfig, OscParam, Synth, Variation, VoiceKey, build_key,
    schedule_gain_envelope, schedule_variations,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Wave {
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

pub fn midi_to_hz(key: u8) -> f64 {
    440.0 * 2.0_f64.powf((key as f64 - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::midi_to_hz;

    #[test]
    fn concert_pitch() {
        assert!((midi_to_hz(69) - 440.0).abs() < 1e-9);
        assert!((midi_to_hz(81) - 880.0).abs() < 1e-9);
        assert!((midi_to_hz(57) - 220.0).abs() < 1e-9);
    }
}
