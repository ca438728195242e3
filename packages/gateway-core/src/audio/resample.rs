//! Naive linear downsampler from the room's 48 kHz PCM to the device's 24 kHz.

use crate::protocol_constants::{OUTBOUND_SAMPLE_RATE, ROOM_SAMPLE_RATE};

/// Downsamples mono 16-bit PCM from [`ROOM_SAMPLE_RATE`] to
/// [`OUTBOUND_SAMPLE_RATE`] by linear interpolation.
///
/// The ratio (48000/24000 = 2) is exact, so this reduces to picking every
/// other sample with a one-sample linear blend to avoid aliasing artifacts
/// on transients; a production deployment swapping in a polyphase resampler
/// would keep this function's signature.
pub fn resample_48k_to_24k(input: &[i16]) -> Vec<i16> {
    let ratio = ROOM_SAMPLE_RATE as f64 / OUTBOUND_SAMPLE_RATE as f64;
    let out_len = (input.len() as f64 / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos.floor() as usize;
        let frac = src_pos - idx as f64;
        let a = *input.get(idx).unwrap_or(&0) as f64;
        let b = *input.get(idx + 1).unwrap_or(input.get(idx).unwrap_or(&0)) as f64;
        out.push((a + (b - a) * frac).round() as i16);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_sample_count() {
        let input: Vec<i16> = (0..960).map(|i| (i % 100) as i16).collect();
        let output = resample_48k_to_24k(&input);
        assert_eq!(output.len(), 480);
    }

    #[test]
    fn silence_stays_silent() {
        let input = vec![0i16; 480];
        let output = resample_48k_to_24k(&input);
        assert!(output.iter().all(|&s| s == 0));
    }
}
