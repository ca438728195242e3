//! Buffers resampled PCM into exact codec-frame multiples.

use crate::protocol_constants::{OUTBOUND_FRAME_BYTES, SILENCE_PEAK_THRESHOLD};

/// Accumulates little-endian 16-bit PCM bytes and yields exactly
/// [`OUTBOUND_FRAME_BYTES`]-sized frames, dropping frames that are silent.
///
/// Owned by exactly one task per session (see the concurrency model): the
/// rolling buffer is not `Sync` and must not be shared.
pub struct FrameAssembler {
    buffer: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self { buffer: Vec::with_capacity(OUTBOUND_FRAME_BYTES * 2) }
    }

    /// Appends PCM bytes and drains as many complete frames as are now
    /// available. Silent frames are discarded before being returned so the
    /// caller never encodes silence.
    pub fn push(&mut self, pcm_bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(pcm_bytes);

        let mut frames = Vec::new();
        while self.buffer.len() >= OUTBOUND_FRAME_BYTES {
            let frame: Vec<u8> = self.buffer.drain(..OUTBOUND_FRAME_BYTES).collect();
            if !Self::is_silent(&frame) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Discards any partial trailing bytes. Called at stream end: a partial
    /// frame would crash the encoder, so it is never flushed.
    pub fn discard_partial(&mut self) {
        self.buffer.clear();
    }

    fn is_silent(frame: &[u8]) -> bool {
        frame
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .all(|s| s.abs() < SILENCE_PEAK_THRESHOLD)
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_frame() -> Vec<u8> {
        let mut bytes = vec![0u8; OUTBOUND_FRAME_BYTES];
        let sample: i16 = 5000;
        bytes[0..2].copy_from_slice(&sample.to_le_bytes());
        bytes
    }

    #[test]
    fn yields_no_frame_until_full() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(&vec![1u8; OUTBOUND_FRAME_BYTES - 10]);
        assert!(frames.is_empty());
    }

    #[test]
    fn yields_exact_frame_when_full() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(&loud_frame());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), OUTBOUND_FRAME_BYTES);
    }

    #[test]
    fn drops_silent_frames() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(&vec![0u8; OUTBOUND_FRAME_BYTES]);
        assert!(frames.is_empty());
    }

    #[test]
    fn discard_partial_clears_buffer() {
        let mut assembler = FrameAssembler::new();
        assembler.push(&vec![1u8; 100]);
        assembler.discard_partial();
        let frames = assembler.push(&vec![1u8; OUTBOUND_FRAME_BYTES - 10]);
        assert!(frames.is_empty());
    }
}
