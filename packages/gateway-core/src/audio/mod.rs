//! PCM buffering and resampling on the outbound (room → device) path.

mod frame_assembler;
mod resample;

pub use frame_assembler::FrameAssembler;
pub use resample::resample_48k_to_24k;
