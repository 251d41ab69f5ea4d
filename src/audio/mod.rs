pub mod amplifier;
pub mod buffer;
pub mod decoder;
pub mod device;
pub mod engine;
pub mod format;
pub mod pump;
pub mod resampler;
pub mod sink;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

// Re-export the pipeline stages
pub use amplifier::Amplifier;
pub use format::FormatParser;
pub use pump::{BufferPump, NativePump, TappedPump};
pub use state::{MediaSlot, PlaybackStateMachine};

// Re-export output types
pub use buffer::RingBuffer;
pub use device::{DeviceInfo, DeviceManager};
pub use resampler::LinearResampler;
pub use sink::{CpalSink, OutputSink};

// Re-export decoder types
pub use decoder::{DecoderBackend, PlatformDecoder, SymphoniaBackend, SymphoniaDecoder};

pub use engine::PlaybackEngine;
