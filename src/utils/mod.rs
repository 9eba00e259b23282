pub mod audio;
pub mod speech;

pub use audio::{decode_pcm16, SAMPLE_RATE};
pub use speech::{SpeechCaptureError, SpeechFragment, TranscriptBuffer};
