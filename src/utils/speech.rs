use std::fmt;

use serde::{Deserialize, Serialize};

/// One recognition result from the speech-capture collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechFragment {
    pub transcript: String,
    pub confidence: f32,
    pub is_final: bool,
}

/// Runtime failures of the speech engine, mapped from its error codes to
/// a fixed set of user-facing messages rather than raw engine strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechCaptureError {
    NoSpeech,
    NoMicrophone,
    PermissionDenied,
    Network,
    Aborted,
    Other(String),
}

impl SpeechCaptureError {
    pub fn from_engine_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::NoMicrophone,
            "not-allowed" => Self::PermissionDenied,
            "network" => Self::Network,
            "aborted" => Self::Aborted,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SpeechCaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpeech => write!(f, "No speech detected. Please try again."),
            Self::NoMicrophone => write!(f, "No microphone found. Please check your device."),
            Self::PermissionDenied => {
                write!(f, "Microphone access denied. Please allow microphone access.")
            }
            Self::Network => write!(f, "Network error occurred. Please check your connection."),
            Self::Aborted => write!(f, "Speech recognition was aborted."),
            Self::Other(code) => write!(f, "Speech recognition error: {}", code),
        }
    }
}

impl std::error::Error for SpeechCaptureError {}

/// Accumulates recognition results the way the capture engine reports
/// them: finalized fragments append permanently, the interim tail is
/// replaced on every update.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    finalized: String,
    interim: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &SpeechFragment) {
        if fragment.is_final {
            if !self.finalized.is_empty() {
                self.finalized.push(' ');
            }
            self.finalized.push_str(fragment.transcript.trim());
            self.interim.clear();
        } else {
            self.interim = fragment.transcript.trim().to_string();
        }
    }

    /// Finalized text plus the current interim tail, as shown live.
    pub fn text(&self) -> String {
        if self.interim.is_empty() {
            self.finalized.clone()
        } else if self.finalized.is_empty() {
            self.interim.clone()
        } else {
            format!("{} {}", self.finalized, self.interim)
        }
    }

    /// Only the finalized portion, the part safe to evaluate.
    pub fn finalized(&self) -> &str {
        &self.finalized
    }

    pub fn clear(&mut self) {
        self.finalized.clear();
        self.interim.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str, is_final: bool) -> SpeechFragment {
        SpeechFragment {
            transcript: text.to_string(),
            confidence: 0.9,
            is_final,
        }
    }

    #[test]
    fn engine_codes_map_to_fixed_messages() {
        assert_eq!(
            SpeechCaptureError::from_engine_code("not-allowed").to_string(),
            "Microphone access denied. Please allow microphone access."
        );
        assert_eq!(
            SpeechCaptureError::from_engine_code("no-speech"),
            SpeechCaptureError::NoSpeech
        );
        assert_eq!(
            SpeechCaptureError::from_engine_code("something-new").to_string(),
            "Speech recognition error: something-new"
        );
    }

    #[test]
    fn interim_text_is_replaced_until_finalized() {
        let mut buffer = TranscriptBuffer::new();
        buffer.push(&fragment("we", false));
        buffer.push(&fragment("we use", false));
        assert_eq!(buffer.text(), "we use");
        assert_eq!(buffer.finalized(), "");

        buffer.push(&fragment("we use a load balancer", true));
        assert_eq!(buffer.text(), "we use a load balancer");
        assert_eq!(buffer.finalized(), "we use a load balancer");

        buffer.push(&fragment("and", false));
        assert_eq!(buffer.text(), "we use a load balancer and");
    }

    #[test]
    fn clear_resets_both_parts() {
        let mut buffer = TranscriptBuffer::new();
        buffer.push(&fragment("done", true));
        buffer.push(&fragment("more", false));
        buffer.clear();
        assert_eq!(buffer.text(), "");
    }
}
