use callflow_core::config::PromptsConfig;
use callflow_core::conversation::MAX_CONFIDENCE;
use callflow_core::CallId;
use serde::{Deserialize, Serialize};

/// One inbound telephony event for a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEvent {
    pub call_id: CallId,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    /// Recognised speech, if any.
    #[serde(default)]
    pub speech: Option<String>,
    /// Keypad digits, if any.
    #[serde(default)]
    pub digits: Option<String>,
    /// Recogniser confidence for `speech`.
    #[serde(default)]
    pub speech_confidence: Option<f64>,
    /// Tenant for a new call; the configured default when absent.
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceSource {
    Speech,
    Keypress,
}

/// Normalised caller input for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub confidence: f64,
    pub source: UtteranceSource,
}

impl TurnEvent {
    pub fn new(call_id: impl Into<CallId>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            from: from.into(),
            to: to.into(),
            speech: None,
            digits: None,
            speech_confidence: None,
            tenant_id: None,
        }
    }

    pub fn with_speech(mut self, text: impl Into<String>, confidence: Option<f64>) -> Self {
        self.speech = Some(text.into());
        self.speech_confidence = confidence;
        self
    }

    pub fn with_digits(mut self, digits: impl Into<String>) -> Self {
        self.digits = Some(digits.into());
        self
    }

    /// Speech wins over digits. Blank input of either kind counts as absent;
    /// `None` means there is nothing to process.
    pub fn utterance(&self, prompts: &PromptsConfig) -> Option<Utterance> {
        if let Some(speech) = non_blank(self.speech.as_deref()) {
            let confidence = match self.speech_confidence {
                Some(c) if !c.is_nan() => c.clamp(0.0, MAX_CONFIDENCE),
                _ => MAX_CONFIDENCE,
            };
            return Some(Utterance {
                text: speech.to_string(),
                confidence,
                source: UtteranceSource::Speech,
            });
        }

        non_blank(self.digits.as_deref()).map(|digits| Utterance {
            text: prompts.keypress_template.replace("{digits}", digits),
            confidence: MAX_CONFIDENCE,
            source: UtteranceSource::Keypress,
        })
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
