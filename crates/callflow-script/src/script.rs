use serde::{Deserialize, Serialize};

/// Say something to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speak {
    pub text: String,
    pub voice: String,
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    Speech,
    Dtmf,
    SpeechDtmf,
}

impl InputMode {
    /// Value of the TwiML `input` attribute.
    pub fn as_twiml(&self) -> &'static str {
        match self {
            InputMode::Speech => "speech",
            InputMode::Dtmf => "dtmf",
            InputMode::SpeechDtmf => "dtmf speech",
        }
    }
}

/// Wait for the caller's next utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listen {
    pub input: InputMode,
    pub timeout_secs: u32,
    pub speech_timeout: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    /// Played while listening, after the preceding prompt has finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reprompt: Option<Speak>,
}

/// Bridge the call to another number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub target: String,
    /// May contain `{{From}}` / `{{To}}` placeholders.
    pub caller_id_template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ScriptNode {
    Speak(Speak),
    Listen(Listen),
    Transfer(Transfer),
    End,
}

/// Ordered instructions for one gateway response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseScript {
    pub nodes: Vec<ScriptNode>,
}

impl ResponseScript {
    pub fn new(nodes: Vec<ScriptNode>) -> Self {
        Self { nodes }
    }

    /// True when the gateway will wait for more caller input.
    pub fn listens(&self) -> bool {
        self.nodes.iter().any(|n| matches!(n, ScriptNode::Listen(_)))
    }

    pub fn transfer(&self) -> Option<&Transfer> {
        self.nodes.iter().find_map(|n| match n {
            ScriptNode::Transfer(t) => Some(t),
            _ => None,
        })
    }

    /// Text of every `Speak` node at the top level, in order.
    pub fn spoken(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                ScriptNode::Speak(s) => Some(s.text.as_str()),
                _ => None,
            })
            .collect()
    }
}
