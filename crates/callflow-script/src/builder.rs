use callflow_core::config::{PromptsConfig, SpeechConfig};
use callflow_core::{CallflowConfig, HandoffDirective};
use serde::{Deserialize, Serialize};

use crate::script::{InputMode, Listen, ResponseScript, ScriptNode, Speak, Transfer};

/// What the turn processor decided to do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Greet,
    Continue,
    Handoff,
    /// Nothing usable was heard; ask again.
    Reprompt,
    Error,
    /// The call was already handed off.
    End,
}

/// Turns decisions into scripts. Holds only configuration; every method is
/// a pure function of its arguments.
#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    speech: SpeechConfig,
    prompts: PromptsConfig,
    caller_id_template: String,
}

impl ScriptBuilder {
    pub fn new(speech: SpeechConfig, prompts: PromptsConfig, caller_id_template: String) -> Self {
        Self {
            speech,
            prompts,
            caller_id_template,
        }
    }

    pub fn from_config(cfg: &CallflowConfig) -> Self {
        Self::new(
            cfg.speech.clone(),
            cfg.prompts.clone(),
            cfg.handoff.caller_id_template.clone(),
        )
    }

    pub fn prompts(&self) -> &PromptsConfig {
        &self.prompts
    }

    /// Dispatch on `decision`. `text` is the NLU response for `Continue` and
    /// `Handoff` and ignored otherwise; a `Handoff` without a directive falls
    /// back to `Continue`.
    pub fn build(
        &self,
        decision: Decision,
        text: &str,
        handoff: Option<&HandoffDirective>,
    ) -> ResponseScript {
        match (decision, handoff) {
            (Decision::Greet, _) => self.greeting(),
            (Decision::Handoff, Some(directive)) => self.handoff(text, directive),
            (Decision::Continue, _) | (Decision::Handoff, None) => self.respond(text),
            (Decision::Reprompt, _) => self.no_input(),
            (Decision::Error, _) => self.error(),
            (Decision::End, _) => self.end(),
        }
    }

    pub fn greeting(&self) -> ResponseScript {
        let reprompt = self.speak(&self.prompts.greeting_reprompt);
        ResponseScript::new(vec![
            ScriptNode::Speak(self.speak(&self.prompts.greeting)),
            ScriptNode::Listen(self.listen(Some(reprompt))),
        ])
    }

    pub fn respond(&self, text: &str) -> ResponseScript {
        let mut nodes = Vec::with_capacity(2);
        if !text.trim().is_empty() {
            nodes.push(ScriptNode::Speak(self.speak(text)));
        }
        nodes.push(ScriptNode::Listen(self.listen(None)));
        ResponseScript::new(nodes)
    }

    pub fn handoff(&self, text: &str, directive: &HandoffDirective) -> ResponseScript {
        let transition = &self.prompts.handoff_transition;
        let spoken = if text.trim().is_empty() {
            transition.clone()
        } else {
            format!("{} {}", text.trim_end(), transition)
        };
        ResponseScript::new(vec![
            ScriptNode::Speak(self.speak(&spoken)),
            ScriptNode::Transfer(Transfer {
                target: directive.transfer_target.clone(),
                caller_id_template: self.caller_id_template.clone(),
            }),
        ])
    }

    pub fn no_input(&self) -> ResponseScript {
        ResponseScript::new(vec![
            ScriptNode::Speak(self.speak(&self.prompts.no_input)),
            ScriptNode::Listen(self.listen(None)),
        ])
    }

    pub fn error(&self) -> ResponseScript {
        ResponseScript::new(vec![
            ScriptNode::Speak(self.speak(&self.prompts.error)),
            ScriptNode::Listen(self.listen(None)),
        ])
    }

    pub fn end(&self) -> ResponseScript {
        ResponseScript::new(vec![ScriptNode::End])
    }

    fn speak(&self, text: &str) -> Speak {
        Speak {
            text: text.to_string(),
            voice: self.speech.voice.clone(),
            language: self.speech.tts_language.clone(),
        }
    }

    fn listen(&self, reprompt: Option<Speak>) -> Listen {
        Listen {
            input: InputMode::Speech,
            timeout_secs: self.speech.listen_timeout_secs,
            speech_timeout: self.speech.speech_timeout.clone(),
            language: self.speech.stt_language.clone(),
            hints: self.speech.hints.clone(),
            reprompt,
        }
    }
}
