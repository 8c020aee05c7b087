//! Twilio TwiML rendering.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{Result, ScriptError};
use crate::script::{Listen, ResponseScript, ScriptNode, Speak, Transfer};

/// Per-call values substituted into templates at render time.
#[derive(Debug, Clone, Default)]
pub struct RenderVars {
    pub from: String,
    pub to: String,
}

impl RenderVars {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Replace `{{From}}` and `{{To}}`.
    pub fn substitute(&self, template: &str) -> String {
        template
            .replace("{{From}}", &self.from)
            .replace("{{To}}", &self.to)
    }
}

/// Render `script` as a complete TwiML document.
pub fn render(script: &ResponseScript, vars: &RenderVars) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml)?;
    writer
        .write_event(Event::Start(BytesStart::new("Response")))
        .map_err(xml)?;

    for node in &script.nodes {
        match node {
            ScriptNode::Speak(speak) => write_say(&mut writer, speak)?,
            ScriptNode::Listen(listen) => write_gather(&mut writer, listen)?,
            ScriptNode::Transfer(transfer) => write_dial(&mut writer, transfer, vars)?,
            ScriptNode::End => writer
                .write_event(Event::Empty(BytesStart::new("Hangup")))
                .map_err(xml)?,
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("Response")))
        .map_err(xml)?;
    Ok(String::from_utf8(writer.into_inner())?)
}

fn xml<E: std::fmt::Display>(e: E) -> ScriptError {
    ScriptError::Xml(e.to_string())
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'_>,
    text: &str,
) -> Result<()> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    writer.write_event(Event::Start(start)).map_err(xml)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml)?;
    Ok(())
}

fn write_say(writer: &mut Writer<Vec<u8>>, speak: &Speak) -> Result<()> {
    let mut say = BytesStart::new("Say");
    say.push_attribute(("voice", speak.voice.as_str()));
    say.push_attribute(("language", speak.language.as_str()));
    write_text_element(writer, say, &speak.text)
}

fn write_gather(writer: &mut Writer<Vec<u8>>, listen: &Listen) -> Result<()> {
    let timeout = listen.timeout_secs.to_string();
    let hints = listen.hints.join(",");

    let mut gather = BytesStart::new("Gather");
    gather.push_attribute(("input", listen.input.as_twiml()));
    gather.push_attribute(("timeout", timeout.as_str()));
    gather.push_attribute(("speechTimeout", listen.speech_timeout.as_str()));
    gather.push_attribute(("language", listen.language.as_str()));
    if !hints.is_empty() {
        gather.push_attribute(("hints", hints.as_str()));
    }

    match &listen.reprompt {
        Some(reprompt) => {
            writer.write_event(Event::Start(gather)).map_err(xml)?;
            write_say(writer, reprompt)?;
            writer
                .write_event(Event::End(BytesEnd::new("Gather")))
                .map_err(xml)?;
        }
        None => writer.write_event(Event::Empty(gather)).map_err(xml)?,
    }
    Ok(())
}

fn write_dial(writer: &mut Writer<Vec<u8>>, transfer: &Transfer, vars: &RenderVars) -> Result<()> {
    let caller_id = vars.substitute(&transfer.caller_id_template);
    let mut dial = BytesStart::new("Dial");
    if !caller_id.is_empty() {
        dial.push_attribute(("callerId", caller_id.as_str()));
    }
    write_text_element(writer, dial, &transfer.target)
}
