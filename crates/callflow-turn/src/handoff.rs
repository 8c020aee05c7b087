use callflow_core::config::{HandoffConfig, HANDOFF_ACTION};
use callflow_core::phone::normalize_e164;
use callflow_core::{HandoffDirective, NluResult};
use serde_json::Value;
use tracing::warn;

/// Build a directive when the NLU payload asks for a live agent.
///
/// Payload keys `transferNumber`, `reason` and `preserveContext` override the
/// configured defaults. A transfer number is normalised to E.164; one with no
/// digits at all is ignored in favour of the default.
pub fn detect_handoff(nlu: &NluResult, cfg: &HandoffConfig) -> Option<HandoffDirective> {
    let payload = nlu.custom_payload.as_ref()?;
    if payload.get("action").and_then(Value::as_str) != Some(HANDOFF_ACTION) {
        return None;
    }

    let transfer_target = match non_empty_str(payload.get("transferNumber")) {
        Some(raw) => normalize_e164(raw, &cfg.default_country_code).unwrap_or_else(|| {
            warn!(transfer_number = raw, "unusable transfer number in payload, using default");
            cfg.transfer_number.clone()
        }),
        None => cfg.transfer_number.clone(),
    };

    let reason = non_empty_str(payload.get("reason"))
        .map(String::from)
        .unwrap_or_else(|| cfg.reason.clone());

    let preserve_context = payload
        .get("preserveContext")
        .and_then(Value::as_bool)
        .unwrap_or(cfg.preserve_context);

    Some(HandoffDirective {
        transfer_target,
        reason,
        preserve_context,
    })
}

fn non_empty_str(v: Option<&Value>) -> Option<&str> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
