use launchguard_core::types::LaunchEvent;
use serde::Deserialize;
use serde_json::Value;

/// `result` payload of a `logsNotification`.
#[derive(Debug, Deserialize)]
pub struct LogsNotificationResult {
    pub context: NotificationContext,
    pub value: LogsValue,
}

#[derive(Debug, Deserialize)]
pub struct NotificationContext {
    pub slot: u64,
}

#[derive(Debug, Deserialize)]
pub struct LogsValue {
    pub signature: String,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub logs: Vec<String>,
}

/// A successful transaction whose logs contain the creation marker.
pub fn is_launch_log(logs: &[String], err: Option<&Value>, marker: &str) -> bool {
    let succeeded = matches!(err, None | Some(Value::Null));
    succeeded && logs.iter().any(|line| line.contains(marker))
}

/// Turns the `result` of a logs notification into a launch event, if it is one.
pub fn launch_from_notification(result: &Value, marker: &str) -> Option<LaunchEvent> {
    let parsed = LogsNotificationResult::deserialize(result).ok()?;
    if !is_launch_log(&parsed.value.logs, parsed.value.err.as_ref(), marker) {
        return None;
    }
    Some(LaunchEvent::new(parsed.value.signature, parsed.context.slot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MARKER: &str = "Instruction: Create";

    fn notification(err: Value, logs: &[&str]) -> Value {
        json!({
            "context": { "slot": 287_000_123u64 },
            "value": {
                "signature": "5xCreateSig",
                "err": err,
                "logs": logs,
            }
        })
    }

    #[test]
    fn accepts_successful_create() {
        let result = notification(
            Value::Null,
            &["Program 6EF8 invoke [1]", "Program log: Instruction: Create"],
        );
        let event = launch_from_notification(&result, MARKER).expect("launch");
        assert_eq!(event.creation_tx_id, "5xCreateSig");
        assert_eq!(event.slot, 287_000_123);
    }

    #[test]
    fn rejects_failed_transaction() {
        let result = notification(
            json!({ "InstructionError": [0, "Custom"] }),
            &["Program log: Instruction: Create"],
        );
        assert!(launch_from_notification(&result, MARKER).is_none());
    }

    #[test]
    fn rejects_non_create_logs() {
        let result = notification(Value::Null, &["Program log: Instruction: Buy"]);
        assert!(launch_from_notification(&result, MARKER).is_none());
    }

    #[test]
    fn missing_err_field_counts_as_success() {
        let result = json!({
            "context": { "slot": 9 },
            "value": { "signature": "sig", "logs": ["Program log: Instruction: Create"] }
        });
        assert!(launch_from_notification(&result, MARKER).is_some());
    }

    #[test]
    fn malformed_payload_is_ignored() {
        assert!(launch_from_notification(&json!({ "slot": 1 }), MARKER).is_none());
    }
}
