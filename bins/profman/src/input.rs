//! JSON-lines protocol read from stdin by `profman run`.
//!
//! A line carrying a `command` field is an operator command; any other
//! object is a lifecycle event.

use profman_common::ProfileId;
use profman_profile_state::LifecycleEvent;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum OperatorCommand {
    /// One profile's status, or every profile's when `profile_id` is absent
    Status {
        #[serde(default)]
        profile_id: Option<ProfileId>,
    },
    Start {
        profile_id: ProfileId,
    },
    Stop {
        profile_id: ProfileId,
    },
    Recover {
        profile_id: ProfileId,
        failure_type: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputLine {
    Command(OperatorCommand),
    Event(LifecycleEvent),
}

pub fn parse_line(line: &str) -> Result<InputLine, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("command").is_some() {
        serde_json::from_value(value).map(InputLine::Command)
    } else {
        serde_json::from_value(value).map(InputLine::Event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use profman_profile_state::EventKind;

    #[test]
    fn test_event_line() {
        let line = r#"{"type":"ONBOARDING_COMPLETE","profile_id":"p1"}"#;
        match parse_line(line).unwrap() {
            InputLine::Event(event) => {
                assert_eq!(event.kind, EventKind::OnboardingComplete);
                assert_eq!(event.profile_id, ProfileId::from("p1"));
            }
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_command_lines() {
        assert_eq!(
            parse_line(r#"{"command":"status"}"#).unwrap(),
            InputLine::Command(OperatorCommand::Status { profile_id: None })
        );
        assert_eq!(
            parse_line(r#"{"command":"recover","profile_id":"p1","failure_type":"extension-error"}"#)
                .unwrap(),
            InputLine::Command(OperatorCommand::Recover {
                profile_id: ProfileId::from("p1"),
                failure_type: "extension-error".into(),
            })
        );
    }

    #[test]
    fn test_malformed_lines_are_errors() {
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"command":"explode"}"#).is_err());
        assert!(parse_line(r#"{"type":"made-up","profile_id":"p1"}"#).is_err());
    }
}
