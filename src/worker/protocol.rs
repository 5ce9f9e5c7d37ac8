//! Line-delimited JSON protocol between the host and the synthesis worker.
//!
//! Every message is one JSON object on one line. Requests carry a host
//! generated `id` that the worker echoes back, so replies are correlated by
//! id rather than by arrival order:
//!
//! ```text
//! host → worker  {"id":3,"payload":{"command":"synthesize","text":"…","output_path":"…","voice_dir":"…"}}
//! host → worker  {"id":4,"payload":{"command":"quit"}}
//! worker → host  {"id":3,"result":{"success":true,"output_path":"…","duration_seconds":4.2}}
//! ```
//!
//! Anything else the worker prints on stdout (progress bars, library
//! warnings) is diagnostic noise, never a reply.

use crate::error::{NarratorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id assigned by the host.
pub type RequestId = u64;

/// One synthesis job: speak `text` with the voice in `voice_dir`, write to `output_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub output_path: String,
    pub voice_dir: String,
}

/// What the host asks the worker to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Payload {
    Synthesize(SynthesisRequest),
    Quit,
}

/// Host → worker envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub payload: Payload,
}

impl Request {
    /// Serialize to a single newline-terminated line.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self).map_err(|e| NarratorError::Protocol {
            message: format!("Failed to serialize request {}: {}", self.id, e),
        })?;
        line.push('\n');
        Ok(line)
    }
}

/// The worker's answer to one request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SynthesisResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set on acknowledgements of commands such as `quit`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Worker → host envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: RequestId,
    pub result: SynthesisResponse,
}

impl Reply {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Classification of one line read from the worker's stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A well-formed reply envelope
    Reply(Reply),
    /// Not JSON, or a bare JSON scalar: incidental output to ignore
    Diagnostic,
}

/// Parse one stdout line.
///
/// Non-JSON lines and JSON scalars are diagnostics. A JSON object that is
/// not a valid reply envelope is a protocol error; the caller logs it and
/// moves on, it never resolves a pending call.
pub fn parse_line(line: &str) -> Result<Inbound> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => return Ok(Inbound::Diagnostic),
    };

    if !value.is_object() {
        return Ok(Inbound::Diagnostic);
    }

    let reply: Reply = serde_json::from_value(value).map_err(|e| NarratorError::Protocol {
        message: format!("Unrecognized worker message: {}", e),
    })?;
    reply.validate()?;
    Ok(Inbound::Reply(reply))
}

impl Reply {
    fn validate(&self) -> Result<()> {
        if let Some(duration) = self.result.duration_seconds
            && !(duration.is_finite() && duration >= 0.0)
        {
            return Err(NarratorError::Protocol {
                message: format!(
                    "Reply {} has invalid duration_seconds {}",
                    self.id, duration
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth_request() -> Request {
        Request {
            id: 7,
            payload: Payload::Synthesize(SynthesisRequest {
                text: "Hello there.".to_string(),
                output_path: "/out/.tmp/post_0.wav".to_string(),
                voice_dir: "/voice".to_string(),
            }),
        }
    }

    #[test]
    fn test_synthesize_request_wire_format() {
        let line = synth_request().to_line().unwrap();
        assert_eq!(
            line,
            "{\"id\":7,\"payload\":{\"command\":\"synthesize\",\"text\":\"Hello there.\",\
             \"output_path\":\"/out/.tmp/post_0.wav\",\"voice_dir\":\"/voice\"}}\n"
        );
    }

    #[test]
    fn test_quit_request_wire_format() {
        let line = Request {
            id: 1,
            payload: Payload::Quit,
        }
        .to_line()
        .unwrap();
        assert_eq!(line, "{\"id\":1,\"payload\":{\"command\":\"quit\"}}\n");
    }

    #[test]
    fn test_request_is_single_line_even_with_newlines_in_text() {
        let mut request = synth_request();
        if let Payload::Synthesize(ref mut s) = request.payload {
            s.text = "Line one.\n\nLine two.".to_string();
        }
        let line = request.to_line().unwrap();
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_parse_success_reply() {
        let inbound = parse_line(
            r#"{"id":7,"result":{"success":true,"output_path":"/o.wav","duration_seconds":3.5}}"#,
        )
        .unwrap();
        assert_eq!(
            inbound,
            Inbound::Reply(Reply {
                id: 7,
                result: SynthesisResponse {
                    success: true,
                    output_path: Some("/o.wav".to_string()),
                    duration_seconds: Some(3.5),
                    error: None,
                    command: None,
                },
            })
        );
    }

    #[test]
    fn test_parse_failure_reply() {
        let inbound =
            parse_line(r#"{"id":2,"result":{"success":false,"error":"model crashed"}}"#).unwrap();
        match inbound {
            Inbound::Reply(reply) => {
                assert!(!reply.result.success);
                assert_eq!(reply.result.error.as_deref(), Some("model crashed"));
            }
            other => panic!("Expected reply, got: {:?}", other),
        }
    }

    #[test]
    fn test_parse_quit_ack() {
        let inbound =
            parse_line(r#"{"id":9,"result":{"success":true,"command":"quit"}}"#).unwrap();
        match inbound {
            Inbound::Reply(reply) => assert_eq!(reply.result.command.as_deref(), Some("quit")),
            other => panic!("Expected reply, got: {:?}", other),
        }
    }

    #[test]
    fn test_non_json_line_is_diagnostic() {
        assert_eq!(
            parse_line("Loading model weights... 45%").unwrap(),
            Inbound::Diagnostic
        );
        assert_eq!(parse_line("{not json").unwrap(), Inbound::Diagnostic);
    }

    #[test]
    fn test_json_scalar_is_diagnostic() {
        assert_eq!(parse_line("42").unwrap(), Inbound::Diagnostic);
        assert_eq!(parse_line("\"done\"").unwrap(), Inbound::Diagnostic);
        assert_eq!(parse_line("[1,2]").unwrap(), Inbound::Diagnostic);
    }

    #[test]
    fn test_object_without_envelope_is_protocol_error() {
        let err = parse_line(r#"{"success":true}"#).unwrap_err();
        assert!(matches!(err, NarratorError::Protocol { .. }));
    }

    #[test]
    fn test_negative_duration_is_protocol_error() {
        let err =
            parse_line(r#"{"id":1,"result":{"success":true,"duration_seconds":-1.0}}"#)
                .unwrap_err();
        assert!(err.to_string().contains("duration_seconds"));
    }

    #[test]
    fn test_unknown_fields_in_result_are_tolerated() {
        let inbound =
            parse_line(r#"{"id":1,"result":{"success":true,"sample_rate":24000}}"#).unwrap();
        assert!(matches!(inbound, Inbound::Reply(_)));
    }

    #[test]
    fn test_reply_serialization_omits_absent_fields() {
        let reply = Reply {
            id: 3,
            result: SynthesisResponse {
                success: true,
                ..Default::default()
            },
        };
        assert_eq!(reply.to_json().unwrap(), r#"{"id":3,"result":{"success":true}}"#);
    }
}
