//! Wire protocol for the printer's WebSocket control channel
//!
//! Outbound messages are fully typed and serialize to the exact JSON shape
//! the printer firmware expects (PascalCase field names, empty `Id` and
//! `MainboardID`). Inbound traffic is decoded tolerantly: anything that is
//! not a well-formed export confirmation yields `None` and is ignored by the
//! caller, never treated as an error.

use crate::types::ExportRequest;
use serde::{Deserialize, Serialize};

/// Command code for "export timelapse video", shared by the trigger and its
/// confirmation.
pub(crate) const CMD_EXPORT_VIDEO: u32 = 323;

/// Keepalive payload; the printer expects the literal text and sends no
/// structured reply.
pub(crate) const KEEPALIVE_TEXT: &str = "ping";

/// Outer envelope of an outbound command
#[derive(Debug, Serialize)]
pub(crate) struct CommandEnvelope {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Data")]
    pub data: CommandBody,
}

/// Body of an outbound command
#[derive(Debug, Serialize)]
pub(crate) struct CommandBody {
    #[serde(rename = "Cmd")]
    pub cmd: u32,
    #[serde(rename = "Data")]
    pub data: UrlPayload,
    #[serde(rename = "RequestID")]
    pub request_id: String,
    #[serde(rename = "MainboardID")]
    pub mainboard_id: String,
    #[serde(rename = "TimeStamp")]
    pub timestamp: i64,
    #[serde(rename = "From")]
    pub from: u8,
}

/// Path list carried by export commands and confirmations
#[derive(Debug, Serialize)]
pub(crate) struct UrlPayload {
    #[serde(rename = "Url")]
    pub url: Vec<String>,
}

/// Build the export-trigger command for a request
pub(crate) fn export_command(request: &ExportRequest) -> CommandEnvelope {
    CommandEnvelope {
        id: String::new(),
        data: CommandBody {
            cmd: CMD_EXPORT_VIDEO,
            data: UrlPayload {
                url: vec![request.target.clone()],
            },
            request_id: request.request_id.clone(),
            mainboard_id: String::new(),
            timestamp: request.issued_at.timestamp_millis(),
            from: 1,
        },
    }
}

/// An export confirmation pushed by the printer
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ExportNotice {
    /// First element of the confirmation's path list
    pub path: String,
    /// Echoed request token, if the firmware included one
    ///
    /// Decoded but not matched against the outbound token; confirmations are
    /// matched by path alone, as the printer UI does.
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "Data")]
    data: Option<InboundBody>,
}

#[derive(Debug, Deserialize)]
struct InboundBody {
    #[serde(rename = "Cmd")]
    cmd: Option<u32>,
    #[serde(rename = "Data")]
    data: Option<InboundPayload>,
    #[serde(rename = "RequestID")]
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InboundPayload {
    #[serde(rename = "Url")]
    url: Option<Vec<String>>,
}

/// Decode an inbound text frame into an export notice
///
/// Returns `None` for non-JSON frames, other command codes, and confirmations
/// with no path list; absence of expected fields is a normal
/// ignore-and-continue case.
pub(crate) fn decode_export_notice(text: &str) -> Option<ExportNotice> {
    let envelope: InboundEnvelope = serde_json::from_str(text).ok()?;
    let body = envelope.data?;
    if body.cmd != Some(CMD_EXPORT_VIDEO) {
        return None;
    }
    let path = body.data?.url?.into_iter().next()?;
    Some(ExportNotice {
        path,
        request_id: body.request_id,
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_command_serializes_to_the_firmware_shape() {
        let request = ExportRequest::new("/local/aic_tlp/A.mp4");
        let value = serde_json::to_value(export_command(&request)).unwrap();

        assert_eq!(value["Id"], "");
        assert_eq!(value["Data"]["Cmd"], 323);
        assert_eq!(value["Data"]["Data"]["Url"][0], "/local/aic_tlp/A.mp4");
        assert_eq!(value["Data"]["RequestID"], request.request_id.as_str());
        assert_eq!(value["Data"]["MainboardID"], "");
        assert_eq!(value["Data"]["From"], 1);
        assert_eq!(
            value["Data"]["TimeStamp"],
            request.issued_at.timestamp_millis()
        );
    }

    #[test]
    fn decodes_a_confirmation() {
        let text = r#"{"Id":"x","Data":{"Cmd":323,"Data":{"Url":["/local/aic_tlp/A.mp4"]},"RequestID":"abc123"}}"#;
        let notice = decode_export_notice(text).unwrap();
        assert_eq!(notice.path, "/local/aic_tlp/A.mp4");
        assert_eq!(notice.request_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn ignores_other_command_codes() {
        let text = r#"{"Data":{"Cmd":386,"Data":{"Url":["/local/aic_tlp/A.mp4"]}}}"#;
        assert_eq!(decode_export_notice(text), None);
    }

    #[test]
    fn ignores_non_json_frames() {
        assert_eq!(decode_export_notice("pong"), None);
        assert_eq!(decode_export_notice(""), None);
    }

    #[test]
    fn ignores_confirmations_without_a_path_list() {
        assert_eq!(decode_export_notice(r#"{"Data":{"Cmd":323}}"#), None);
        assert_eq!(
            decode_export_notice(r#"{"Data":{"Cmd":323,"Data":{}}}"#),
            None
        );
        assert_eq!(
            decode_export_notice(r#"{"Data":{"Cmd":323,"Data":{"Url":[]}}}"#),
            None
        );
    }

    #[test]
    fn tolerates_missing_request_id() {
        let text = r#"{"Data":{"Cmd":323,"Data":{"Url":["/a.mp4"]}}}"#;
        let notice = decode_export_notice(text).unwrap();
        assert_eq!(notice.path, "/a.mp4");
        assert_eq!(notice.request_id, None);
    }

    #[test]
    fn ignores_scalar_and_array_top_levels() {
        assert_eq!(decode_export_notice("42"), None);
        assert_eq!(decode_export_notice("[1,2,3]"), None);
    }
}
