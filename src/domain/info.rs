//! Info-command sender
//!
//! Wraps the raw info round trip with the error-marker check every caller
//! wants.

use crate::domain::ports::{ClusterClient, InfoResponse};
use crate::error::{Error, Result};
use tracing::{debug, trace};

/// Marker the server embeds in failed info responses
pub const ERROR_MARKER: &str = "ERROR";

/// Send one info command and fail if any response value carries the error
/// marker. No retry is attempted.
pub async fn send_info_command(client: &dyn ClusterClient, command: &str) -> Result<InfoResponse> {
    trace!(command, "sending info command");
    let response = client.request_info(command).await?;
    check_response(command, &response)?;
    debug!(command, endpoint = %client.endpoint(), "info command succeeded");
    Ok(response)
}

/// Reject responses containing the error marker
pub fn check_response(command: &str, response: &InfoResponse) -> Result<()> {
    if let Some((name, value)) = response.iter().find(|(_, v)| v.contains(ERROR_MARKER)) {
        return Err(Error::InfoCommand {
            command: command.to_string(),
            response: name.clone(),
            message: value.clone(),
        });
    }
    Ok(())
}

/// Parse `name<TAB>value` lines as returned by the info protocol.
///
/// A line without a tab maps to an empty value.
pub fn parse_info_lines(text: &str) -> InfoResponse {
    text.split('\n')
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once('\t') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_info_lines() {
        let parsed = parse_info_lines("build\t7.0.0.3\nnamespaces\ttest;bar\n");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["build"], "7.0.0.3");
        assert_eq!(parsed["namespaces"], "test;bar");
        assert_eq!(parsed.get_index(0).unwrap().0, "build");
    }

    #[test]
    fn test_parse_line_without_value() {
        let parsed = parse_info_lines("status\n");
        assert_eq!(parsed["status"], "");
    }

    #[test]
    fn test_error_marker_detected() {
        let command = "set-config:context=service;migrate-threads=x";
        let response = parse_info_lines(&format!("{}\tERROR::bad-value\n", command));
        let err = check_response(command, &response).unwrap_err();
        assert_matches!(err, Error::InfoCommand { ref message, .. } if message == "ERROR::bad-value");
        assert!(err.to_string().contains(command));
    }

    #[test]
    fn test_ok_response_passes() {
        let response = parse_info_lines("set-config:context=service;migrate-threads=1\tok\n");
        assert!(check_response("set-config:context=service;migrate-threads=1", &response).is_ok());
    }
}
