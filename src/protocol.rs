//! Wire codec for the Lutron integration protocol.
//!
//! The protocol is plain-text and line-oriented over telnet: outbound
//! commands are CRLF-terminated lines, inbound traffic is a mix of
//! CRLF-terminated status lines (`~OUTPUT,...`, `~SHADEGRP,...`) and
//! newline-less prompts (`login: `, `password: `, `GNET> `). The
//! [`Decoder`] handles both shapes incrementally.

use crate::error::{Result, ShadeError};

/// Level report (set or query)
pub const ACTION_LEVEL: u8 = 1;
/// Shade group is raising
pub const ACTION_RAISING: u8 = 2;
/// Shade group is lowering
pub const ACTION_LOWERING: u8 = 3;
/// Shade group has stopped
pub const ACTION_STOPPED: u8 = 4;
/// Tilt report (set or query), device 0-100 scale
pub const ACTION_TILT: u8 = 14;
/// Combined motion state + level report
pub const ACTION_MOTION_LEVEL: u8 = 32;

const LOGIN_PROMPT: &str = "login:";
const PASSWORD_PROMPT: &str = "password:";
const IDLE_PROMPT: &str = "GNET>";

/// A single outbound protocol line.
///
/// Commands are opaque to the connection layer; the typed constructors
/// build the `#SHADEGRP`/`?SHADEGRP` lines the shade controller needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command(String);

impl Command {
    /// Wrap a raw protocol line
    pub fn raw(line: impl Into<String>) -> Self {
        Self(line.into())
    }

    /// `#SHADEGRP,<id>,1,<level>` — move the group to a level (0-100)
    pub fn set_level(integration_id: u32, level: u8) -> Self {
        Self(format!("#SHADEGRP,{integration_id},{ACTION_LEVEL},{level}"))
    }

    /// `#SHADEGRP,<id>,14,<level>` — tilt the group, device 0-100 scale
    pub fn set_tilt(integration_id: u32, device_level: u8) -> Self {
        Self(format!("#SHADEGRP,{integration_id},{ACTION_TILT},{device_level}"))
    }

    /// `?SHADEGRP,<id>,1` — query the current level
    pub fn query_level(integration_id: u32) -> Self {
        Self(format!("?SHADEGRP,{integration_id},{ACTION_LEVEL}"))
    }

    /// `?SHADEGRP,<id>,14` — query the current tilt
    pub fn query_tilt(integration_id: u32) -> Self {
        Self(format!("?SHADEGRP,{integration_id},{ACTION_TILT}"))
    }

    /// The command line without its terminator
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode for transmission, appending CRLF if absent
    pub fn to_wire(&self) -> String {
        if self.0.ends_with("\r\n") {
            self.0.clone()
        } else {
            format!("{}\r\n", self.0)
        }
    }
}

/// Which status family a report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `~OUTPUT` — dimmer/output reports
    Output,
    /// `~SHADEGRP` — shade group reports
    ShadeGroup,
}

/// A parsed inbound status line
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub kind: EventKind,
    /// Address of the reporting group on the integration bus
    pub integration_id: u32,
    /// Report type within the status message
    pub action_id: u8,
    /// Remaining numeric fields, in wire order
    pub parameters: Vec<f64>,
}

/// One decoded unit of inbound traffic
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// `login: ` — the processor wants the username
    LoginPrompt,
    /// `password: ` — the processor wants the password
    PasswordPrompt,
    /// `GNET> ` — ready for the next command
    IdlePrompt,
    /// A `~OUTPUT`/`~SHADEGRP` status report
    Status(StatusEvent),
    /// Anything else; ignored by the connection
    Unknown(String),
}

/// True if the line contains the processor's ready prompt.
///
/// The prompt is `GNET>` followed by whitespace; it may be embedded after
/// echoed input on the same line.
pub fn is_idle_prompt(s: &str) -> bool {
    match s.find(IDLE_PROMPT) {
        Some(i) => s[i + IDLE_PROMPT.len()..]
            .chars()
            .next()
            .is_some_and(char::is_whitespace),
        None => false,
    }
}

/// Parse one complete inbound line.
pub fn parse_line(line: &str) -> Result<ServerMessage> {
    if is_idle_prompt(line) {
        return Ok(ServerMessage::IdlePrompt);
    }

    let trimmed = line.trim();
    if trimmed == LOGIN_PROMPT {
        return Ok(ServerMessage::LoginPrompt);
    }
    if trimmed == PASSWORD_PROMPT {
        return Ok(ServerMessage::PasswordPrompt);
    }

    if let Some(rest) = trimmed.strip_prefix("~OUTPUT,") {
        return parse_status(EventKind::Output, rest).map(ServerMessage::Status);
    }
    if let Some(rest) = trimmed.strip_prefix("~SHADEGRP,") {
        return parse_status(EventKind::ShadeGroup, rest).map(ServerMessage::Status);
    }

    Ok(ServerMessage::Unknown(trimmed.to_string()))
}

/// Split the comma-separated remainder of a status line into
/// (integration id, action id, parameters).
fn parse_status(kind: EventKind, rest: &str) -> Result<StatusEvent> {
    let mut fields = rest.split(',').map(str::trim);

    let integration_id = fields
        .next()
        .and_then(|f| f.parse::<u32>().ok())
        .ok_or_else(|| ShadeError::Protocol(format!("bad integration id in: {rest}")))?;

    let action_id = fields
        .next()
        .and_then(|f| f.parse::<u8>().ok())
        .ok_or_else(|| ShadeError::Protocol(format!("bad action id in: {rest}")))?;

    let mut parameters = Vec::new();
    for field in fields {
        let value = field
            .parse::<f64>()
            .map_err(|_| ShadeError::Protocol(format!("bad parameter {field:?} in: {rest}")))?;
        if !value.is_finite() {
            return Err(ShadeError::Protocol(format!(
                "non-finite parameter {field:?} in: {rest}"
            )));
        }
        parameters.push(value);
    }

    Ok(StatusEvent {
        kind,
        integration_id,
        action_id,
        parameters,
    })
}

/// Incremental decoder for the inbound byte stream.
///
/// Complete lines are parsed with [`parse_line`]. Leftover bytes that form
/// a login/password/ready prompt are consumed as prompts, since the
/// processor sends those without a newline.
#[derive(Debug, Default)]
pub struct Decoder {
    buf: String,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every message it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<ServerMessage>> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));

        let mut out = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.is_empty() {
                out.push(parse_line(line));
            }
        }

        // Prompts arrive without a terminator; match them in the remainder.
        let pending = self.buf.trim_end();
        if pending == LOGIN_PROMPT {
            self.buf.clear();
            out.push(Ok(ServerMessage::LoginPrompt));
        } else if pending == PASSWORD_PROMPT {
            self.buf.clear();
            out.push(Ok(ServerMessage::PasswordPrompt));
        } else if is_idle_prompt(&self.buf) {
            self.buf.clear();
            out.push(Ok(ServerMessage::IdlePrompt));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_ok(decoder: &mut Decoder, chunk: &str) -> Vec<ServerMessage> {
        decoder
            .feed(chunk.as_bytes())
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_command_wire_appends_crlf() {
        assert_eq!(Command::set_level(3, 50).to_wire(), "#SHADEGRP,3,1,50\r\n");
        assert_eq!(Command::raw("?SHADEGRP,3,1\r\n").to_wire(), "?SHADEGRP,3,1\r\n");
    }

    #[test]
    fn test_command_constructors() {
        assert_eq!(Command::set_tilt(9, 75).as_str(), "#SHADEGRP,9,14,75");
        assert_eq!(Command::query_level(4).as_str(), "?SHADEGRP,4,1");
        assert_eq!(Command::query_tilt(4).as_str(), "?SHADEGRP,4,14");
    }

    #[test]
    fn test_parse_shadegrp_status() {
        let msg = parse_line("~SHADEGRP,3,32,2,40.00").unwrap();
        match msg {
            ServerMessage::Status(ev) => {
                assert_eq!(ev.kind, EventKind::ShadeGroup);
                assert_eq!(ev.integration_id, 3);
                assert_eq!(ev.action_id, 32);
                assert_eq!(ev.parameters, vec![2.0, 40.0]);
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_output_status() {
        let msg = parse_line("~OUTPUT,7,1,100.00").unwrap();
        match msg {
            ServerMessage::Status(ev) => {
                assert_eq!(ev.kind, EventKind::Output);
                assert_eq!(ev.integration_id, 7);
                assert_eq!(ev.parameters, vec![100.0]);
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_parameters_are_errors() {
        assert!(parse_line("~SHADEGRP,3,1,abc").is_err());
        assert!(parse_line("~SHADEGRP,x,1,50").is_err());
        assert!(parse_line("~SHADEGRP,3,1,NaN").is_err());
    }

    #[test]
    fn test_unknown_lines_ignored() {
        let msg = parse_line("~DEVICE,1,2,3").unwrap();
        assert!(matches!(msg, ServerMessage::Unknown(_)));
    }

    #[test]
    fn test_idle_prompt_detection() {
        assert!(is_idle_prompt("GNET> "));
        assert!(is_idle_prompt("QNET GNET>\t"));
        assert!(!is_idle_prompt("GNET>"));
        assert!(!is_idle_prompt("~SHADEGRP,1,1,50"));
    }

    #[test]
    fn test_decoder_newline_less_prompts() {
        let mut decoder = Decoder::new();
        assert_eq!(feed_ok(&mut decoder, "login: "), vec![ServerMessage::LoginPrompt]);
        assert_eq!(feed_ok(&mut decoder, "password: "), vec![ServerMessage::PasswordPrompt]);
        assert_eq!(feed_ok(&mut decoder, "GNET> "), vec![ServerMessage::IdlePrompt]);
    }

    #[test]
    fn test_decoder_split_line() {
        let mut decoder = Decoder::new();
        assert!(feed_ok(&mut decoder, "~SHADEGRP,3,").is_empty());
        let msgs = feed_ok(&mut decoder, "1,75.00\r\nGNET> ");
        assert_eq!(msgs.len(), 2);
        assert!(matches!(&msgs[0], ServerMessage::Status(ev) if ev.integration_id == 3));
        assert_eq!(msgs[1], ServerMessage::IdlePrompt);
    }

    #[test]
    fn test_decoder_multiple_lines_one_chunk() {
        let mut decoder = Decoder::new();
        let msgs = feed_ok(&mut decoder, "~SHADEGRP,1,2\r\n~SHADEGRP,1,4\r\n");
        assert_eq!(msgs.len(), 2);
    }
}
