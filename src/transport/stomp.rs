//! STOMP 1.2 frames as carried in WebSocket text messages.

use std::{fmt::Display, time::Duration};

use crate::domain::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Send => "SEND",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Disconnect => "DISCONNECT",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONNECT" | "STOMP" => StompCommand::Connect,
            "CONNECTED" => StompCommand::Connected,
            "SEND" => StompCommand::Send,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "DISCONNECT" => StompCommand::Disconnect,
            "MESSAGE" => StompCommand::Message,
            "RECEIPT" => StompCommand::Receipt,
            "ERROR" => StompCommand::Error,
            _ => return None,
        })
    }

    // CONNECT and CONNECTED headers are sent verbatim
    fn escapes_headers(&self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl Display for StompCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        StompFrame {
            command,
            headers: vec![],
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.into();
        self
    }

    /// First value for `name`; repeated headers after the first are ignored.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str, heartbeat: &HeartbeatConfig) -> Self {
        StompFrame::new(StompCommand::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", &heartbeat.to_header())
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        StompFrame::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn send_json(destination: &str, body: &str) -> Self {
        StompFrame::new(StompCommand::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(body)
    }

    pub fn disconnect(receipt: &str) -> Self {
        StompFrame::new(StompCommand::Disconnect).header("receipt", receipt)
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, TransportError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(TransportError::Protocol {
                    reason: format!("invalid header escape: \\{}", other.unwrap_or(' ')),
                })
            }
        }
    }
    Ok(out)
}

/// One unit read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Heartbeat,
    Frame(StompFrame),
}

/// Buffers WebSocket text and yields complete frames.
///
/// A message may hold several frames, a frame may span messages, and bare
/// EOLs between frames are heart-beats.
#[derive(Debug, Default)]
pub struct StompDecoder {
    buffer: String,
}

impl StompDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Result<Vec<Inbound>, TransportError> {
        self.buffer.push_str(chunk);
        let mut out = vec![];
        loop {
            if self.buffer.starts_with('\n') {
                self.buffer.drain(..1);
                out.push(Inbound::Heartbeat);
                continue;
            }
            if self.buffer.starts_with("\r\n") {
                self.buffer.drain(..2);
                out.push(Inbound::Heartbeat);
                continue;
            }
            if self.buffer.is_empty() || self.buffer == "\r" {
                break;
            }
            match self.next_frame()? {
                Some(frame) => out.push(Inbound::Frame(frame)),
                None => break,
            }
        }
        Ok(out)
    }

    fn next_frame(&mut self) -> Result<Option<StompFrame>, TransportError> {
        let mut cursor = 0;
        let mut command = None;
        let mut headers = vec![];

        // header block
        loop {
            let Some(offset) = self.buffer[cursor..].find('\n') else {
                return Ok(None);
            };
            let line = self.buffer[cursor..cursor + offset].trim_end_matches('\r');
            cursor += offset + 1;

            if command.is_none() {
                command = Some(StompCommand::parse(line).ok_or_else(|| {
                    TransportError::Protocol {
                        reason: format!("unknown command: {line:?}"),
                    }
                })?);
                continue;
            }
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(TransportError::Protocol {
                    reason: format!("header without colon: {line:?}"),
                });
            };
            headers.push((name.to_string(), value.to_string()));
        }

        let Some(command) = command else {
            return Ok(None);
        };
        if command.escapes_headers() {
            headers = headers
                .into_iter()
                .map(|(k, v)| Ok((unescape_header(&k)?, unescape_header(&v)?)))
                .collect::<Result<Vec<_>, TransportError>>()?;
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim().parse::<usize>().map_err(|_| TransportError::Protocol {
                    reason: format!("bad content-length: {v:?}"),
                })
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                let Some(end) = cursor.checked_add(len) else {
                    return Err(TransportError::Protocol {
                        reason: format!("content-length out of range: {len}"),
                    });
                };
                if self.buffer.len() <= end {
                    return Ok(None);
                }
                if self.buffer.as_bytes()[end] != 0 {
                    return Err(TransportError::Protocol {
                        reason: "frame body not terminated by NUL".into(),
                    });
                }
                end
            }
            None => match self.buffer[cursor..].find('\0') {
                Some(offset) => cursor + offset,
                None => return Ok(None),
            },
        };

        let body = self
            .buffer
            .get(cursor..body_end)
            .ok_or_else(|| TransportError::Protocol {
                reason: "content-length splits a character".into(),
            })?
            .to_string();
        self.buffer.drain(..=body_end);

        Ok(Some(StompFrame {
            command,
            headers,
            body,
        }))
    }
}

/// Heart-beat intervals this client offers in its CONNECT frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often we can send.
    pub outgoing: Duration,
    /// How often we want to hear from the broker.
    pub incoming: Duration,
}

impl HeartbeatConfig {
    pub fn to_header(&self) -> String {
        format!(
            "{},{}",
            self.outgoing.as_millis(),
            self.incoming.as_millis()
        )
    }

    /// Combines our offer with the broker's `heart-beat` header.
    ///
    /// A side that offers zero disables that direction.
    pub fn negotiate(&self, server_header: Option<&str>) -> Result<Heartbeat, TransportError> {
        let (sx, sy) = match server_header {
            None => (0, 0),
            Some(raw) => {
                let parsed = raw
                    .split_once(',')
                    .and_then(|(a, b)| Some((a.trim().parse::<u64>().ok()?, b.trim().parse::<u64>().ok()?)));
                parsed.ok_or_else(|| TransportError::Handshake {
                    reason: format!("bad heart-beat header: {raw:?}"),
                })?
            }
        };
        let cx = self.outgoing.as_millis() as u64;
        let cy = self.incoming.as_millis() as u64;

        let interval = |ours: u64, theirs: u64| {
            (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
        };

        Ok(Heartbeat {
            send_every: interval(cx, sy),
            expect_every: interval(cy, sx),
        })
    }
}

/// Negotiated heart-beat schedule for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Heartbeat {
    pub send_every: Option<Duration>,
    pub expect_every: Option<Duration>,
}

impl Heartbeat {
    /// Silence longer than this means the link is dead.
    pub fn silence_limit(&self) -> Option<Duration> {
        self.expect_every.map(|every| every * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(inbound: Vec<Inbound>) -> Vec<StompFrame> {
        inbound
            .into_iter()
            .filter_map(|i| match i {
                Inbound::Frame(f) => Some(f),
                Inbound::Heartbeat => None,
            })
            .collect()
    }

    #[test]
    fn send_frame_encodes_with_content_length() {
        let frame = StompFrame::send_json("/app/sendMessage", r#"{"a":1}"#);
        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/sendMessage\ncontent-type:application/json\ncontent-length:7\n\n{\"a\":1}\0"
        );
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let hb = HeartbeatConfig {
            outgoing: Duration::from_secs(10),
            incoming: Duration::from_secs(10),
        };
        let encoded = StompFrame::connect("localhost:8080", &hb).encode();
        assert!(encoded.contains("host:localhost:8080\n"));
        assert!(encoded.contains("heart-beat:10000,10000\n"));
    }

    #[test]
    fn header_values_are_escaped() {
        let frame = StompFrame::new(StompCommand::Send).header("x", "a:b\nc");
        assert!(frame.encode().contains("x:a\\cb\\nc\n"));
    }

    #[test]
    fn decodes_message_frame() {
        let raw = "MESSAGE\ndestination:/topic/messages\nsubscription:sub-1\nmessage-id:1\n\n{\"sender\":\"alice\"}\0";
        let mut decoder = StompDecoder::new();
        let out = frames(decoder.push(raw).unwrap());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].command, StompCommand::Message);
        assert_eq!(out[0].get("subscription"), Some("sub-1"));
        assert_eq!(out[0].body, "{\"sender\":\"alice\"}");
    }

    #[test]
    fn unescapes_message_headers() {
        let raw = "MESSAGE\nx:a\\cb\\\\c\n\n\0";
        let out = frames(StompDecoder::new().push(raw).unwrap());
        assert_eq!(out[0].get("x"), Some("a:b\\c"));
    }

    #[test]
    fn bad_escape_is_a_protocol_error() {
        let raw = "MESSAGE\nx:a\\tb\n\n\0";
        assert!(StompDecoder::new().push(raw).is_err());
    }

    #[test]
    fn first_repeated_header_wins() {
        let raw = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let out = frames(StompDecoder::new().push(raw).unwrap());
        assert_eq!(out[0].get("foo"), Some("first"));
    }

    #[test]
    fn buffers_partial_frames() {
        let mut decoder = StompDecoder::new();
        assert!(decoder.push("MESSAGE\ndestina").unwrap().is_empty());
        assert!(decoder.push("tion:/q\n\nhel").unwrap().is_empty());
        let out = frames(decoder.push("lo\0").unwrap());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].body, "hello");
    }

    #[test]
    fn splits_several_frames_and_heartbeats() {
        let raw = "\nRECEIPT\nreceipt-id:1\n\n\0\r\nMESSAGE\n\nbody\0\n";
        let out = StompDecoder::new().push(raw).unwrap();
        let heartbeats = out.iter().filter(|i| **i == Inbound::Heartbeat).count();
        assert_eq!(heartbeats, 3);
        let frames = frames(out);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, StompCommand::Receipt);
        assert_eq!(frames[1].body, "body");
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let raw = "MESSAGE\ncontent-length:3\n\na\0b\0";
        let out = frames(StompDecoder::new().push(raw).unwrap());
        assert_eq!(out[0].body, "a\0b");
    }

    #[test]
    fn oversized_content_length_is_a_protocol_error() {
        let raw = format!("MESSAGE\ncontent-length:{}\n\nabc\0", usize::MAX);
        assert!(matches!(
            StompDecoder::new().push(&raw),
            Err(TransportError::Protocol { .. })
        ));
    }

    #[test]
    fn crlf_line_endings_decode() {
        let raw = "CONNECTED\r\nversion:1.2\r\nheart-beat:0,0\r\n\r\n\0";
        let out = frames(StompDecoder::new().push(raw).unwrap());
        assert_eq!(out[0].command, StompCommand::Connected);
        assert_eq!(out[0].get("version"), Some("1.2"));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(StompDecoder::new().push("HELLO\n\n\0").is_err());
    }

    #[test]
    fn encoded_frame_decodes_back() {
        let frame = StompFrame::new(StompCommand::Message)
            .header("destination", "/user/queue/private")
            .header("note", "a:b")
            .with_body("{\"content\":\"héllo\"}");
        let out = frames(StompDecoder::new().push(&frame.encode()).unwrap());
        assert_eq!(out[0].get("note"), Some("a:b"));
        assert_eq!(out[0].body, frame.body);
    }

    #[test]
    fn heartbeat_negotiation_takes_the_slower_side() {
        let ours = HeartbeatConfig {
            outgoing: Duration::from_millis(10_000),
            incoming: Duration::from_millis(10_000),
        };
        let hb = ours.negotiate(Some("20000,5000")).unwrap();
        assert_eq!(hb.send_every, Some(Duration::from_millis(10_000)));
        assert_eq!(hb.expect_every, Some(Duration::from_millis(20_000)));
        assert_eq!(hb.silence_limit(), Some(Duration::from_millis(40_000)));
    }

    #[test]
    fn zero_disables_a_direction() {
        let ours = HeartbeatConfig {
            outgoing: Duration::from_millis(10_000),
            incoming: Duration::ZERO,
        };
        let hb = ours.negotiate(Some("10000,0")).unwrap();
        assert_eq!(hb.send_every, None);
        assert_eq!(hb.expect_every, None);
        assert_eq!(ours.negotiate(None).unwrap(), Heartbeat::default());
    }

    #[test]
    fn garbage_heartbeat_header_fails_handshake() {
        let ours = HeartbeatConfig {
            outgoing: Duration::from_millis(1),
            incoming: Duration::from_millis(1),
        };
        assert!(matches!(
            ours.negotiate(Some("soon")),
            Err(TransportError::Handshake { .. })
        ));
    }
}
