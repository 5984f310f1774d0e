//! Datagram framing for the rcon protocol.
//!
//! Every packet, in both directions, starts with four `0xFF` bytes (the
//! "out-of-band" header). The rest is Latin-1 text:
//!
//! ```text
//! client → server   ÿÿÿÿgetchallenge\n
//! server → client   ÿÿÿÿchallenge 84121941\n
//! client → server   ÿÿÿÿrcon 84121941 <token> sv players\n
//! server → client   ÿÿÿÿprint\n<command output>
//! ```
//!
//! `<token>` is `hash_session(hash_password(secret), challenge)`, see
//! [`crate::hash`]. This module only builds and takes apart packets; the
//! socket, timeouts and retry policy live in the transport crate.

use crate::ProtocolError;
use crate::hash::{hash_password, hash_session};

/// The out-of-band header that prefixes every datagram.
pub const HEADER: [u8; 4] = [0xFF; 4];

/// Largest datagram we ever expect from the server.
pub const MAX_DATAGRAM: usize = 4096;

/// Preamble the server puts in front of command output.
pub const PRINT_PREAMBLE: &str = "print\n";

const BAD_PASSWORD: &str = "Bad rcon_password.";
const BAD_CHALLENGE: &str = "Bad challenge.";
const MAP_NOT_FOUND: &str = "Can't find maps/";

// ---------------------------------------------------------------------------
// Latin-1
// ---------------------------------------------------------------------------

/// Decodes Latin-1 bytes; every byte maps to exactly one char.
pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encodes text as Latin-1.
///
/// # Errors
/// [`ProtocolError::Unencodable`] for characters above `U+00FF`.
pub fn latin1_encode(text: &str) -> Result<Vec<u8>, ProtocolError> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| ProtocolError::Unencodable(c)))
        .collect()
}

// ---------------------------------------------------------------------------
// Packets
// ---------------------------------------------------------------------------

/// Prefixes `body` with the header and encodes it as Latin-1.
pub fn encode_packet(body: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut packet = HEADER.to_vec();
    packet.extend(latin1_encode(body)?);
    Ok(packet)
}

/// Strips the header and decodes the body.
///
/// # Errors
/// [`ProtocolError::MissingHeader`] if the packet does not start with it.
pub fn decode_packet(data: &[u8]) -> Result<String, ProtocolError> {
    let body = data.strip_prefix(&HEADER).ok_or(ProtocolError::MissingHeader)?;
    Ok(latin1_decode(body))
}

/// Builds the challenge request packet.
pub fn challenge_request() -> Vec<u8> {
    let mut packet = HEADER.to_vec();
    packet.extend_from_slice(b"getchallenge\n");
    packet
}

/// Extracts the token from a `challenge <token>` reply body.
pub fn parse_challenge(body: &str) -> Result<String, ProtocolError> {
    let token = body
        .trim_end()
        .strip_prefix("challenge ")
        .ok_or_else(|| ProtocolError::MalformedChallenge(body.to_string()))?;
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(ProtocolError::MalformedChallenge(body.to_string()));
    }
    Ok(token.to_string())
}

/// Rejects commands that cannot travel in a single request.
///
/// # Errors
/// [`ProtocolError::InvalidCommand`] for empty or multi-line commands,
/// [`ProtocolError::Unencodable`] for non Latin-1 text.
pub fn check_command(command: &str) -> Result<(), ProtocolError> {
    if command.trim().is_empty() || command.contains(['\n', '\r']) {
        return Err(ProtocolError::InvalidCommand(command.to_string()));
    }
    if let Some(c) = command.chars().find(|&c| u32::from(c) > 0xFF) {
        return Err(ProtocolError::Unencodable(c));
    }
    Ok(())
}

/// Builds an authenticated command packet.
///
/// # Errors
/// See [`check_command`].
pub fn rcon_request(
    secret: &str,
    challenge: &str,
    command: &str,
) -> Result<Vec<u8>, ProtocolError> {
    check_command(command)?;
    let token = hash_session(&hash_password(secret), challenge);
    encode_packet(&format!("rcon {challenge} {token} {command}\n"))
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// What a server reply to an rcon request means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command output (everything after the `print` preamble).
    Text(String),
    /// The secret was rejected.
    BadPassword,
    /// The challenge was unknown or expired.
    BadChallenge,
    /// The command referenced a map that is not installed.
    MapNotFound(String),
}

/// Classifies the body of an rcon reply (header already stripped).
pub fn classify_reply(body: &str) -> Result<Reply, ProtocolError> {
    let text = body
        .strip_prefix(PRINT_PREAMBLE)
        .ok_or(ProtocolError::MissingPreamble)?;

    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line == BAD_PASSWORD {
        return Ok(Reply::BadPassword);
    }
    if first_line == BAD_CHALLENGE {
        return Ok(Reply::BadChallenge);
    }
    if let Some(start) = text.find(MAP_NOT_FOUND) {
        let rest = &text[start + MAP_NOT_FOUND.len()..];
        let name = rest
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .trim_end_matches(".bsp");
        return Ok(Reply::MapNotFound(name.to_string()));
    }
    Ok(Reply::Text(text.to_string()))
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// A decoded `rcon` request, as seen by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconRequest {
    /// Challenge the client claims to hold.
    pub challenge: String,
    /// `hash_session(hash_password(secret), challenge)`.
    pub token: String,
    /// The console command.
    pub command: String,
}

impl RconRequest {
    /// Parses the body of an `rcon` packet (header already stripped).
    pub fn parse(body: &str) -> Option<Self> {
        let rest = body.strip_prefix("rcon ")?.trim_end_matches(['\n', '\r']);
        let mut parts = rest.splitn(3, ' ');
        let challenge = parts.next()?.to_string();
        let token = parts.next()?.to_string();
        let command = parts.next()?.to_string();
        Some(Self {
            challenge,
            token,
            command,
        })
    }

    /// Returns `true` if the token was derived from `secret`.
    pub fn is_signed_by(&self, secret: &str) -> bool {
        hash_session(&hash_password(secret), &self.challenge) == self.token
    }
}

/// Builds a `challenge <token>` reply packet.
pub fn challenge_reply(token: &str) -> Vec<u8> {
    let mut packet = HEADER.to_vec();
    packet.extend_from_slice(format!("challenge {token}\n").as_bytes());
    packet
}

/// Builds a `print` reply packet carrying `text`.
pub fn print_reply(text: &str) -> Result<Vec<u8>, ProtocolError> {
    encode_packet(&format!("{PRINT_PREAMBLE}{text}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_packet_strips_header() {
        let packet = encode_packet("print\nhello\n").unwrap();
        assert_eq!(&packet[..4], &HEADER);
        assert_eq!(decode_packet(&packet).unwrap(), "print\nhello\n");
    }

    #[test]
    fn test_decode_packet_without_header_fails() {
        assert!(matches!(
            decode_packet(b"print\nhello"),
            Err(ProtocolError::MissingHeader)
        ));
    }

    #[test]
    fn test_latin1_roundtrip_high_bytes() {
        let bytes = [0x88u8, b'A', 0xFF];
        let text = latin1_decode(&bytes);
        assert_eq!(text.chars().count(), 3);
        assert_eq!(latin1_encode(&text).unwrap(), bytes);
    }

    #[test]
    fn test_latin1_encode_rejects_wide_chars() {
        assert!(matches!(
            latin1_encode("snow ☃"),
            Err(ProtocolError::Unencodable('☃'))
        ));
    }

    #[test]
    fn test_parse_challenge_valid() {
        assert_eq!(parse_challenge("challenge 1234\n").unwrap(), "1234");
    }

    #[test]
    fn test_parse_challenge_malformed() {
        assert!(parse_challenge("print\nhi").is_err());
        assert!(parse_challenge("challenge \n").is_err());
        assert!(parse_challenge("challenge a b\n").is_err());
    }

    #[test]
    fn test_rcon_request_roundtrips_through_server_parse() {
        let packet = rcon_request("hello", "42", "sv players").unwrap();
        let body = decode_packet(&packet).unwrap();
        let request = RconRequest::parse(&body).unwrap();
        assert_eq!(request.challenge, "42");
        assert_eq!(request.command, "sv players");
        assert!(request.is_signed_by("hello"));
        assert!(!request.is_signed_by("wrong"));
    }

    #[test]
    fn test_rcon_request_rejects_multiline_commands() {
        assert!(matches!(
            rcon_request("s", "1", "say a\nquit"),
            Err(ProtocolError::InvalidCommand(_))
        ));
        assert!(matches!(
            rcon_request("s", "1", "  "),
            Err(ProtocolError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_classify_reply_variants() {
        assert_eq!(
            classify_reply("print\nBad rcon_password.\n").unwrap(),
            Reply::BadPassword
        );
        assert_eq!(
            classify_reply("print\nBad challenge.\n").unwrap(),
            Reply::BadChallenge
        );
        assert_eq!(
            classify_reply("print\nCan't find maps/newmap.bsp\n").unwrap(),
            Reply::MapNotFound("newmap".into())
        );
        assert_eq!(
            classify_reply("print\nok\n").unwrap(),
            Reply::Text("ok\n".into())
        );
    }

    #[test]
    fn test_classify_reply_requires_preamble() {
        assert!(matches!(
            classify_reply("statusResponse\n"),
            Err(ProtocolError::MissingPreamble)
        ));
    }
}
