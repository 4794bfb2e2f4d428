//! Core types for the thermal equilibrium protocol

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operator-assigned identifier of a peripheral node (1..=N)
pub type PeerId = u32;

/// Number of peripheral nodes taking part in a run
pub const PEER_COUNT: usize = 4;

/// Stabilization tolerance on the per-round change of every peripheral value
pub const EPSILON: f64 = 1e-3;

/// Default TCP port of the coordinator
pub const DEFAULT_PORT: u16 = 5000;

/// Longest line accepted from a peer, delimiter included
///
/// Large enough for any message carrying a finite value: `HELLO`, a full
/// `u32` id and `-f64::MAX` at 12 decimals take 341 bytes.
pub const MAX_LINE_LEN: usize = 384;

/// Decimal digits used for floats on the wire
const WIRE_PRECISION: usize = 12;

/// Protocol messages, one per line on the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    /// Peripheral registration with its initial value
    Hello { id: PeerId, value: f64 },
    /// Coordinator's value for the current round
    Central { value: f64 },
    /// Peripheral's recomputed value for the current round
    Temp { id: PeerId, value: f64 },
    /// Run has stabilized; carries the final central value
    Done { value: f64 },
}

impl Message {
    /// Wire tag of this message
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "HELLO",
            Message::Central { .. } => "CENTRAL",
            Message::Temp { .. } => "TEMP",
            Message::Done { .. } => "DONE",
        }
    }

    /// Encode to a single line without the trailing delimiter
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Strictly decode a line (delimiter already stripped)
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        line.parse()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = WIRE_PRECISION;
        match self {
            Message::Hello { id, value } => write!(f, "HELLO {} {:.*}", id, p, value),
            Message::Central { value } => write!(f, "CENTRAL {:.*}", p, value),
            Message::Temp { id, value } => write!(f, "TEMP {} {:.*}", id, p, value),
            Message::Done { value } => write!(f, "DONE {:.*}", p, value),
        }
    }
}

impl FromStr for Message {
    type Err = DecodeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        if line.is_empty() {
            return Err(DecodeError::Empty);
        }

        // Single-space separators only: doubled or trailing spaces yield empty fields
        let fields: Vec<&str> = line.split(' ').collect();
        let tag = fields[0];
        let args = &fields[1..];

        let expected = match tag {
            "HELLO" | "TEMP" => 2,
            "CENTRAL" | "DONE" => 1,
            _ => return Err(DecodeError::UnknownTag(tag.to_string())),
        };
        if args.len() != expected {
            return Err(DecodeError::FieldCount {
                tag: tag.to_string(),
                expected,
                got: args.len(),
            });
        }

        let msg = match tag {
            "HELLO" => Message::Hello {
                id: parse_id(args[0])?,
                value: parse_value(args[1])?,
            },
            "TEMP" => Message::Temp {
                id: parse_id(args[0])?,
                value: parse_value(args[1])?,
            },
            "CENTRAL" => Message::Central {
                value: parse_value(args[0])?,
            },
            _ => Message::Done {
                value: parse_value(args[0])?,
            },
        };
        Ok(msg)
    }
}

fn parse_id(field: &str) -> Result<PeerId, DecodeError> {
    field
        .parse()
        .map_err(|_| DecodeError::InvalidInt(field.to_string()))
}

fn parse_value(field: &str) -> Result<f64, DecodeError> {
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(DecodeError::InvalidFloat(field.to_string())),
    }
}

/// Reasons a line fails to decode as a [`Message`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty line")]
    Empty,

    #[error("unknown message tag {0:?}")]
    UnknownTag(String),

    #[error("{tag} takes {expected} field(s), got {got}")]
    FieldCount {
        tag: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid integer {0:?}")]
    InvalidInt(String),

    #[error("invalid temperature {0:?}")]
    InvalidFloat(String),

    #[error("line is not valid UTF-8")]
    Encoding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let msg = Message::Hello { id: 3, value: 10.0 };
        assert_eq!(msg.encode(), "HELLO 3 10.000000000000");

        let msg = Message::Central { value: 4.96 };
        assert_eq!(msg.encode(), "CENTRAL 4.960000000000");

        let msg = Message::Done { value: -0.5 };
        assert_eq!(msg.encode(), "DONE -0.500000000000");
    }

    #[test]
    fn test_decode_each_kind() {
        assert_eq!(
            Message::decode("TEMP 2 5.200000000000").unwrap(),
            Message::Temp { id: 2, value: 5.2 }
        );
        assert_eq!(
            Message::decode("CENTRAL 4").unwrap(),
            Message::Central { value: 4.0 }
        );

        match Message::decode("DONE 4.999936000000").unwrap() {
            Message::Done { value } => assert!((value - 4.999936).abs() < 1e-12),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(Message::decode(""), Err(DecodeError::Empty));
        assert_eq!(
            Message::decode("HOWDY 1 2"),
            Err(DecodeError::UnknownTag("HOWDY".to_string()))
        );
        assert!(matches!(
            Message::decode("HELLO 1"),
            Err(DecodeError::FieldCount { expected: 2, got: 1, .. })
        ));
        assert!(matches!(
            Message::decode("CENTRAL 1 2"),
            Err(DecodeError::FieldCount { expected: 1, got: 2, .. })
        ));
        assert_eq!(
            Message::decode("TEMP x 1.0"),
            Err(DecodeError::InvalidInt("x".to_string()))
        );
        assert_eq!(
            Message::decode("TEMP 1 warm"),
            Err(DecodeError::InvalidFloat("warm".to_string()))
        );
        assert_eq!(
            Message::decode("TEMP -1 1.0"),
            Err(DecodeError::InvalidInt("-1".to_string()))
        );
    }

    #[test]
    fn test_decode_is_strict_about_spacing_and_case() {
        assert!(Message::decode("CENTRAL  1.0").is_err());
        assert!(Message::decode("CENTRAL 1.0 ").is_err());
        assert!(Message::decode(" CENTRAL 1.0").is_err());
        assert!(Message::decode("central 1.0").is_err());
    }

    #[test]
    fn test_decode_rejects_non_finite() {
        assert!(Message::decode("CENTRAL NaN").is_err());
        assert!(Message::decode("CENTRAL inf").is_err());
        assert!(Message::decode("DONE -infinity").is_err());
    }

    #[test]
    fn test_extreme_values_fit_one_line() {
        let widest = Message::Hello {
            id: PeerId::MAX,
            value: -f64::MAX,
        };
        let line = widest.encode();
        // Room left for the delimiter
        assert!(line.len() < MAX_LINE_LEN, "{} bytes", line.len());
        assert_eq!(Message::decode(&line).unwrap(), widest);

        let msg = Message::Central { value: 1e250 };
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }
}
