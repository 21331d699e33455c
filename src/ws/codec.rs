//! JSON message codec
//!
//! Peers write objects back to back with no length prefix, and a transport
//! read may hold several objects or only part of one. `ObjectSplitter`
//! re-segments the byte stream on top-level object boundaries, tracking
//! string literals so braces inside strings do not count.

use thiserror::Error;

use super::protocol::{ClientMsg, ServerMsg};

/// Largest single object we are willing to buffer
pub const MAX_OBJECT_BYTES: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("data outside of a JSON object")]
    Stray,

    #[error("object is not valid UTF-8")]
    InvalidUtf8,

    #[error("object exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Incremental splitter for concatenated JSON objects
#[derive(Debug, Default)]
pub struct ObjectSplitter {
    current: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
    stray: bool,
    /// Inside an oversized object: track structure, keep nothing
    skipping: bool,
}

impl ObjectSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every object completed by them, in order
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, CodecError>> {
        let mut out = Vec::new();

        for &b in bytes {
            if self.depth == 0 {
                if b == b'{' {
                    if std::mem::take(&mut self.stray) {
                        out.push(Err(CodecError::Stray));
                    }
                    self.current.push(b);
                    self.depth = 1;
                } else if !b.is_ascii_whitespace() {
                    self.stray = true;
                }
                continue;
            }

            if !self.skipping {
                self.current.push(b);
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
            } else {
                match b {
                    b'"' => self.in_string = true,
                    b'{' => self.depth += 1,
                    b'}' => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            let bytes = std::mem::take(&mut self.current);
                            if !std::mem::take(&mut self.skipping) {
                                out.push(String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8));
                            }
                        }
                    }
                    _ => {}
                }
            }

            if self.current.len() > MAX_OBJECT_BYTES {
                self.current.clear();
                self.skipping = true;
                out.push(Err(CodecError::TooLarge {
                    limit: MAX_OBJECT_BYTES,
                }));
            }
        }

        if std::mem::take(&mut self.stray) {
            out.push(Err(CodecError::Stray));
        }
        out
    }

    /// Bytes of an unfinished object still buffered
    pub fn pending(&self) -> usize {
        self.current.len()
    }
}

pub fn decode_client(object: &str) -> Result<ClientMsg, CodecError> {
    Ok(serde_json::from_str(object)?)
}

pub fn encode_server(msg: &ServerMsg) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::Direction;

    fn split_objects(text: &str) -> Vec<Result<String, CodecError>> {
        ObjectSplitter::new().push(text.as_bytes())
    }

    fn ok(results: Vec<Result<String, CodecError>>) -> Vec<String> {
        results.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_splits_adjacent_objects() {
        let objects = ok(split_objects(r#"{"type":"turn","direction":"EAST"}{"type":"turn","direction":"NORTH"}"#));
        assert_eq!(objects.len(), 2);
        assert_eq!(
            decode_client(&objects[1]).unwrap(),
            ClientMsg::Turn {
                direction: Direction::North
            }
        );
    }

    #[test]
    fn test_object_split_across_reads() {
        let mut splitter = ObjectSplitter::new();
        assert!(splitter.push(br#"{"type":"tu"#).is_empty());
        assert!(splitter.pending() > 0);
        let out = ok(splitter.push(br#"rn","direction":"WEST"}{"ty"#));
        assert_eq!(out, vec![r#"{"type":"turn","direction":"WEST"}"#.to_string()]);
        let out = ok(splitter.push(br#"pe":"move"}"#));
        assert_eq!(out, vec![r#"{"type":"move"}"#.to_string()]);
        assert_eq!(splitter.pending(), 0);
    }

    #[test]
    fn test_braces_inside_strings_do_not_split() {
        let text = r#"{"a":"}{","b":"\"}"}{"c":{"d":1}}"#;
        let out = ok(split_objects(text));
        assert_eq!(out, vec![r#"{"a":"}{","b":"\"}"}"#.to_string(), r#"{"c":{"d":1}}"#.to_string()]);
    }

    #[test]
    fn test_whitespace_between_objects_is_ignored() {
        let out = ok(split_objects("{\"x\":1}\n  {\"x\":2}\r\n"));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_stray_bytes_reported_once() {
        let out = split_objects(r#"garbage{"x":1}"#);
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(CodecError::Stray)));
        assert!(out[1].is_ok());
    }

    #[test]
    fn test_truncated_object_stays_buffered() {
        let mut splitter = ObjectSplitter::new();
        assert!(splitter.push(br#"{"type":"turn""#).is_empty());
        assert_eq!(splitter.pending(), 14);
    }

    #[test]
    fn test_oversized_object_is_dropped() {
        let mut splitter = ObjectSplitter::new();
        let mut big = b"{\"pad\":\"".to_vec();
        big.extend(std::iter::repeat(b'x').take(MAX_OBJECT_BYTES + 1));
        let out = splitter.push(&big);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(CodecError::TooLarge { .. })));
        assert_eq!(splitter.pending(), 0);

        // A brace still inside the oversized string must not open a new object
        let out = splitter.push(b"{ still padding\"}{\"x\":1}");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_deref().unwrap(), "{\"x\":1}");
        assert_eq!(splitter.pending(), 0);
    }

    #[test]
    fn test_malformed_json_fails_decode() {
        assert!(matches!(decode_client("{\"type\":}"), Err(CodecError::Json(_))));
    }
}
