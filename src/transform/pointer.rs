//! JSON Pointer (RFC 6901) paths as used by JSON patch operations

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A decoded JSON Pointer: `/metadata/labels/a~1b` has the tokens
/// `["metadata", "labels", "a/b"]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonPointer {
    tokens: Vec<String>,
}

impl JsonPointer {
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut Vec<String> {
        &mut self.tokens
    }

    /// Whether a token addresses an array element (`3` or `-`)
    pub fn is_index(token: &str) -> bool {
        token == "-" || (!token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()))
    }
}

impl FromStr for JsonPointer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        let Some(rest) = s.strip_prefix('/') else {
            return Err(Error::MalformedPatch(format!(
                "JSON pointer `{s}` must start with '/'"
            )));
        };
        let tokens = rest
            .split('/')
            .map(|token| token.replace("~1", "/").replace("~0", "~"))
            .collect();
        Ok(Self { tokens })
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", token.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_escapes() {
        let ptr: JsonPointer = "/metadata/labels/labelgroup.io~1x".parse().unwrap();
        assert_eq!(ptr.tokens(), ["metadata", "labels", "labelgroup.io/x"]);

        // "~01" decodes to "~1", not "/"
        let ptr: JsonPointer = "/a~01b".parse().unwrap();
        assert_eq!(ptr.tokens(), ["a~1b"]);
    }

    #[test]
    fn test_encode_round_trip() {
        for raw in ["/metadata/labels/a~1b~0c", "/spec/template/spec/containers/-", ""] {
            let ptr: JsonPointer = raw.parse().unwrap();
            assert_eq!(ptr.to_string(), raw);
        }
    }

    #[test]
    fn test_reject_relative_pointer() {
        assert!("metadata/labels".parse::<JsonPointer>().is_err());
    }

    #[test]
    fn test_is_index() {
        assert!(JsonPointer::is_index("0"));
        assert!(JsonPointer::is_index("-"));
        assert!(!JsonPointer::is_index("labels"));
        assert!(!JsonPointer::is_index(""));
    }
}
