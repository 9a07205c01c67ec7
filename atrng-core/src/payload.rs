//! Caller-supplied entropy: text or raw bytes

use crate::{Error, Result};
use bytes::Bytes;
use serde_json::Value;

/// Data accepted by `discard` and `send_data`
///
/// Text is contributed as its UTF-8 encoding. Statically typed callers convert
/// infallibly through the `From` impls; untyped input (`serde_json::Value`)
/// goes through `TryFrom` and is rejected unless it is a string or an array of
/// byte values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Bytes),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Bytes(b) => b,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Text(s) => Bytes::from(s),
            Self::Bytes(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&[u8]> for Payload {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(b))
    }
}

impl<const N: usize> From<&[u8; N]> for Payload {
    fn from(b: &[u8; N]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(b))
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl TryFrom<Value> for Payload {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Self::Text(s)),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| {
                            Error::InvalidInput(format!(
                                "byte arrays may only hold integers 0-255, found {}",
                                item
                            ))
                        })
                })
                .collect::<Result<Vec<u8>>>()
                .map(Self::from),
            other => Err(Error::InvalidInput(format!(
                "data must be text or bytes, not {}",
                kind(&other)
            ))),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_is_utf8() {
        let payload = Payload::from("héllo");
        assert_eq!(payload.as_bytes(), "héllo".as_bytes());
        assert_eq!(payload.len(), 6);
    }

    #[test]
    fn test_bytes_conversions() {
        assert_eq!(Payload::from(b"cd").as_bytes(), b"cd");
        assert_eq!(Payload::from(vec![1u8, 2, 3]).into_bytes(), Bytes::from_static(&[1, 2, 3]));
        assert!(Payload::from(Vec::<u8>::new()).is_empty());
    }

    #[test]
    fn test_untyped_accepts_text_and_byte_arrays() {
        assert_eq!(
            Payload::try_from(json!("ab")).unwrap(),
            Payload::Text("ab".to_string())
        );
        assert_eq!(
            Payload::try_from(json!([99, 100])).unwrap().as_bytes(),
            b"cd"
        );
    }

    #[test]
    fn test_untyped_rejects_everything_else() {
        let rejected = [
            json!(12345),
            json!(null),
            json!(true),
            json!({"a": 1}),
            json!([1, 256]),
            json!([-1]),
        ];
        for value in rejected {
            let err = Payload::try_from(value).unwrap_err();
            assert!(err.is_invalid_input());
        }
    }

    #[test]
    fn test_error_names_the_type() {
        let err = Payload::try_from(json!(12345)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: data must be text or bytes, not number");
    }
}
