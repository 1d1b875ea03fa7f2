/// A single record moving through the transcoding pipeline.
///
/// The key is optional and its absence is distinct from an empty key; the
/// payload is always present but may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(key: Option<Vec<u8>>, payload: Vec<u8>) -> Self {
        Message { key, payload }
    }

    pub fn keyed(key: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Message {
            key: Some(key.into()),
            payload: payload.into(),
        }
    }

    pub fn unkeyed(payload: impl Into<Vec<u8>>) -> Self {
        Message {
            key: None,
            payload: payload.into(),
        }
    }
}
