use std::path::PathBuf;

use thiserror::Error;

use crate::format::{Direction, Format, Role};

/// Errors raised while building a [`SchemaSet`](crate::schema::SchemaSet).
/// All of them are fatal at startup; there is no partial schema set.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("proto file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("schema compilation failed: {0}")]
    Compile(String),

    #[error("failed to load the compiled descriptor set: {0}")]
    Load(String),
}

/// Configuration errors, detected before any message is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("transcoding between {input} and {output} requires proto schema files")]
    MissingSchema { input: Format, output: Format },

    #[error("format {format} is not allowed as {direction} when {role}")]
    UnsupportedFormat {
        format: Format,
        role: Role,
        direction: Direction,
    },

    #[error("a message key is required to resolve protobuf types: configure a default key or use the json_key input format")]
    MissingKeySource,

    #[error("unknown format: {0}")]
    UnknownFormat(String),
}

/// Per-message errors. A failed transcode aborts that message and
/// propagates to the driver; messages are never silently dropped.
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("cannot resolve a protobuf type: message has no key and no default keys are configured")]
    NoKeyForTypeResolution,

    #[error("no message type found in the schema set for any of: {0}")]
    UnknownMessageType(String),

    #[error("failed to deserialize payload: {0}")]
    Deserialization(String),

    #[error("payload is not a valid key envelope: {0}")]
    InvalidEnvelope(String),

    #[error("output format requires a message key, but the message has none")]
    MissingKey,

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
}

/// Errors from the varint length-prefixed frame codec.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("stream ended in the middle of a frame")]
    Truncated,

    #[error("frame length varint exceeds the maximum width")]
    VarintOverflow,

    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}
