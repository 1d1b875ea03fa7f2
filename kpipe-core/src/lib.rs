//! Core transcoding machinery for kafka-pipe.
//!
//! This crate holds everything below the Kafka transport: the closed
//! enumeration of wire formats, the varint length-prefixed frame codec used
//! for binary protobuf over local byte streams, the schema set compiled from
//! user-supplied `.proto` files, and the transcoding pipeline that converts
//! `(key, payload)` pairs between formats. The crate performs no network I/O.

pub mod errors;
pub mod format;
pub mod framing;
pub mod message;
pub mod pipeline;
pub mod schema;

pub use errors::{ConfigError, FrameError, SchemaError, TranscodeError};
pub use format::{Direction, Format, Role, WireFamily};
pub use framing::{read_frame, write_frame, FrameReader};
pub use message::Message;
pub use pipeline::Pipeline;
pub use schema::SchemaSet;
