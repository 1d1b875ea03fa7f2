pub mod kafka;

use clap::ValueEnum;
use kpipe_core::Format;

/// CLI-facing mirror of the core format enumeration; names match the wire
/// format names (`json_key`, not `json-key`).
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum FormatArg {
    Json,
    #[value(name = "json_key")]
    JsonKey,
    Hex,
    #[value(name = "protobuf_binary")]
    ProtobufBinary,
    #[value(name = "protobuf_text")]
    ProtobufText,
}

impl From<FormatArg> for Format {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => Format::Json,
            FormatArg::JsonKey => Format::JsonKey,
            FormatArg::Hex => Format::Hex,
            FormatArg::ProtobufBinary => Format::ProtobufBinary,
            FormatArg::ProtobufText => Format::ProtobufText,
        }
    }
}

/// Split a comma-separated key list into byte keys. `None` yields an empty
/// list; empty entries are dropped.
pub fn split_keys(keys: Option<&str>) -> Vec<Vec<u8>> {
    keys.map(|keys| {
        keys.split(',')
            .filter(|key| !key.is_empty())
            .map(|key| key.as_bytes().to_vec())
            .collect()
    })
    .unwrap_or_default()
}
