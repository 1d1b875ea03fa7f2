use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::errors::ConfigError;

/// The closed set of wire formats the pipeline understands.
///
/// `JsonKey` is a JSON envelope `{"key": ..., "msg": ...}` carrying an
/// explicit message key; `Hex` is colon-separated uppercase pairs and is
/// output-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    JsonKey,
    Hex,
    ProtobufBinary,
    ProtobufText,
}

/// Coarse encoding group of a format, ignoring the binary/text sub-variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFamily {
    Json,
    Protobuf,
    Hex,
}

/// Which side of a stream a format is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// The driver role a format combination is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Produce,
    Consume,
}

impl Format {
    pub fn family(self) -> WireFamily {
        match self {
            Format::Json | Format::JsonKey => WireFamily::Json,
            Format::Hex => WireFamily::Hex,
            Format::ProtobufBinary | Format::ProtobufText => WireFamily::Protobuf,
        }
    }

    /// Local byte streams carry binary protobuf as varint length-prefixed
    /// frames; every other format is one newline-terminated line per message.
    pub fn is_framed(self) -> bool {
        self == Format::ProtobufBinary
    }

    /// Role-dependent allowed subsets: the envelope only enters when
    /// producing, hex and the envelope only leave when consuming.
    pub fn allowed(self, role: Role, direction: Direction) -> bool {
        match (role, direction) {
            (Role::Produce, Direction::Input) => self != Format::Hex,
            (Role::Produce, Direction::Output) => {
                matches!(self, Format::Json | Format::ProtobufBinary | Format::ProtobufText)
            }
            (Role::Consume, Direction::Input) => {
                matches!(self, Format::Json | Format::ProtobufBinary | Format::ProtobufText)
            }
            (Role::Consume, Direction::Output) => true,
        }
    }

    pub fn ensure_allowed(self, role: Role, direction: Direction) -> Result<(), ConfigError> {
        if self.allowed(role, direction) {
            Ok(())
        } else {
            Err(ConfigError::UnsupportedFormat {
                format: self,
                role,
                direction,
            })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::JsonKey => "json_key",
            Format::Hex => "hex",
            Format::ProtobufBinary => "protobuf_binary",
            Format::ProtobufText => "protobuf_text",
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Format::Json),
            "json_key" => Ok(Format::JsonKey),
            "hex" => Ok(Format::Hex),
            "protobuf_binary" => Ok(Format::ProtobufBinary),
            "protobuf_text" => Ok(Format::ProtobufText),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Input => "input",
            Direction::Output => "output",
        })
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Produce => "producing",
            Role::Consume => "consuming",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_ignore_sub_variants() {
        assert_eq!(Format::Json.family(), WireFamily::Json);
        assert_eq!(Format::JsonKey.family(), WireFamily::Json);
        assert_eq!(Format::ProtobufBinary.family(), WireFamily::Protobuf);
        assert_eq!(Format::ProtobufText.family(), WireFamily::Protobuf);
        assert_eq!(Format::Hex.family(), WireFamily::Hex);
    }

    #[test]
    fn hex_is_output_only() {
        assert!(!Format::Hex.allowed(Role::Produce, Direction::Input));
        assert!(!Format::Hex.allowed(Role::Consume, Direction::Input));
        assert!(Format::Hex.allowed(Role::Consume, Direction::Output));
        assert!(!Format::Hex.allowed(Role::Produce, Direction::Output));
    }

    #[test]
    fn envelope_enters_when_producing_and_leaves_when_consuming() {
        assert!(Format::JsonKey.allowed(Role::Produce, Direction::Input));
        assert!(!Format::JsonKey.allowed(Role::Consume, Direction::Input));
        assert!(Format::JsonKey.allowed(Role::Consume, Direction::Output));
        assert!(!Format::JsonKey.allowed(Role::Produce, Direction::Output));
    }

    #[test]
    fn only_binary_protobuf_is_framed() {
        assert!(Format::ProtobufBinary.is_framed());
        assert!(!Format::ProtobufText.is_framed());
        assert!(!Format::Json.is_framed());
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("json_key".parse::<Format>().unwrap(), Format::JsonKey);
        assert_eq!(
            "protobuf_binary".parse::<Format>().unwrap(),
            Format::ProtobufBinary
        );
        assert!("avro".parse::<Format>().is_err());
    }
}
