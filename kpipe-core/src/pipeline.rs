//! The transcoding pipeline.
//!
//! A pipeline is an ordered list of conversion stages, fixed at construction
//! from the `(input format, output format, literal keys, pretty)` tuple and
//! applied left-to-right to every `(key, payload)` pair. Stage order is
//! load-bearing: envelope decoding runs before protobuf decoding (the type
//! name may arrive via the envelope key) and protobuf encoding runs before
//! envelope encoding (so the resolved key is available to wrap).

use prost::Message as _;
use prost_reflect::text_format::FormatOptions;
use prost_reflect::{DynamicMessage, MessageDescriptor, SerializeOptions};
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, TranscodeError};
use crate::format::{Format, WireFamily};
use crate::message::Message;
use crate::schema::SchemaSet;

/// One conversion step. Stages are pure `(key, payload) -> (key, payload)`
/// functions; only envelope decoding replaces the key.
#[derive(Debug, Clone)]
enum Stage {
    DecodeEnvelope,
    DecodeProtobuf(SchemaSet),
    EncodeProtobuf(SchemaSet),
    EncodeEnvelope,
    EncodeHex,
}

/// Wire shape of the key envelope: `{"key": "...", "msg": "..."}`.
/// Extra members are tolerated; both named members are required.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    msg: String,
}

pub struct Pipeline {
    stages: Vec<Stage>,
    input: Format,
    output: Format,
    literal_keys: Vec<Vec<u8>>,
    pretty: bool,
}

impl Pipeline {
    /// Build the stage list for a format pair.
    ///
    /// Protobuf conversion stages are inserted exactly when the two wire
    /// families differ and one of them is protobuf; that requires a schema
    /// set, else construction fails with [`ConfigError::MissingSchema`].
    /// When both sides are protobuf no conversion stage is inserted at all:
    /// only protobuf<->JSON conversions are recognized, binary<->text
    /// passes the payload through untouched.
    pub fn build(
        input: Format,
        output: Format,
        literal_keys: Vec<Vec<u8>>,
        pretty: bool,
        schemas: Option<SchemaSet>,
    ) -> Result<Pipeline, ConfigError> {
        let mut stages = Vec::new();

        if input == Format::JsonKey {
            stages.push(Stage::DecodeEnvelope);
        }

        let needs_protobuf = input.family() != output.family()
            && (input.family() == WireFamily::Protobuf || output.family() == WireFamily::Protobuf);
        if needs_protobuf {
            let schemas = schemas.ok_or(ConfigError::MissingSchema { input, output })?;
            if input.family() == WireFamily::Protobuf {
                stages.push(Stage::DecodeProtobuf(schemas.clone()));
            }
            if output.family() == WireFamily::Protobuf {
                stages.push(Stage::EncodeProtobuf(schemas));
            }
        }

        match output {
            Format::JsonKey => stages.push(Stage::EncodeEnvelope),
            Format::Hex => stages.push(Stage::EncodeHex),
            _ => {}
        }

        Ok(Pipeline {
            stages,
            input,
            output,
            literal_keys,
            pretty,
        })
    }

    /// Apply every stage in construction order. The key emerging from one
    /// stage is the key fed to the next.
    pub fn transcode(
        &self,
        key: Option<&[u8]>,
        payload: &[u8],
    ) -> Result<Message, TranscodeError> {
        let mut message = Message::new(key.map(<[u8]>::to_vec), payload.to_vec());
        for stage in &self.stages {
            message = match stage {
                Stage::DecodeEnvelope => decode_envelope(message)?,
                Stage::DecodeProtobuf(schemas) => self.decode_protobuf(schemas, message)?,
                Stage::EncodeProtobuf(schemas) => self.encode_protobuf(schemas, message)?,
                Stage::EncodeEnvelope => encode_envelope(message, self.pretty)?,
                Stage::EncodeHex => encode_hex(message),
            };
        }
        Ok(message)
    }

    /// Parse the payload as protobuf (binary or text, per the input format)
    /// and re-serialize it as JSON with original proto field names.
    fn decode_protobuf(
        &self,
        schemas: &SchemaSet,
        message: Message,
    ) -> Result<Message, TranscodeError> {
        let (key, descriptor) = self.resolve_type(schemas, message.key.as_deref())?;
        let parsed = match self.input {
            Format::ProtobufBinary => DynamicMessage::decode(descriptor, message.payload.as_slice())
                .map_err(|e| TranscodeError::Deserialization(e.to_string()))?,
            _ => {
                let text = std::str::from_utf8(&message.payload)
                    .map_err(|_| TranscodeError::InvalidUtf8("protobuf text payload"))?;
                DynamicMessage::parse_text_format(descriptor, text)
                    .map_err(|e| TranscodeError::Deserialization(e.to_string()))?
            }
        };
        let json = self.message_to_json(&parsed)?;
        Ok(Message::new(Some(key), json))
    }

    /// Parse the payload as JSON and serialize it as protobuf (binary or
    /// text, per the output format).
    fn encode_protobuf(
        &self,
        schemas: &SchemaSet,
        message: Message,
    ) -> Result<Message, TranscodeError> {
        let (key, descriptor) = self.resolve_type(schemas, message.key.as_deref())?;
        let mut deserializer = serde_json::Deserializer::from_slice(&message.payload);
        let parsed = DynamicMessage::deserialize(descriptor, &mut deserializer)
            .map_err(|e| TranscodeError::Deserialization(e.to_string()))?;
        deserializer
            .end()
            .map_err(|e| TranscodeError::Deserialization(e.to_string()))?;

        let payload = match self.output {
            Format::ProtobufBinary => parsed.encode_to_vec(),
            _ => {
                let options = FormatOptions::new().pretty(self.pretty);
                parsed.to_text_format_with_options(&options).into_bytes()
            }
        };
        Ok(Message::new(Some(key), payload))
    }

    /// Resolve the concrete message type: the per-message key if present,
    /// else each configured literal key in order. The first candidate found
    /// in the schema set wins; comparison is exact, no normalization.
    fn resolve_type(
        &self,
        schemas: &SchemaSet,
        key: Option<&[u8]>,
    ) -> Result<(Vec<u8>, MessageDescriptor), TranscodeError> {
        let candidates: Vec<&[u8]> = match key {
            Some(key) => vec![key],
            None => self.literal_keys.iter().map(Vec::as_slice).collect(),
        };
        if candidates.is_empty() {
            return Err(TranscodeError::NoKeyForTypeResolution);
        }
        for candidate in &candidates {
            let Ok(name) = std::str::from_utf8(candidate) else {
                continue;
            };
            if let Some(descriptor) = schemas.find(name) {
                return Ok((candidate.to_vec(), descriptor));
            }
        }
        let tried = candidates
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        Err(TranscodeError::UnknownMessageType(tried))
    }

    fn message_to_json(&self, message: &DynamicMessage) -> Result<Vec<u8>, TranscodeError> {
        let options = SerializeOptions::new().use_proto_field_name(true);
        let mut buf = Vec::new();
        let result = if self.pretty {
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
            let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
            message.serialize_with_options(&mut serializer, &options)
        } else {
            let mut serializer = serde_json::Serializer::new(&mut buf);
            message.serialize_with_options(&mut serializer, &options)
        };
        result.map_err(|e| TranscodeError::Deserialization(e.to_string()))?;
        Ok(buf)
    }
}

/// Unwrap a `{"key": ..., "msg": ...}` envelope, replacing the message key
/// with the UTF-8 bytes of its `key` member.
fn decode_envelope(message: Message) -> Result<Message, TranscodeError> {
    let envelope: Envelope = serde_json::from_slice(&message.payload)
        .map_err(|e| TranscodeError::InvalidEnvelope(e.to_string()))?;
    Ok(Message::new(
        Some(envelope.key.into_bytes()),
        envelope.msg.into_bytes(),
    ))
}

/// Wrap key and payload into the envelope. The key must be present and both
/// key and payload must be UTF-8 text.
fn encode_envelope(message: Message, pretty: bool) -> Result<Message, TranscodeError> {
    let key = message.key.ok_or(TranscodeError::MissingKey)?;
    let envelope = Envelope {
        key: String::from_utf8(key).map_err(|_| TranscodeError::InvalidUtf8("message key"))?,
        msg: String::from_utf8(message.payload)
            .map_err(|_| TranscodeError::InvalidUtf8("message payload"))?,
    };
    let payload = if pretty {
        serde_json::to_vec_pretty(&envelope)
    } else {
        serde_json::to_vec(&envelope)
    }
    .map_err(|e| TranscodeError::InvalidEnvelope(e.to_string()))?;
    Ok(Message::new(Some(envelope.key.into_bytes()), payload))
}

/// Uppercase two-digit hex pairs joined by colons; an empty payload maps to
/// an empty string. The key passes through untouched.
fn encode_hex(message: Message) -> Message {
    let payload = message
        .payload
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(":")
        .into_bytes();
    Message::new(message.key, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as _;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{
        DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    };

    /// A schema set holding a single `test.Main` message with one string
    /// field named `field`, built without shelling out to protoc.
    fn test_schemas() -> SchemaSet {
        let field = FieldDescriptorProto {
            name: Some("field".to_string()),
            number: Some(1),
            label: Some(Label::Optional as i32),
            r#type: Some(Type::String as i32),
            json_name: Some("field".to_string()),
            ..Default::default()
        };
        let main = DescriptorProto {
            name: Some("Main".to_string()),
            field: vec![field],
            ..Default::default()
        };
        let file = FileDescriptorProto {
            name: Some("test.proto".to_string()),
            package: Some("test".to_string()),
            message_type: vec![main],
            syntax: Some("proto3".to_string()),
            ..Default::default()
        };
        let set = FileDescriptorSet { file: vec![file] };
        SchemaSet::from_descriptor_bytes(&set.encode_to_vec()).unwrap()
    }

    // Serialized `test.Main { field: "x" }`: tag 1 length-delimited, 1 byte.
    const MAIN_X: &[u8] = &[0x0A, 0x01, b'x'];

    fn build(
        input: Format,
        output: Format,
        keys: &[&str],
        pretty: bool,
        schemas: Option<SchemaSet>,
    ) -> Pipeline {
        let keys = keys.iter().map(|k| k.as_bytes().to_vec()).collect();
        Pipeline::build(input, output, keys, pretty, schemas).unwrap()
    }

    #[test]
    fn json_to_json_is_identity() {
        let pipeline = build(Format::Json, Format::Json, &[], false, None);
        let out = pipeline.transcode(Some(b"k"), b"{\"a\":1}").unwrap();
        assert_eq!(out, Message::keyed(&b"k"[..], &b"{\"a\":1}"[..]));
    }

    #[test]
    fn json_to_hex() {
        let pipeline = build(Format::Json, Format::Hex, &[], false, None);
        let out = pipeline.transcode(None, b"{\"a\":1}").unwrap();
        // 7 input bytes -> 7 pairs, 6 colons
        assert_eq!(out, Message::unkeyed(&b"7B:22:61:22:3A:31:7D"[..]));
        assert_eq!(out.payload.len(), 3 * 7 - 1);
    }

    #[test]
    fn hex_of_empty_payload_is_empty() {
        let pipeline = build(Format::Json, Format::Hex, &[], false, None);
        let out = pipeline.transcode(None, b"").unwrap();
        assert!(out.payload.is_empty());
    }

    #[test]
    fn hex_is_uppercase_and_colon_separated() {
        let pipeline = build(Format::Json, Format::Hex, &[], false, None);
        for payload in [&b"\x00"[..], &b"\xff\xfe"[..], &b"hello world"[..]] {
            let out = pipeline.transcode(None, payload).unwrap();
            let text = String::from_utf8(out.payload).unwrap();
            if payload.is_empty() {
                assert!(text.is_empty());
            } else {
                assert_eq!(text.len(), 3 * payload.len() - 1);
            }
            assert_eq!(text.matches(':').count(), payload.len().saturating_sub(1));
            assert!(!text.chars().any(|c| c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn envelope_decode_replaces_key_and_payload() {
        let pipeline = build(Format::JsonKey, Format::Json, &[], false, None);
        let out = pipeline
            .transcode(None, b"{\"key\":\"k1\",\"msg\":\"hello\"}")
            .unwrap();
        assert_eq!(out, Message::keyed(&b"k1"[..], &b"hello"[..]));
    }

    #[test]
    fn envelope_decode_tolerates_extra_members() {
        let pipeline = build(Format::JsonKey, Format::Json, &[], false, None);
        let out = pipeline
            .transcode(None, b"{\"key\":\"k\",\"msg\":\"m\",\"other\":1}")
            .unwrap();
        assert_eq!(out.key.as_deref(), Some(&b"k"[..]));
    }

    #[test]
    fn envelope_decode_rejects_missing_member_and_bad_json() {
        let pipeline = build(Format::JsonKey, Format::Json, &[], false, None);
        assert!(matches!(
            pipeline.transcode(None, b"{\"key\":\"k\"}"),
            Err(TranscodeError::InvalidEnvelope(_))
        ));
        assert!(matches!(
            pipeline.transcode(None, b"not json"),
            Err(TranscodeError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn envelope_encode_wraps_key_and_payload() {
        let pipeline = build(Format::Json, Format::JsonKey, &[], false, None);
        let out = pipeline.transcode(Some(b"k1"), b"hello").unwrap();
        assert_eq!(out.payload, b"{\"key\":\"k1\",\"msg\":\"hello\"}".to_vec());
        assert_eq!(out.key.as_deref(), Some(&b"k1"[..]));
    }

    #[test]
    fn envelope_encode_requires_a_key() {
        let pipeline = build(Format::Json, Format::JsonKey, &[], false, None);
        assert!(matches!(
            pipeline.transcode(None, b"hello"),
            Err(TranscodeError::MissingKey)
        ));
    }

    #[test]
    fn envelope_encode_pretty_is_multiline() {
        let pipeline = build(Format::Json, Format::JsonKey, &[], true, None);
        let out = pipeline.transcode(Some(b"k"), b"m").unwrap();
        assert!(out.payload.contains(&b'\n'));
    }

    #[test]
    fn protobuf_stages_require_schemas() {
        let err = Pipeline::build(Format::Json, Format::ProtobufBinary, vec![], false, None)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingSchema { .. }));

        let err = Pipeline::build(Format::ProtobufText, Format::Hex, vec![], false, None)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingSchema { .. }));
    }

    #[test]
    fn protobuf_with_schemas_builds() {
        assert!(Pipeline::build(
            Format::ProtobufBinary,
            Format::Json,
            vec![],
            false,
            Some(test_schemas()),
        )
        .is_ok());
    }

    #[test]
    fn protobuf_to_protobuf_needs_no_schemas_and_passes_through() {
        // binary<->text conversion is not recognized; no stage is inserted
        let pipeline =
            Pipeline::build(Format::ProtobufBinary, Format::ProtobufText, vec![], false, None)
                .unwrap();
        let out = pipeline.transcode(Some(b"k"), MAIN_X).unwrap();
        assert_eq!(out.payload, MAIN_X.to_vec());
    }

    #[test]
    fn decodes_binary_protobuf_to_compact_json() {
        let pipeline = build(
            Format::ProtobufBinary,
            Format::Json,
            &[],
            false,
            Some(test_schemas()),
        );
        let out = pipeline.transcode(Some(b"test.Main"), MAIN_X).unwrap();
        assert_eq!(out.payload, b"{\"field\":\"x\"}".to_vec());
        assert_eq!(out.key.as_deref(), Some(&b"test.Main"[..]));
    }

    #[test]
    fn decodes_text_protobuf_to_json() {
        let pipeline = build(
            Format::ProtobufText,
            Format::Json,
            &["test.Main"],
            false,
            Some(test_schemas()),
        );
        let out = pipeline.transcode(None, b"field: \"x\"").unwrap();
        assert_eq!(out.payload, b"{\"field\":\"x\"}".to_vec());
    }

    #[test]
    fn pretty_json_output_is_indented() {
        let pipeline = build(
            Format::ProtobufBinary,
            Format::Json,
            &[],
            true,
            Some(test_schemas()),
        );
        let out = pipeline.transcode(Some(b"test.Main"), MAIN_X).unwrap();
        let text = String::from_utf8(out.payload).unwrap();
        assert!(text.contains("\n  \"field\""));
    }

    #[test]
    fn encodes_json_to_binary_protobuf() {
        let pipeline = build(
            Format::Json,
            Format::ProtobufBinary,
            &["test.Main"],
            false,
            Some(test_schemas()),
        );
        let out = pipeline.transcode(None, b"{\"field\":\"x\"}").unwrap();
        assert_eq!(out.payload, MAIN_X.to_vec());
        assert_eq!(out.key.as_deref(), Some(&b"test.Main"[..]));
    }

    #[test]
    fn encodes_json_to_text_protobuf_one_line() {
        let pipeline = build(
            Format::Json,
            Format::ProtobufText,
            &["test.Main"],
            false,
            Some(test_schemas()),
        );
        let out = pipeline.transcode(None, b"{\"field\":\"x\"}").unwrap();
        let text = String::from_utf8(out.payload).unwrap();
        assert!(text.contains("field"));
        assert!(text.contains("\"x\""));
        assert!(!text.contains('\n'));
    }

    #[test]
    fn protobuf_json_roundtrip_preserves_fields() {
        let schemas = test_schemas();
        let encode = build(
            Format::Json,
            Format::ProtobufBinary,
            &["test.Main"],
            false,
            Some(schemas.clone()),
        );
        let decode = build(
            Format::ProtobufBinary,
            Format::Json,
            &["test.Main"],
            false,
            Some(schemas),
        );

        let json = b"{\"field\":\"roundtrip\"}";
        let binary = encode.transcode(None, json).unwrap();
        let back = decode.transcode(None, &binary.payload).unwrap();
        assert_eq!(back.payload, json.to_vec());
    }

    #[test]
    fn binary_protobuf_to_hex_goes_through_json() {
        let pipeline = build(
            Format::ProtobufBinary,
            Format::Hex,
            &["test.Main"],
            false,
            Some(test_schemas()),
        );
        let out = pipeline.transcode(None, MAIN_X).unwrap();
        // hex of the decoded JSON text, {"field":"x"} = 13 bytes
        assert_eq!(out.payload.len(), 3 * 13 - 1);
        assert_eq!(&out.payload[..3], b"7B:");
    }

    #[test]
    fn message_key_takes_priority_over_literal_keys() {
        let pipeline = build(
            Format::ProtobufBinary,
            Format::Json,
            &["test.Missing"],
            false,
            Some(test_schemas()),
        );
        // per-message key resolves even though the literal key would not
        assert!(pipeline.transcode(Some(b"test.Main"), MAIN_X).is_ok());
        // and an unresolvable message key is not rescued by literal keys
        assert!(matches!(
            pipeline.transcode(Some(b"test.Missing"), MAIN_X),
            Err(TranscodeError::UnknownMessageType(_))
        ));
    }

    #[test]
    fn literal_keys_are_tried_in_order() {
        let pipeline = build(
            Format::ProtobufBinary,
            Format::Json,
            &["test.Missing", "test.Main"],
            false,
            Some(test_schemas()),
        );
        let out = pipeline.transcode(None, MAIN_X).unwrap();
        assert_eq!(out.key.as_deref(), Some(&b"test.Main"[..]));
    }

    #[test]
    fn no_key_candidates_at_all_fails() {
        let pipeline = build(
            Format::ProtobufBinary,
            Format::Json,
            &[],
            false,
            Some(test_schemas()),
        );
        assert!(matches!(
            pipeline.transcode(None, MAIN_X),
            Err(TranscodeError::NoKeyForTypeResolution)
        ));
    }

    #[test]
    fn unknown_type_name_fails() {
        let pipeline = build(
            Format::ProtobufBinary,
            Format::Json,
            &[],
            false,
            Some(test_schemas()),
        );
        assert!(matches!(
            pipeline.transcode(Some(b"test.Other"), MAIN_X),
            Err(TranscodeError::UnknownMessageType(_))
        ));
    }

    #[test]
    fn malformed_payloads_fail_deserialization() {
        let schemas = test_schemas();
        let decode = build(
            Format::ProtobufBinary,
            Format::Json,
            &["test.Main"],
            false,
            Some(schemas.clone()),
        );
        assert!(matches!(
            decode.transcode(None, &[0xFF, 0xFF, 0xFF]),
            Err(TranscodeError::Deserialization(_))
        ));

        let encode = build(
            Format::Json,
            Format::ProtobufBinary,
            &["test.Main"],
            false,
            Some(schemas),
        );
        assert!(matches!(
            encode.transcode(None, b"not json"),
            Err(TranscodeError::Deserialization(_))
        ));
        assert!(matches!(
            encode.transcode(None, b"{\"no_such_field\":1}"),
            Err(TranscodeError::Deserialization(_))
        ));
    }

    #[test]
    fn envelope_feeds_the_protobuf_encoder() {
        // json_key input carries the type name; the encoder wraps it back up
        let pipeline = build(
            Format::JsonKey,
            Format::ProtobufBinary,
            &[],
            false,
            Some(test_schemas()),
        );
        let out = pipeline
            .transcode(None, b"{\"key\":\"test.Main\",\"msg\":\"{\\\"field\\\":\\\"x\\\"}\"}")
            .unwrap();
        assert_eq!(out.key.as_deref(), Some(&b"test.Main"[..]));
        assert_eq!(out.payload, MAIN_X.to_vec());
    }
}
