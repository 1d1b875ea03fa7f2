use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info};

use kpipe_core::{ConfigError, Direction, Format, FrameReader, Pipeline, Role, SchemaSet};

use crate::utils::kafka::{self, ConnectionArgs};
use crate::utils::{split_keys, FormatArg};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(after_help = EXAMPLES_TEXT)]
pub struct Produce {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(
        long,
        short = 'k',
        help = "Default message key; a comma-separated list doubles as protobuf type-name candidates"
    )]
    pub key: Option<String>,

    #[arg(
        long,
        value_enum,
        default_value = "json",
        help = "Format of the messages read from stdin (default: json)"
    )]
    pub input_format: FormatArg,

    #[arg(
        long,
        value_enum,
        default_value = "json",
        help = "Format of the payloads produced to the topic (default: json)"
    )]
    pub output_format: FormatArg,

    #[arg(
        long,
        num_args = 1..,
        help = "Proto schema files for protobuf transcoding; imports resolve against the first file's directory"
    )]
    pub proto_files: Vec<PathBuf>,
}

const EXAMPLES_TEXT: &str = r#"
EXAMPLES:
    # Pipe line-delimited JSON into a topic
    kpipe produce -b localhost:9092 -t events < events.jsonl

    # Encode JSON lines into binary protobuf records
    kpipe produce -b localhost:9092 -t events \
        --key test.Main \
        --output-format protobuf_binary \
        --proto-files ./schemas/main.proto < events.jsonl

    # Input wrapped in {"key": ..., "msg": ...} envelopes carrying the key
    kpipe produce -b localhost:9092 -t events \
        --input-format json_key \
        --output-format protobuf_binary \
        --proto-files ./schemas/main.proto < enveloped.jsonl

    # SASL authentication
    kpipe produce -b broker:9092 -t events \
        --credentials security.protocol=SASL_PLAINTEXT sasl.mechanisms=PLAIN \
            sasl.username=user sasl.password=secret < events.jsonl

NOTES:
    - Binary protobuf input is read as varint length-prefixed frames;
      every other input format is one message per line
    - The record key is the key produced by the pipeline, else the first
      entry of --key
"#;

pub async fn handle_produce(produce: Produce) -> Result<()> {
    let input: Format = produce.input_format.into();
    let output: Format = produce.output_format.into();
    input.ensure_allowed(Role::Produce, Direction::Input)?;
    output.ensure_allowed(Role::Produce, Direction::Output)?;

    let literal_keys = split_keys(produce.key.as_deref());
    // Without a key source there is no way to resolve a protobuf type for
    // any non-JSON output.
    if output != Format::Json && literal_keys.is_empty() && input != Format::JsonKey {
        return Err(ConfigError::MissingKeySource.into());
    }

    let schemas = if produce.proto_files.is_empty() {
        None
    } else {
        Some(SchemaSet::load(&produce.proto_files)?)
    };
    let pipeline = Pipeline::build(input, output, literal_keys.clone(), false, schemas)?;

    let producer: FutureProducer = kafka::client_config(&produce.connection)?
        .create()
        .context("failed to create kafka producer")?;

    info!("streaming from stdin to topic {}", produce.connection.topic);

    let default_key = literal_keys.into_iter().next();
    let topic = produce.connection.topic.as_str();
    let mut sent = 0u64;

    let stdin = io::stdin();
    for payload in read_payloads(stdin.lock(), input.is_framed()) {
        let payload = payload?;
        send_one(&producer, topic, &pipeline, default_key.as_deref(), &payload).await?;
        sent += 1;
    }

    producer
        .flush(Timeout::After(SEND_TIMEOUT))
        .context("failed to flush producer")?;
    info!("produced {sent} messages to {topic}");

    Ok(())
}

/// Payloads from a local byte stream: varint length-prefixed frames for
/// binary protobuf, otherwise one message per line. A blank line is an
/// empty message, not end of input; only EOF ends the stream.
fn read_payloads<'a, R: BufRead + 'a>(
    input: R,
    framed: bool,
) -> Box<dyn Iterator<Item = Result<Vec<u8>>> + 'a> {
    if framed {
        Box::new(
            FrameReader::new(input).map(|frame| frame.context("failed to read frame from stdin")),
        )
    } else {
        Box::new(input.lines().map(|line| {
            line.map(String::into_bytes)
                .context("failed to read line from stdin")
        }))
    }
}

async fn send_one(
    producer: &FutureProducer,
    topic: &str,
    pipeline: &Pipeline,
    default_key: Option<&[u8]>,
    payload: &[u8],
) -> Result<()> {
    let transcoded = pipeline.transcode(None, payload)?;
    let key = transcoded.key.or_else(|| default_key.map(<[u8]>::to_vec));

    let delivery = match &key {
        Some(key) => {
            producer
                .send(
                    FutureRecord::to(topic).payload(&transcoded.payload).key(key),
                    Timeout::After(SEND_TIMEOUT),
                )
                .await
        }
        None => {
            producer
                .send(
                    FutureRecord::<Vec<u8>, _>::to(topic).payload(&transcoded.payload),
                    Timeout::After(SEND_TIMEOUT),
                )
                .await
        }
    };

    let (partition, offset) =
        delivery.map_err(|(e, _)| anyhow::anyhow!("failed to produce message: {e}"))?;
    debug!("delivered to partition {partition} at offset {offset}");
    Ok(())
}
