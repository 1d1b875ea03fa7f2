use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, ValueEnum};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use tokio::time::timeout;
use tracing::{debug, info};

use kpipe_core::{write_frame, Direction, Format, Message as Transcoded, Pipeline, Role, SchemaSet};

use crate::utils::kafka::{self, ConnectionArgs};
use crate::utils::{split_keys, FormatArg};

// An idle topic ends the run, like the original poll-timeout exit.
const RECV_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(after_help = EXAMPLES_TEXT)]
pub struct Consume {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(
        long,
        default_value = "kpipe",
        help = "Kafka consumer group id (default: kpipe)"
    )]
    pub group_id: String,

    #[arg(
        long,
        short = 'k',
        help = "Comma-separated keys: filters consumed messages and names protobuf type candidates"
    )]
    pub key: Option<String>,

    #[arg(
        long,
        value_parser = parse_time,
        help = "Skip messages stamped before this ISO 8601 time, e.g. 2025-10-01T12:00:00"
    )]
    pub start_time: Option<NaiveDateTime>,

    #[arg(
        long,
        value_parser = parse_time,
        help = "Stop after the first message stamped at or past this ISO 8601 time"
    )]
    pub end_time: Option<NaiveDateTime>,

    #[arg(
        long,
        value_enum,
        default_value = "json",
        help = "Format of the payloads consumed from the topic (default: json)"
    )]
    pub input_format: FormatArg,

    #[arg(
        long,
        value_enum,
        default_value = "json",
        help = "Format of the messages written to stdout (default: json)"
    )]
    pub output_format: FormatArg,

    #[arg(
        long,
        value_enum,
        default_value = "none",
        help = "Decorate emitted messages; 'pretty' also pretty-prints transcoded payloads (default: none)"
    )]
    pub decorate: DecorateArg,

    #[arg(
        long,
        num_args = 1..,
        help = "Proto schema files for protobuf transcoding; imports resolve against the first file's directory"
    )]
    pub proto_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum DecorateArg {
    None,
    Json,
    Pretty,
}

const EXAMPLES_TEXT: &str = r#"
EXAMPLES:
    # Dump a topic as line-delimited JSON
    kpipe consume -b localhost:9092 -t events

    # Decode binary protobuf records to JSON, resolving the type from the
    # message key
    kpipe consume -b localhost:9092 -t events \
        --input-format protobuf_binary \
        --proto-files ./schemas/main.proto

    # Replay a time window, filtered to two keys
    kpipe consume -b localhost:9092 -t events \
        --start-time 2025-10-01T12:00:00 \
        --end-time 2025-10-02T13:30:00 \
        -k test.Main,test.Aux \
        --input-format protobuf_binary \
        --proto-files ./schemas/main.proto

    # Inspect raw payloads as hex with record coordinates
    kpipe consume -b localhost:9092 -t events \
        --output-format hex --decorate pretty

NOTES:
    - The run ends after 10 idle seconds or past --end-time
    - Binary protobuf output is written as varint length-prefixed frames;
      every other output format is one message per line
"#;

pub async fn handle_consume(consume: Consume) -> Result<()> {
    let input: Format = consume.input_format.into();
    let output: Format = consume.output_format.into();
    input.ensure_allowed(Role::Consume, Direction::Input)?;
    output.ensure_allowed(Role::Consume, Direction::Output)?;

    let literal_keys = split_keys(consume.key.as_deref());
    let pretty = consume.decorate == DecorateArg::Pretty;
    let schemas = if consume.proto_files.is_empty() {
        None
    } else {
        Some(SchemaSet::load(&consume.proto_files)?)
    };
    let pipeline = Pipeline::build(input, output, literal_keys.clone(), pretty, schemas)?;

    let mut config = kafka::client_config(&consume.connection)?;
    config
        .set("group.id", &consume.group_id)
        .set("auto.offset.reset", "earliest")
        .set("enable.partition.eof", "true");
    let consumer: StreamConsumer = config.create().context("failed to create kafka consumer")?;
    consumer
        .subscribe(&[consume.connection.topic.as_str()])
        .context("failed to subscribe to topic")?;

    info!("streaming from topic {} to stdout", consume.connection.topic);

    let start_millis = consume.start_time.map(|t| t.and_utc().timestamp_millis());
    let end_millis = consume.end_time.map(|t| t.and_utc().timestamp_millis());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut skipped_by_time = 0u64;
    let mut skipped_by_key = 0u64;

    loop {
        let message = match timeout(RECV_TIMEOUT, consumer.recv()).await {
            Err(_) => break,
            Ok(Err(KafkaError::PartitionEOF(partition))) => {
                info!("reached end of partition {partition}");
                continue;
            }
            Ok(Err(e)) => return Err(e).context("kafka consume error"),
            Ok(Ok(message)) => message,
        };

        let stamp = message.timestamp().to_millis().unwrap_or_default();
        if let Some(start) = start_millis {
            if stamp < start {
                skipped_by_time += 1;
                continue;
            }
        }
        if !literal_keys.is_empty() {
            let matched = message
                .key()
                .map(|key| literal_keys.iter().any(|candidate| candidate == key))
                .unwrap_or(false);
            if !matched {
                skipped_by_key += 1;
                continue;
            }
        }

        let payload = message.payload().unwrap_or_default();
        let transcoded = pipeline.transcode(message.key(), payload)?;
        write_message(&mut out, &message, &transcoded, output, consume.decorate)?;

        if let Some(end) = end_millis {
            if stamp >= end {
                debug!(
                    "reached end time on partition {} at offset {}",
                    message.partition(),
                    message.offset()
                );
                break;
            }
        }
    }

    out.flush()?;
    debug!("done: {skipped_by_time} messages skipped by time, {skipped_by_key} skipped by key");

    Ok(())
}

fn write_message<W: Write>(
    out: &mut W,
    message: &BorrowedMessage<'_>,
    transcoded: &Transcoded,
    output: Format,
    decorate: DecorateArg,
) -> Result<()> {
    if output.is_framed() {
        write_frame(out, &transcoded.payload)?;
        return Ok(());
    }

    let key = transcoded
        .key
        .as_deref()
        .map(|key| String::from_utf8_lossy(key).into_owned());
    let value = String::from_utf8_lossy(&transcoded.payload);
    let line = match decorate {
        DecorateArg::None => value.into_owned(),
        DecorateArg::Pretty => format!(
            "{}:{} @ {} | Key: {:?} | Message: {}",
            message.topic(),
            message.partition(),
            message.offset(),
            key,
            value,
        ),
        DecorateArg::Json => serde_json::json!({
            "topic": message.topic(),
            "partition": message.partition(),
            "offset": message.offset(),
            "timestamp": message.timestamp().to_millis(),
            "key": key,
            "value": value,
        })
        .to_string(),
    };
    writeln!(out, "{line}")?;
    Ok(())
}

fn parse_time(arg: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(arg, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| format!("invalid time '{arg}': {e}"))
}
