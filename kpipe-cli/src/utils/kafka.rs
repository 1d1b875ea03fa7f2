use anyhow::{bail, Result};
use clap::Args;
use rdkafka::ClientConfig;

/// Connection arguments shared by `produce` and `consume`.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    #[arg(
        long,
        short = 'b',
        help = "Comma-separated list of Kafka bootstrap brokers. Example: host1:9092,host2:9092"
    )]
    pub brokers: String,

    #[arg(
        long,
        num_args = 0..,
        help = "librdkafka properties as 'key=value' pairs, e.g. SASL credentials"
    )]
    pub credentials: Vec<String>,

    #[arg(long, short = 't', help = "Topic name")]
    pub topic: String,
}

/// Build a librdkafka client config from the connection arguments.
pub fn client_config(args: &ConnectionArgs) -> Result<ClientConfig> {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", &args.brokers);
    for (key, value) in parse_credentials(&args.credentials)? {
        config.set(key, value);
    }
    Ok(config)
}

fn parse_credentials(credentials: &[String]) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::with_capacity(credentials.len());
    for credential in credentials {
        let Some((key, value)) = credential.split_once('=') else {
            bail!("invalid credential '{credential}': expected key=value");
        };
        pairs.push((key.trim().to_string(), value.trim().to_string()));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_pairs() {
        let pairs = parse_credentials(&[
            "sasl.username=user".to_string(),
            "sasl.password = s=cr=et".to_string(),
        ])
        .unwrap();
        assert_eq!(
            pairs,
            vec![
                ("sasl.username".to_string(), "user".to_string()),
                // split on the first '=' only; values may contain more
                ("sasl.password".to_string(), "s=cr=et".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_pairs_without_separator() {
        assert!(parse_credentials(&["nodelimiter".to_string()]).is_err());
    }
}
