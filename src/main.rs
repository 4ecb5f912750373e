use anyhow::Context;
use serde_json::Value;
use std::fs;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ihe_certificates::SamlCertsAndKeys;
use ihe_core::{
    timeout_from_env_value, trust_all_from_env_value, GatewayClient, GatewayConfig,
    OutboundRequest, TransportConfig,
};

fn required_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn read_pem(path_var: &str) -> anyhow::Result<String> {
    let path = required_env(path_var)?;
    fs::read_to_string(&path).with_context(|| format!("failed to read {path_var} ({path})"))
}

/// Build the client configuration from `IHE_*` environment variables.
fn config_from_env() -> anyhow::Result<(GatewayConfig, SamlCertsAndKeys)> {
    let transport = TransportConfig {
        timeout: timeout_from_env_value(std::env::var("IHE_HTTP_TIMEOUT_SECS").ok())?,
        trust_all_server_certificates: trust_all_from_env_value(
            std::env::var("IHE_TRUST_ALL_SERVER_CERTS").ok(),
        )?,
    };
    let config = GatewayConfig::new(
        &required_env("IHE_HOME_COMMUNITY_ID")?,
        &required_env("IHE_ORGANIZATION_NAME")?,
        &required_env("IHE_SAML_ISSUER")?,
        &required_env("IHE_SAML_SUBJECT_NAME")?,
    )?
    .with_transport(transport);

    let certs = SamlCertsAndKeys {
        public_cert: read_pem("IHE_SAML_CERT_PATH")?,
        private_key: read_pem("IHE_SAML_KEY_PATH")?,
        private_key_password: required_env("IHE_SAML_KEY_PASSPHRASE")?,
    };

    Ok((config, certs))
}

/// One request object or an array of them.
fn parse_requests(json: &str) -> anyhow::Result<Vec<OutboundRequest>> {
    let value: Value = serde_json::from_str(json).context("request is not valid JSON")?;
    let requests = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(requests)
}

/// Runs outbound IHE transactions from the command line.
///
/// Reads an `OutboundRequest` JSON document from the file named by the first argument, or from
/// stdin when no argument is given, and prints the classified responses as a JSON array.
///
/// # Environment Variables
/// - `IHE_HOME_COMMUNITY_ID`: sender home community OID
/// - `IHE_ORGANIZATION_NAME`: sender organization name
/// - `IHE_SAML_ISSUER`: SAML assertion issuer
/// - `IHE_SAML_SUBJECT_NAME`: X.509 subject name for the assertion `NameID`
/// - `IHE_SAML_CERT_PATH` / `IHE_SAML_KEY_PATH`: PEM certificate and encrypted private key
/// - `IHE_SAML_KEY_PASSPHRASE`: private key passphrase
/// - `IHE_HTTP_TIMEOUT_SECS`: per-request timeout (default: 120)
/// - `IHE_TRUST_ALL_SERVER_CERTS`: skip server certificate verification (default: false)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("ihe=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (config, certs) = config_from_env()?;

    let input = match std::env::args().nth(1) {
        Some(path) => fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin().read_to_string(&mut buffer).await?;
            buffer
        }
    };
    let requests = parse_requests(&input)?;

    let client = GatewayClient::new(config, certs)?;
    let mut responses = Vec::new();
    for request in &requests {
        responses.extend(client.execute(request).await?);
    }
    tracing::info!(requests = requests.len(), responses = responses.len(), "all requests complete");

    println!("{}", serde_json::to_string_pretty(&responses)?);
    Ok(())
}
