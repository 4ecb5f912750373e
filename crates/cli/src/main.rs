use clap::{Args, Parser, Subcommand};
use ihe_certificates::SamlCertsAndKeys;
use ihe_core::constants::SOAP_CONTENT_TYPE;
use ihe_core::{
    create_and_sign_bulk_xcpd_requests, process_xcpd_response, GatewayConfig,
    OutboundPatientDiscoveryReq, SoapResponse, TransportOutcome,
};
use ihe_saml::verify_xml_signatures;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ihe")]
#[command(about = "Offline tools for IHE gateway envelopes and responses")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and sign a patient discovery envelope for the first gateway in a request
    SignXcpd {
        /// Patient discovery request JSON
        request: PathBuf,
        #[command(flatten)]
        identity: Identity,
    },
    /// Verify every signature in a signed document
    Verify {
        /// Signed XML document
        document: PathBuf,
        /// PEM certificate of the signer
        #[arg(long)]
        cert: PathBuf,
    },
    /// Classify a saved patient discovery response
    ClassifyXcpd {
        /// PRPA_IN201306UV02 SOAP response
        response: PathBuf,
        /// The request the response answers
        #[arg(long)]
        request: PathBuf,
    },
}

/// Sender identity, read from the same variables as the runner.
#[derive(Args)]
struct Identity {
    #[arg(long, env = "IHE_HOME_COMMUNITY_ID")]
    home_community_id: String,
    #[arg(long, env = "IHE_ORGANIZATION_NAME")]
    organization_name: String,
    #[arg(long, env = "IHE_SAML_ISSUER")]
    saml_issuer: String,
    #[arg(long, env = "IHE_SAML_SUBJECT_NAME")]
    saml_subject_name: String,
    #[arg(long, env = "IHE_SAML_CERT_PATH")]
    cert: PathBuf,
    #[arg(long, env = "IHE_SAML_KEY_PATH")]
    key: PathBuf,
    #[arg(long, env = "IHE_SAML_KEY_PASSPHRASE", hide_env_values = true)]
    passphrase: String,
}

fn read_request(path: &Path) -> Result<OutboundPatientDiscoveryReq, Box<dyn std::error::Error>> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ihe=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::SignXcpd { request, identity }) => {
            let request = read_request(&request)?;
            let gateway = request
                .gateways
                .first()
                .ok_or("request has no gateways")?;
            let request = request.for_gateway(gateway);

            let config = GatewayConfig::new(
                &identity.home_community_id,
                &identity.organization_name,
                &identity.saml_issuer,
                &identity.saml_subject_name,
            )?;
            let certs = SamlCertsAndKeys {
                public_cert: fs::read_to_string(&identity.cert)?,
                private_key: fs::read_to_string(&identity.key)?,
                private_key_password: identity.passphrase,
            };

            for envelope in create_and_sign_bulk_xcpd_requests(&request, &config, &certs)? {
                println!("{}", envelope.signed_xml);
            }
        }
        Some(Commands::Verify { document, cert }) => {
            let xml = fs::read_to_string(&document)?;
            let cert = fs::read_to_string(&cert)?;
            if verify_xml_signatures(&xml, &cert) {
                println!("valid");
            } else {
                println!("invalid");
                std::process::exit(1);
            }
        }
        Some(Commands::ClassifyXcpd { response, request }) => {
            let request = read_request(&request)?;
            let gateway = request
                .gateways
                .first()
                .ok_or("request has no gateways")?;
            let outcome = TransportOutcome::Response(SoapResponse {
                content_type: Some(SOAP_CONTENT_TYPE.to_string()),
                body: fs::read(&response)?,
            });

            let classified = process_xcpd_response(&outcome, &request, gateway);
            println!("{}", serde_json::to_string_pretty(&classified)?);
        }
        None => {
            println!("Use 'ihe --help' for commands");
        }
    }

    Ok(())
}
