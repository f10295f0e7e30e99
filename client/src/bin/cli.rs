use clap::{Parser, Subcommand};
use hermod_client::transparent::TClient;
use hermod_client::{binding_nonce, fetch_enclave_key, init_logging, send_mail, session_secret};

#[derive(Parser)]
#[command(version, about, long_about=None)]
struct Cli {
    #[arg(
        long,
        value_name = "URL",
        default_value = "127.0.0.1:666",
        help = "Address of the Hermod host to contact"
    )]
    host: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch and verify the enclave's attestation report and print its mail key")]
    Report,
    #[command(
        about = "Print the nonce claim an identity assertion must carry for mail sent with this passphrase"
    )]
    Binding {
        #[arg(short, long, help = "Passphrase the session secret is derived from")]
        passphrase: String,
    },
    #[command(about = "Deliver mail to the enclave and print the decrypted reply")]
    Send {
        #[arg(short, long, help = "Passphrase the session secret is derived from")]
        passphrase: String,
        #[arg(short, long, help = "Identity assertion vouching for the sender")]
        assertion: String,
        #[arg(short, long, help = "Plaintext of the mail to deliver")]
        message: String,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    match &cli.command {
        Commands::Report => match fetch_enclave_key::<TClient>(&cli.host) {
            Ok(pk) => tracing::info!("Enclave mail key: {}", hex::encode(pk.as_bytes())),
            Err(err) => tracing::error!("Fetching the enclave report failed: {err}"),
        },
        Commands::Binding { passphrase } => {
            let secret = session_secret(passphrase);
            tracing::info!("Binding nonce: {}", binding_nonce(&secret));
        }
        Commands::Send {
            passphrase,
            assertion,
            message,
        } => {
            let secret = session_secret(passphrase);
            match send_mail::<TClient>(&cli.host, secret, assertion.clone(), message.as_bytes()) {
                Ok(reply) => match String::from_utf8(reply) {
                    Ok(text) => tracing::info!("Reply: {text}"),
                    Err(raw) => tracing::info!("Reply: {}", hex::encode(raw.into_bytes())),
                },
                Err(err) => tracing::error!("Delivery failed: {err}"),
            }
        }
    }
}
