mod com;
mod config;

use std::net::{TcpListener, TcpStream};

use clap::Parser;
use shared::mail::SealedEnvelope;
use shared::{MsgFromHost, MsgToHost, ServerMsg};
use tracing::{error, info};

use crate::com::{client_read, client_write, Tcp};
use crate::config::Config;

#[derive(Parser, Clone)]
#[command(version, about, long_about=None)]
pub struct Cli {
    #[arg(
        long,
        value_name = "URL",
        help = "Address of the enclave process. Defaults to [ 0.0.0.0:12345 ]."
    )]
    pub enclave: Option<String>,
    #[arg(
        long,
        value_name = "URL",
        help = "Address to listen on for client connections. Defaults to [ 0.0.0.0:666 ]."
    )]
    pub listen: Option<String>,
    #[arg(
        long,
        value_name = "MILLIS",
        help = "How long to wait on a client connection before dropping it."
    )]
    pub listen_timeout: Option<u64>,
}

/// Forward one client request into the enclave and relay whatever the
/// enclave emits back to the waiting client.
///
/// Reply mail goes through the outbox queue rather than straight to the
/// socket: the enclave emits mail addressed to a session, and the host
/// merely polls the queue for anything to deliver.
fn handle_connection(
    mut client_conn: TcpStream,
    enclave_conn: &mut Tcp,
    outbox_tx: &flume::Sender<SealedEnvelope>,
    outbox_rx: &flume::Receiver<SealedEnvelope>,
) -> std::io::Result<()> {
    let Some(req) = client_read(&mut client_conn) else {
        return Ok(());
    };
    let Ok(msg) = MsgFromHost::try_from(&req) else {
        return Ok(());
    };
    enclave_conn.write(msg);
    match enclave_conn.read() {
        Ok(MsgToHost::PostMail { sequence_id, mail }) => {
            info!(sequence_id, "Enclave posted reply mail");
            let _ = outbox_tx.send(mail);
        }
        Ok(msg @ (MsgToHost::ErrorForClient(_) | MsgToHost::Report(_))) => {
            if let Ok(resp) = ServerMsg::try_from(msg) {
                client_write(&mut client_conn, &resp)?;
            }
        }
        Ok(MsgToHost::Error(err)) => error!("Received error from enclave: {err}"),
        Ok(MsgToHost::Basic(msg)) => info!("Received message: {msg}"),
        Err(e) => error!("Error receiving message from enclave: {e}"),
    }

    // drain the outbox to the client waiting on this exchange
    for mail in outbox_rx.try_iter() {
        client_write(&mut client_conn, &ServerMsg::Mail(mail))?;
    }
    Ok(())
}

fn main() -> std::io::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = Config::load_or_init(cli);
    info!("Hermod host started.");
    let mut enclave_connection = Tcp::new(&config.enclave_url)?;
    let (outbox_tx, outbox_rx) = flume::unbounded();
    let listener = TcpListener::bind(&config.listen_url)?;
    for stream in listener.incoming().flatten() {
        stream.set_read_timeout(Some(config.listen_timeout)).unwrap();
        if let Err(e) = handle_connection(stream, &mut enclave_connection, &outbox_tx, &outbox_rx)
        {
            error!("Error handling client request: {e}");
        }
    }

    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_ansi(true)
        .init();
}
