//! Communication primitives for talking with the enclave and clients

use std::io;
use std::io::prelude::*;
use std::net::TcpStream;

use shared::{ClientMsg, FramedBytes, MsgError, MsgFromHost, MsgToHost, ReadWriteByte, ServerMsg};
use tracing::error;

/// The host's persistent framed connection into the enclave.
pub(crate) struct Tcp {
    pub raw: TcpStream,
    buffered: Vec<u8>,
}

impl Tcp {
    /// Create a new stream
    pub fn new(url: &str) -> io::Result<Self> {
        Ok(Self {
            raw: TcpStream::connect(url)?,
            buffered: Default::default(),
        })
    }

    /// Send a [`MsgFromHost`] into the enclave
    pub fn write(&mut self, msg: MsgFromHost) {
        self.write_frame(&msg);
    }

    /// Read a message sent from the enclave
    pub fn read(&mut self) -> Result<MsgToHost, MsgError> {
        let frame = self.get_frame()?;
        frame.deserialize()
    }

    /// Read data from the stream into an internal buffer.
    /// The buffer is a stack, so the bytes are stored in
    /// reverse order that they are received.
    fn buffered_read(&mut self) -> io::Result<()> {
        let mut buffered = vec![0; 10];
        let len = self.raw.read(&mut buffered)?;
        buffered.truncate(len);
        self.buffered = buffered;
        Ok(())
    }
}

impl ReadWriteByte for Tcp {
    fn read_byte(&mut self) -> u8 {
        // block until data is read into
        // internal buffer
        while self.buffered.is_empty() {
            self.buffered_read().unwrap();
            core::hint::spin_loop();
        }
        self.buffered.remove(0)
    }

    fn write_bytes(&mut self, buf: &[u8]) {
        self.raw.write_all(buf).unwrap();
        self.raw.flush().unwrap();
    }
}

/// Read one framed [`ClientMsg`] from a client connection.
///
/// Clients are untrusted and may stall or send garbage; every failure
/// mode (timeout, bad framing, bad CBOR) just drops the request.
pub(crate) fn client_read(client_conn: &mut TcpStream) -> Option<ClientMsg> {
    let mut reader = io::BufReader::new(client_conn);
    let mut framed = vec![];
    if reader.read_until(0, &mut framed).is_err() {
        return None;
    }
    if framed.last() == Some(&0) {
        framed.pop();
    }
    let Ok(bytes) = cobs::decode_vec(&framed) else {
        error!("Error decoding client frame: {:?}", framed);
        return None;
    };
    if let Ok(msg) = serde_cbor::from_slice::<ClientMsg>(&bytes) {
        Some(msg)
    } else {
        error!("Error deserializing client request: {:?}", bytes);
        None
    }
}

/// Write one framed [`ServerMsg`] to a client connection.
pub(crate) fn client_write(client_conn: &mut TcpStream, msg: &ServerMsg) -> io::Result<()> {
    let data = serde_cbor::to_vec(msg).unwrap();
    let mut encoded = cobs::encode_vec_with_sentinel(&data, 0);
    encoded.push(0);
    client_conn.write_all(&encoded)?;
    client_conn.flush()
}
