use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::mail::SealedEnvelope;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "std")]
pub mod tcp;

/// Messages to host environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MsgToHost {
    Basic(String),
    Error(String),
    ErrorForClient(String),
    /// Reply mail sealed for the session the request arrived on,
    /// handed to the host for delivery.
    PostMail {
        sequence_id: u64,
        mail: SealedEnvelope,
    },
    Report(Vec<u8>),
}

/// Messages from host environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MsgFromHost {
    Basic(String),
    /// One item of inbound mail together with the identity assertion
    /// that should authorize it. The sequence id is opaque ordering
    /// metadata chosen by the host.
    DeliverMail {
        sequence_id: u64,
        mail: SealedEnvelope,
        assertion: String,
    },
    RequestReport { nonce: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMsg {
    /// Deliver encrypted mail along with the identity assertion
    /// vouching for the sender.
    DeliverMail {
        sequence_id: u64,
        mail: SealedEnvelope,
        assertion: String,
    },
    /// Request the attestation report carrying the enclave's mail key.
    /// The nonce is a challenge against report replays.
    RequestReport { nonce: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMsg {
    /// Reply mail addressed to the session of the original sender
    Mail(SealedEnvelope),
    /// The raw report bytes
    Report(Vec<u8>),
    Error(String),
}

impl<'a> TryFrom<&'a ClientMsg> for MsgFromHost {
    type Error = &'static str;

    fn try_from(msg: &'a ClientMsg) -> Result<Self, Self::Error> {
        match msg {
            ClientMsg::DeliverMail {
                sequence_id,
                mail,
                assertion,
            } => Ok(MsgFromHost::DeliverMail {
                sequence_id: *sequence_id,
                mail: mail.clone(),
                assertion: assertion.clone(),
            }),
            ClientMsg::RequestReport { nonce } => Ok(MsgFromHost::RequestReport { nonce: *nonce }),
        }
    }
}

impl TryFrom<MsgToHost> for ServerMsg {
    type Error = &'static str;

    fn try_from(msg: MsgToHost) -> Result<Self, &'static str> {
        match msg {
            MsgToHost::PostMail { mail, .. } => Ok(ServerMsg::Mail(mail)),
            MsgToHost::Report(report) => Ok(ServerMsg::Report(report)),
            MsgToHost::ErrorForClient(err) => Ok(ServerMsg::Error(err)),
            _ => Err("Message not intended for client"),
        }
    }
}

#[derive(Error, Debug)]
pub enum MsgError {
    #[error("COBS failed to decode framed message with: {0}")]
    Decode(cobs::DecodeError),
    #[error("Failed to deserialize CBOR with: {0}")]
    Deserialize(serde_cbor::Error),
}

pub struct Frame {
    pub bytes: Vec<u8>,
}

impl Frame {
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, MsgError> {
        serde_cbor::from_slice(&self.bytes).map_err(MsgError::Deserialize)
    }
}

/// A trait for getting the next byte in a byte stream
pub trait ReadWriteByte {
    const FRAME_BUF_SIZE: usize = 1024;
    fn read_byte(&mut self) -> u8;

    fn write_bytes(&mut self, buf: &[u8]);
}

/// A trait for reading / writing framed data from a byte stream.
/// This trait should not be implemented directly, but rely on
/// the default implementation.
pub trait FramedBytes: ReadWriteByte {
    /// Blocking method that reads a frame
    ///
    /// Uses an initial buffer with 1Kb in size. Dynamically increases the
    /// size of the frame buffer by 1Kb until either the message is decoded
    /// or an error occurs.
    ///
    /// Returns the raw framed bytes
    fn get_frame(&mut self) -> Result<Frame, MsgError> {
        // initial buffer size for the frame
        let mut buf_size = Self::FRAME_BUF_SIZE;
        // keep track of bytes processed so far incase we need to increase
        // buffer size
        let mut read_bytes = Vec::<u8>::with_capacity(buf_size);
        // continue trying to populate the frame buffer until
        // a successful frame decoding or a decode error occurs.
        loop {
            // initial buffer
            let mut frame_buf = vec![0u8; buf_size];
            let mut decoder = cobs::CobsDecoder::new(&mut frame_buf);
            decoder
                .push(&read_bytes)
                .expect("Previously read bytes should not produce a frame error.");

            loop {
                let b = self.read_byte();
                read_bytes.push(b);
                match decoder.feed(b) {
                    Ok(None) => continue,
                    Ok(Some(len)) => {
                        frame_buf.truncate(len);
                        return Ok(Frame { bytes: frame_buf });
                    }
                    Err(cobs::DecodeError::TargetBufTooSmall) => {
                        // increase the buffer size ny 1Kb
                        buf_size += Self::FRAME_BUF_SIZE;
                        break;
                    }
                    Err(e) => return Err(MsgError::Decode(e)),
                }
            }
        }
    }

    /// Write a serializable message out to the byte stream in CBOR,
    /// framed with COBS.
    fn write_frame<T: Serialize>(&mut self, msg: &T) {
        let data = serde_cbor::to_vec(&msg).unwrap();
        let mut encoded = cobs::encode_vec_with_sentinel(&data, 0);
        encoded.push(0);
        self.write_bytes(&encoded);
    }
}

impl<T: ReadWriteByte> FramedBytes for T {}
