use std::net::TcpStream;

use crate::error::{self, Error};
use shared::{ClientMsg, FramedBytes, ReadWriteByte, ServerMsg};

/// A framed connection to a Hermod host.
pub(crate) struct ServiceConn(shared::tcp::Tcp);

impl ServiceConn {
    pub fn open(url: &str) -> error::Result<Self> {
        let stream = TcpStream::connect(url).map_err(Error::Io)?;
        Ok(Self(shared::tcp::Tcp::new(stream)))
    }

    /// Send a message to the service and wait for its response.
    pub fn request(&mut self, msg: ClientMsg) -> error::Result<ServerMsg> {
        self.write_frame(&msg);
        let frame = self.get_frame().map_err(Error::MsgError)?;
        frame.deserialize().map_err(Error::MsgError)
    }
}

impl ReadWriteByte for ServiceConn {
    fn read_byte(&mut self) -> u8 {
        self.0.read_byte()
    }

    fn write_bytes(&mut self, buf: &[u8]) {
        self.0.write_bytes(buf)
    }
}
