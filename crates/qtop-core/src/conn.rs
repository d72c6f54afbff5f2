//! Connection abstraction for the scheduler TCP channel.

use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream};

use crate::dis;
use crate::error::Result;

/// A typed connection to a PBS server.
///
/// The batch layer only ever talks through this trait, so tests can
/// substitute a scripted peer for the real socket.
pub trait Conn {
    /// Name of the authorized user for the connection.
    fn user(&self) -> &str;

    fn read_int(&mut self) -> Result<i64>;

    fn read_string(&mut self) -> Result<String>;

    fn write_int(&mut self, n: i64) -> Result<()>;

    fn write_string(&mut self, s: &str) -> Result<()>;

    /// Sends any buffered data to the server.
    fn flush(&mut self) -> Result<()>;

    /// Releases the connection without flushing buffered data.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The real connection: one TCP socket behind buffered halves.
pub struct TcpConn {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    user: String,
}

impl TcpConn {
    pub(crate) fn new(stream: TcpStream, user: String) -> Result<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Ok(Self {
            reader,
            writer,
            user,
        })
    }
}

impl Conn for TcpConn {
    fn user(&self) -> &str {
        &self.user
    }

    fn read_int(&mut self) -> Result<i64> {
        Ok(dis::read_int(&mut self.reader)?)
    }

    fn read_string(&mut self) -> Result<String> {
        Ok(dis::read_string(&mut self.reader)?)
    }

    fn write_int(&mut self, n: i64) -> Result<()> {
        self.writer.write_all(dis::encode_int(n).as_bytes())?;
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.writer.write_all(dis::encode_string(s).as_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Shutdown first; the writer's drop-time flush must not reach the wire.
        self.reader.get_ref().shutdown(Shutdown::Both)?;
        Ok(())
    }
}
