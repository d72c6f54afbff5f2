//! Connection establishment through the local trqauthd daemon.
//!
//! Opening a scheduler connection is a two-stage handshake: ask the daemon
//! for the active server address, open the TCP channel, then have the daemon
//! authorize that specific connection. The daemon identifies the connection
//! by the client's local port, so authorization must happen after the TCP
//! socket is bound and before any batch request.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::conn::TcpConn;
use crate::error::{Error, Result};
use crate::pipe::{PipeDecoder, PipeEncoder};

const AUTH_CONNECTION: i64 = 1;
const GET_ACTIVE_SERVER: i64 = 2;
const AUTH_TYPE_IFF: i64 = 1;
const AUTH_BUFFER_SIZE: usize = 1024;

/// Default rendezvous point of the trqauthd daemon.
pub const DEFAULT_AUTH_SOCK: &str = "/tmp/trqauthd-unix";

/// Options for connecting to a PBS server.
#[derive(Debug, Clone)]
pub struct Dialer {
    auth_sock: PathBuf,
}

impl Default for Dialer {
    fn default() -> Self {
        Self {
            auth_sock: PathBuf::from(DEFAULT_AUTH_SOCK),
        }
    }
}

impl Dialer {
    pub fn new(auth_sock: impl Into<PathBuf>) -> Self {
        Self {
            auth_sock: auth_sock.into(),
        }
    }

    /// Asks the auth daemon for the address of the active PBS server.
    pub fn get_active_server(&self) -> Result<String> {
        let mut auth = UnixStream::connect(&self.auth_sock)?;

        let mut enc = PipeEncoder::new();
        enc.put_int(GET_ACTIVE_SERVER);
        auth.write_all(enc.as_bytes())?;

        let mut dec = read_response(&mut auth)?;
        let code = dec.get_int()?;
        if code != 0 {
            return Err(Error::Auth(code));
        }

        let host = dec.get_string()?;
        let port = dec.get_int()?;
        let address = format!("{host}:{port}");
        debug!(%address, "resolved active server");
        Ok(address)
    }

    /// Connects to the active PBS server and authorizes the connection.
    pub fn dial(&self) -> Result<TcpConn> {
        let address = self.get_active_server()?;
        self.dial_server(&address)
    }

    /// Connects to the PBS server at `address` and authorizes the
    /// connection through the auth daemon.
    pub fn dial_server(&self, address: &str) -> Result<TcpConn> {
        let user = local_username()?;
        let stream = TcpStream::connect(address)?;
        authorize(&self.auth_sock, &stream, &user)?;
        debug!(%address, %user, "authorized scheduler connection");
        TcpConn::new(stream, user)
    }
}

/// Grants authorization for the given TCP connection to the PBS server.
fn authorize(auth_sock: &Path, stream: &TcpStream, user: &str) -> Result<()> {
    let local = stream.local_addr()?;
    let server = stream.peer_addr()?;

    let mut auth = UnixStream::connect(auth_sock)?;

    let mut enc = PipeEncoder::new();
    enc.put_int(AUTH_CONNECTION);
    enc.put_string(&server.ip().to_string());
    enc.put_int(i64::from(server.port()));
    enc.put_int(AUTH_TYPE_IFF);
    enc.put_string(user);
    enc.put_int(i64::from(std::process::id()));
    enc.put_int(i64::from(local.port()));
    auth.write_all(enc.as_bytes())?;

    let mut dec = read_response(&mut auth)?;
    let code = dec.get_int()?;
    if code != 0 {
        return Err(Error::Auth(code));
    }
    Ok(())
}

/// Reads one ≤1024-byte response datagram from the daemon.
fn read_response(auth: &mut UnixStream) -> Result<PipeDecoder> {
    let mut buf = [0u8; AUTH_BUFFER_SIZE];
    let n = auth.read(&mut buf)?;
    Ok(PipeDecoder::new(&buf[..n]))
}

fn local_username() -> Result<String> {
    match std::env::var("USER") {
        Ok(user) if !user.trim().is_empty() => Ok(user),
        _ => Err(Error::UnknownUser),
    }
}
