// Connection-oriented send/receive for one-shot JSON envelopes. A
// send opens a TCP connection, writes one encoded envelope,
// half-closes the write side, and returns; a receive accepts one
// connection, reads the whole stream to EOF, and parses it. Neither
// side uses a fixed-size buffer, so there is no analogue of the
// original Python implementation's 1024-byte truncation bug.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::envelope::Envelope;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect to `(ip, port)`, write `envelope` as one JSON document, and
/// half-close the write side so the peer's read-to-EOF completes.
/// Fire-and-forget: node-to-node protocol messages are not acknowledged
/// at the transport layer, only at the application layer.
pub fn send_envelope(ip: Ipv4Addr, port: u16, envelope: &Envelope) -> chordify_base::Result<()> {
    let addr = SocketAddrV4::new(ip, port);
    let mut stream = TcpStream::connect_timeout(&addr.into(), CONNECT_TIMEOUT)?;
    stream.set_write_timeout(Some(IO_TIMEOUT))?;
    let body = serde_json::to_vec(envelope)?;
    stream.write_all(&body)?;
    stream.shutdown(std::net::Shutdown::Write)?;
    debug!(target: "chordify", %ip, port, "sent envelope");
    Ok(())
}

/// Read one envelope off an already-accepted connection: read to EOF,
/// then parse. Malformed envelopes are reported to the caller rather
/// than silently dropped; the accept loop logs and moves on.
pub fn read_envelope(stream: &mut TcpStream) -> chordify_base::Result<Envelope> {
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    let mut body = Vec::new();
    stream.read_to_end(&mut body)?;
    let envelope: Envelope = serde_json::from_slice(&body)?;
    Ok(envelope)
}

/// One use, OS-assigned port, used by client-side operations to
/// receive exactly one reply envelope. Binds eagerly so the
/// port is known before the request that references it (as
/// `originReplyPort`) is sent.
pub struct ReplyListener {
    listener: TcpListener,
}

impl ReplyListener {
    pub fn bind() -> chordify_base::Result<ReplyListener> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        listener.set_nonblocking(true)?;
        Ok(ReplyListener { listener })
    }

    pub fn port(&self) -> chordify_base::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Block until a reply arrives or `deadline` elapses, whichever is
    /// first. Polls because `TcpListener` has no blocking-with-timeout
    /// accept; the poll interval is short enough not to add meaningful
    /// latency against the 10s/20s deadlines this is called with.
    pub fn recv(&self, deadline: Duration) -> chordify_base::Result<Envelope> {
        let start = Instant::now();
        loop {
            match self.listener.accept() {
                Ok((mut stream, _)) => {
                    stream.set_nonblocking(false)?;
                    return read_envelope(&mut stream);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= deadline {
                        warn!(target: "chordify", ?deadline, "client operation timed out waiting for reply");
                        return Err(chordify_base::err("timed out waiting for reply"));
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
