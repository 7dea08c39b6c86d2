//! TCP channel carrying one framed session
//!
//! A [`Channel`] owns exactly one connected socket, obtained either by
//! accepting a single connection ([`Channel::listen`]) or by connecting to a
//! peer ([`Channel::dial`]). The session always starts with the handshake frame
//! (the comma-joined variable names); every later frame is one record.
//!
//! # Lifecycle
//!
//! ```text
//! listen/dial --> handshake --> receive_record* --> close
//! ```
//!
//! The socket carries a read timeout; [`FrameReader`] retries timed-out reads
//! up to the configured budget before a receive fails.

use crate::config::StreamConfig;
use crate::stream::error::{StreamError, StreamResult};
use crate::stream::framing::{write_frame, FrameReader};
use crate::types::Record;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

/// Which side established the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Accepted one incoming connection
    Listener,
    /// Connected to a remote listener
    Dialer,
}

impl std::fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelRole::Listener => write!(f, "listener"),
            ChannelRole::Dialer => write!(f, "dialer"),
        }
    }
}

/// Negotiated session metadata
#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    names: Vec<String>,
}

/// Handle that can tear down a channel's socket from another thread
///
/// Shutting the socket down makes a blocked receive return
/// [`StreamError::ConnectionClosed`] instead of waiting out its retry budget.
#[derive(Debug)]
pub struct ChannelShutdown {
    stream: TcpStream,
}

impl ChannelShutdown {
    /// Shut down both directions of the socket. Errors are ignored.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// One framed TCP session
#[derive(Debug)]
pub struct Channel {
    role: ChannelRole,
    reader: Option<FrameReader<TcpStream>>,
    writer: Option<TcpStream>,
    peer: Option<SocketAddr>,
    session: Option<Session>,
}

impl Channel {
    /// Bind `port` on all interfaces and accept exactly one connection
    pub fn listen(port: u16, config: &StreamConfig) -> StreamResult<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        Self::accept_one(listener, config)
    }

    /// Accept exactly one connection from an already-bound listener
    ///
    /// The listener is dropped afterwards; no further connections are accepted.
    pub fn accept_one(listener: TcpListener, config: &StreamConfig) -> StreamResult<Self> {
        tracing::info!(
            "Waiting for a connection on {:?}",
            listener.local_addr().ok()
        );
        let (stream, peer) = listener.accept()?;
        tracing::info!("Accepted connection from {}", peer);
        Self::from_stream(ChannelRole::Listener, stream, config)
    }

    /// Connect to a listening peer
    pub fn dial<A: ToSocketAddrs>(address: A, config: &StreamConfig) -> StreamResult<Self> {
        let stream = TcpStream::connect(address)?;
        tracing::info!("Connected to {:?}", stream.peer_addr().ok());
        Self::from_stream(ChannelRole::Dialer, stream, config)
    }

    fn from_stream(role: ChannelRole, stream: TcpStream, config: &StreamConfig) -> StreamResult<Self> {
        stream.set_read_timeout(Some(config.read_timeout()))?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        let writer = stream.try_clone()?;
        let reader = FrameReader::new(stream)
            .with_retry_budget(config.retry_budget)
            .with_max_frame_len(config.max_frame_len);

        Ok(Self {
            role,
            reader: Some(reader),
            writer: Some(writer),
            peer,
            session: None,
        })
    }

    /// Which side established the connection
    pub fn role(&self) -> ChannelRole {
        self.role
    }

    /// Address of the connected peer
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Local address of the socket, while it is held
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.writer.as_ref().and_then(|w| w.local_addr().ok())
    }

    /// Whether the socket is still held
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Number of variables negotiated by the handshake
    pub fn variable_count(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.names.len())
    }

    /// Variable names negotiated by the handshake
    pub fn variable_names(&self) -> &[String] {
        self.session.as_ref().map(|s| s.names.as_slice()).unwrap_or(&[])
    }

    /// Receive the handshake frame and return `(variable_count, variable_names)`
    ///
    /// Must be the first receive on the channel. A handshake that cannot be
    /// parsed ends the session; it is never retried.
    pub fn handshake(&mut self) -> StreamResult<(usize, Vec<String>)> {
        if self.session.is_some() {
            return Err(StreamError::HandshakeFailed(
                "handshake already completed".to_string(),
            ));
        }

        let reader = self.reader.as_mut().ok_or(StreamError::NotConnected)?;
        let payload = reader.read_text_frame()?;
        let names = parse_names(&payload)?;

        tracing::info!("Handshake complete: {} variables {:?}", names.len(), names);
        self.session = Some(Session {
            names: names.clone(),
        });
        Ok((names.len(), names))
    }

    /// Send the handshake frame as the producing peer
    pub fn send_handshake<S: AsRef<str>>(&mut self, names: &[S]) -> StreamResult<()> {
        if self.session.is_some() {
            return Err(StreamError::HandshakeFailed(
                "handshake already completed".to_string(),
            ));
        }

        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        let payload = names.join(",");
        // Validate with the same rules the receiving side applies
        parse_names(&payload)?;

        let writer = self.writer.as_mut().ok_or(StreamError::NotConnected)?;
        write_frame(writer, payload.as_bytes())?;
        self.session = Some(Session { names });
        Ok(())
    }

    /// Receive one data frame as a record of the negotiated arity
    pub fn receive_record(&mut self) -> StreamResult<Record> {
        let arity = self.variable_count().ok_or(StreamError::HandshakeRequired)?;
        let reader = self.reader.as_mut().ok_or(StreamError::NotConnected)?;
        let payload = reader.read_text_frame()?;
        parse_record(&payload, arity)
    }

    /// Send one record as a data frame
    pub fn send_record(&mut self, record: &Record) -> StreamResult<()> {
        let arity = self.variable_count().ok_or(StreamError::HandshakeRequired)?;
        if record.arity() != arity {
            return Err(StreamError::MalformedRecord(format!(
                "expected {} values, record has {}",
                arity,
                record.arity()
            )));
        }

        let writer = self.writer.as_mut().ok_or(StreamError::NotConnected)?;
        write_frame(writer, record.to_csv_line().as_bytes())
    }

    /// Get a handle that can shut the socket down from another thread
    pub fn shutdown_handle(&self) -> StreamResult<ChannelShutdown> {
        let writer = self.writer.as_ref().ok_or(StreamError::NotConnected)?;
        Ok(ChannelShutdown {
            stream: writer.try_clone()?,
        })
    }

    /// Shut down and release the socket. Safe to call more than once.
    pub fn close(&mut self) {
        let writer = self.writer.take();
        let reader = self.reader.take();

        if let Some(writer) = writer {
            let _ = writer.shutdown(Shutdown::Both);
            tracing::debug!("Closed {} channel to {:?}", self.role, self.peer);
        }
        drop(reader);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Parse the handshake payload into variable names
fn parse_names(payload: &str) -> StreamResult<Vec<String>> {
    let names: Vec<String> = payload.split(',').map(|n| n.trim().to_string()).collect();

    if names.iter().any(|n| n.is_empty()) {
        return Err(StreamError::HandshakeFailed(format!(
            "invalid variable list {:?}",
            payload
        )));
    }

    Ok(names)
}

/// Parse a data payload into a record with exactly `arity` values
fn parse_record(payload: &str, arity: usize) -> StreamResult<Record> {
    let values = payload
        .split(',')
        .map(|token| {
            token.trim().parse::<f64>().map_err(|_| {
                StreamError::MalformedRecord(format!("non-numeric token {:?}", token))
            })
        })
        .collect::<StreamResult<Vec<f64>>>()?;

    if values.len() != arity {
        return Err(StreamError::MalformedRecord(format!(
            "expected {} values, frame has {}",
            arity,
            values.len()
        )));
    }

    Ok(Record::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn fast_config() -> StreamConfig {
        StreamConfig {
            read_timeout_ms: 20,
            retry_budget: 3,
            ..StreamConfig::default()
        }
    }

    /// Listener channel and the dialer connected to it
    fn connected_pair() -> (Channel, Channel) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let config = fast_config();
        let accept = thread::spawn(move || Channel::accept_one(listener, &fast_config()).unwrap());
        let dialer = Channel::dial(addr, &config).unwrap();
        (accept.join().unwrap(), dialer)
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            parse_names("temp,pressure,humidity").unwrap(),
            vec!["temp", "pressure", "humidity"]
        );
        assert!(matches!(
            parse_names(""),
            Err(StreamError::HandshakeFailed(_))
        ));
        assert!(matches!(
            parse_names("a,,b"),
            Err(StreamError::HandshakeFailed(_))
        ));
    }

    #[test]
    fn test_parse_record() {
        assert_eq!(
            parse_record("1, 2.5,-3e2", 3).unwrap().values(),
            &[1.0, 2.5, -300.0]
        );
        assert!(matches!(
            parse_record("1,2", 3),
            Err(StreamError::MalformedRecord(_))
        ));
        assert!(matches!(
            parse_record("1,x,3", 3),
            Err(StreamError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_handshake_and_records() {
        let (mut listener, mut dialer) = connected_pair();
        assert_eq!(listener.role(), ChannelRole::Listener);
        assert_eq!(dialer.role(), ChannelRole::Dialer);
        assert_eq!(dialer.peer_addr(), listener.local_addr());

        dialer
            .send_handshake(&["temp", "pressure", "humidity"])
            .unwrap();
        dialer.send_record(&Record::new(vec![21.5, 1013.0, 40.0])).unwrap();

        let (count, names) = listener.handshake().unwrap();
        assert_eq!(count, 3);
        assert_eq!(names, vec!["temp", "pressure", "humidity"]);
        assert_eq!(listener.variable_count(), Some(3));

        let record = listener.receive_record().unwrap();
        assert_eq!(record.values(), &[21.5, 1013.0, 40.0]);
    }

    #[test]
    fn test_record_before_handshake() {
        let (mut listener, mut dialer) = connected_pair();
        assert!(matches!(
            listener.receive_record(),
            Err(StreamError::HandshakeRequired)
        ));
        assert!(matches!(
            dialer.send_record(&Record::new(vec![1.0])),
            Err(StreamError::HandshakeRequired)
        ));
    }

    #[test]
    fn test_send_record_wrong_arity() {
        let (_listener, mut dialer) = connected_pair();
        dialer.send_handshake(&["a", "b"]).unwrap();
        assert!(matches!(
            dialer.send_record(&Record::new(vec![1.0])),
            Err(StreamError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_timeout_then_closed() {
        let (mut listener, mut dialer) = connected_pair();
        dialer.send_handshake(&["a"]).unwrap();
        listener.handshake().unwrap();

        assert!(matches!(
            listener.receive_record(),
            Err(StreamError::ReceiveTimeoutExceeded { attempts: 3 })
        ));

        dialer.close();
        thread::sleep(Duration::from_millis(20));
        assert!(matches!(
            listener.receive_record(),
            Err(StreamError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_shutdown_handle_unblocks_receiver() {
        let (mut listener, mut dialer) = connected_pair();
        dialer.send_handshake(&["a"]).unwrap();
        listener.handshake().unwrap();

        listener.shutdown_handle().unwrap().shutdown();
        assert!(matches!(
            listener.receive_record(),
            Err(StreamError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut listener, _dialer) = connected_pair();
        listener.close();
        assert!(!listener.is_open());
        assert!(listener.local_addr().is_none());
        listener.close();
        assert!(matches!(
            listener.handshake(),
            Err(StreamError::NotConnected)
        ));
    }
}
