//! Producing peers for streaming tests

use super::fast_stream_config;
use datavis_ingest::stream::{encode_frame, Channel};
use datavis_ingest::Record;
use std::io::Write;
use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Bind a loopback listener on an ephemeral port
pub fn loopback_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Spawn a peer that accepts one connection and runs `script` on it
pub fn spawn_peer<F>(script: F) -> (SocketAddr, JoinHandle<()>)
where
    F: FnOnce(Channel) + Send + 'static,
{
    let (listener, addr) = loopback_listener();
    let handle = thread::spawn(move || {
        let channel = Channel::accept_one(listener, &fast_stream_config()).unwrap();
        script(channel);
    });
    (addr, handle)
}

/// Spawn a peer that sends the handshake and `records`, then closes
pub fn spawn_producer(names: &[&str], records: Vec<Vec<f64>>) -> (SocketAddr, JoinHandle<()>) {
    let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    spawn_peer(move |mut channel| {
        channel.send_handshake(names.as_slice()).unwrap();
        for values in records {
            channel.send_record(&Record::new(values)).unwrap();
        }
        channel.close();
    })
}

/// Spawn a peer that writes raw frames, bypassing record validation
pub fn spawn_raw_producer(payloads: Vec<String>) -> (SocketAddr, JoinHandle<()>) {
    let (listener, addr) = loopback_listener();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        for payload in payloads {
            stream.write_all(&encode_frame(payload.as_bytes())).unwrap();
        }
        stream.flush().unwrap();
    });
    (addr, handle)
}

/// Pick a port that is free right now
pub fn free_port() -> u16 {
    loopback_listener().1.port()
}

/// Dial `127.0.0.1:port` as a producer once the consumer is listening
pub fn spawn_dialing_producer(port: u16, names: &[&str], records: Vec<Vec<f64>>) -> JoinHandle<()> {
    let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    thread::spawn(move || {
        let mut channel = dial_with_retry(port);
        channel.send_handshake(names.as_slice()).unwrap();
        for values in records {
            channel.send_record(&Record::new(values)).unwrap();
        }
        channel.close();
    })
}

fn dial_with_retry(port: u16) -> Channel {
    let deadline = Instant::now() + super::test_timeout();
    loop {
        match Channel::dial(("127.0.0.1", port), &fast_stream_config()) {
            Ok(channel) => return channel,
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("could not reach listener on port {}: {}", port, e),
        }
    }
}
