use crate::prelude::DrxResult;
use log::{info, warn};
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Written,
    /// Nobody connected; the packet was discarded.
    NoClient,
    /// The write failed or was short; the client has been dropped.
    Disconnected,
}

/// Destination for assembled packets.
pub trait PacketSink: Send {
    fn send(&mut self, packet: &[u8]) -> SendOutcome;
}

/// Single-client TCP server. Never blocks: accepts are polled on each send
/// and a client that cannot take a whole packet is dropped.
pub struct StreamServer {
    listener: TcpListener,
    client: Option<(TcpStream, SocketAddr)>,
}

impl StreamServer {
    pub fn bind(port: u16) -> DrxResult<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        info!("Stream server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            client: None,
        })
    }

    pub fn local_addr(&self) -> DrxResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    fn try_accept(&mut self) {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                if let Err(err) = stream
                    .set_nonblocking(true)
                    .and_then(|_| stream.set_nodelay(true))
                {
                    warn!("Rejecting client {}: {}", addr, err);
                    return;
                }
                info!("Stream client connected from {}", addr);
                self.client = Some((stream, addr));
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => warn!("Accept failed: {}", err),
        }
    }

    fn drop_client(&mut self, reason: &str) {
        if let Some((_, addr)) = self.client.take() {
            info!("Stream client {} dropped: {}", addr, reason);
        }
    }
}

impl PacketSink for StreamServer {
    fn send(&mut self, packet: &[u8]) -> SendOutcome {
        if self.client.is_none() {
            self.try_accept();
        }
        let Some((stream, _)) = self.client.as_mut() else {
            return SendOutcome::NoClient;
        };
        match stream.write(packet) {
            Ok(written) if written == packet.len() => SendOutcome::Written,
            Ok(written) => {
                self.drop_client(&format!("short write {} of {} bytes", written, packet.len()));
                SendOutcome::Disconnected
            }
            Err(err) => {
                self.drop_client(&err.to_string());
                SendOutcome::Disconnected
            }
        }
    }
}

/// Collects packets in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    packets: Vec<Vec<u8>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets(&self) -> &[Vec<u8>] {
        &self.packets
    }
}

impl PacketSink for VecSink {
    fn send(&mut self, packet: &[u8]) -> SendOutcome {
        self.packets.push(packet.to_vec());
        SendOutcome::Written
    }
}
