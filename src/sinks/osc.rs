//! OSC output sink: one float argument per message over UDP.

use std::net::UdpSocket;

use anyhow::{Context, Result};
use rosc::{encoder, OscMessage, OscPacket, OscType};
use tracing::debug;

pub struct OscSink {
    socket: UdpSocket,
    remote: String,
}

impl OscSink {
    /// Bind a local UDP socket; datagrams go to `remote` (host:port).
    pub fn bind(local: &str, remote: &str) -> Result<Self> {
        let socket = UdpSocket::bind(local)
            .with_context(|| format!("Failed to bind OSC socket on {local}"))?;
        Ok(Self {
            socket,
            remote: remote.to_string(),
        })
    }

    pub fn send(&self, address: &str, value: f32) -> Result<()> {
        let packet = OscPacket::Message(OscMessage {
            addr: address.to_string(),
            args: vec![OscType::Float(value)],
        });
        let bytes = encoder::encode(&packet).context("Failed to encode OSC packet")?;
        self.socket
            .send_to(&bytes, self.remote.as_str())
            .with_context(|| format!("Failed to send OSC packet to {}", self.remote))?;
        debug!("OSC sent: {address} {value}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sends_a_decodable_float_message() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let remote = receiver.local_addr().unwrap().to_string();
        let sink = OscSink::bind("127.0.0.1:0", &remote).unwrap();

        sink.send("/a0", 64.0).unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/a0");
                assert_eq!(msg.args, vec![OscType::Float(64.0)]);
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }
}
