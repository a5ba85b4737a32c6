//! RTMP client handshake
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes: time+random) ->|
//!   |                                        |
//!   |<------ S0 (1 byte: version) ----------|
//!   |<------ S1 (1536 bytes: time+random) --|
//!   |<------ S2 (1536 bytes: echo C1) ------|
//!   |                                        |
//!   |------- C2 (1536 bytes: echo S1) ----->|
//!   |                                        |
//!   |          [Handshake Complete]          |
//! ```
//!
//! This implementation uses the "simple" handshake (no HMAC digest).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    /// Need to send C0C1
    Initial,
    /// C0C1 sent, waiting for S0S1S2
    WaitingForServer,
    Done,
}

/// Client side of the handshake
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
    /// Our C1, kept for the S2 echo check
    c1: Option<[u8; HANDSHAKE_SIZE]>,
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Initial,
            c1: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::Done
    }

    /// Bytes the server must send before [`process`](Self::process) can finish
    pub fn bytes_needed(&self) -> usize {
        match self.state {
            HandshakeState::WaitingForServer => 1 + HANDSHAKE_SIZE * 2,
            _ => 0,
        }
    }

    /// Generate C0+C1 (1 + 1536 bytes)
    pub fn generate_c0c1(&mut self) -> Result<Bytes> {
        if self.state != HandshakeState::Initial {
            return Err(HandshakeError::InvalidState.into());
        }

        let mut buf = BytesMut::with_capacity(1 + HANDSHAKE_SIZE);
        buf.put_u8(RTMP_VERSION);

        let c1 = generate_packet();
        self.c1 = Some(c1);
        buf.put_slice(&c1);

        self.state = HandshakeState::WaitingForServer;
        Ok(buf.freeze())
    }

    /// Consume S0+S1+S2 from `data` and return C2
    ///
    /// Returns `Ok(None)` and leaves `data` untouched until all 3073 bytes are
    /// buffered. Bytes after S2 stay in `data`: a server may start sending
    /// chunks right behind the handshake.
    pub fn process(&mut self, data: &mut BytesMut) -> Result<Option<Bytes>> {
        if self.state != HandshakeState::WaitingForServer {
            return Err(HandshakeError::InvalidState.into());
        }
        if data.remaining() < 1 + HANDSHAKE_SIZE * 2 {
            return Ok(None);
        }

        // Versions above 3 are accepted, some servers send other values
        let version = data.get_u8();
        if version < RTMP_VERSION {
            return Err(HandshakeError::InvalidVersion(version).into());
        }

        let mut s1 = [0u8; HANDSHAKE_SIZE];
        data.copy_to_slice(&mut s1);

        let s2 = data.split_to(HANDSHAKE_SIZE);
        if let Some(c1) = &self.c1 {
            if s2[8..] != c1[8..] {
                // Servers routinely get this wrong, keep going
                tracing::debug!("S2 does not echo C1");
            }
        }

        self.state = HandshakeState::Done;
        Ok(Some(Bytes::copy_from_slice(&generate_echo(&s1))))
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// Generate C1
///
/// Format (1536 bytes):
/// - Bytes 0-3: Timestamp (32-bit, big-endian)
/// - Bytes 4-7: Zero (simple handshake)
/// - Bytes 8-1535: Random data
fn generate_packet() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];

    let timestamp = now_millis();
    packet[0..4].copy_from_slice(&timestamp.to_be_bytes());

    // Not cryptographically secure, the handshake doesn't require it
    let mut seed = timestamp as u64 | 1;
    for chunk in packet[8..].chunks_mut(8) {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let bytes = seed.to_le_bytes();
        let len = chunk.len();
        chunk.copy_from_slice(&bytes[..len]);
    }

    packet
}

/// Generate C2: S1 with our read time in bytes 4-7
fn generate_echo(peer_packet: &[u8; HANDSHAKE_SIZE]) -> [u8; HANDSHAKE_SIZE] {
    let mut echo = *peer_packet;
    echo[4..8].copy_from_slice(&now_millis().to_be_bytes());
    echo
}
