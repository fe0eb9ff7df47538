//! Transport-layer tags carried by packets.

/// Packet transport metadata.
///
/// `Packet` is a network-layer carrier; transport tags enable protocol simulation
/// without coupling the network to protocol implementations.
#[derive(Debug, Clone, Default)]
pub enum Transport {
    /// No transport metadata (default).
    #[default]
    None,
    /// TCP segment (simplified).
    Tcp(TcpSegment),
}

/// TCP segment (minimal fields for simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpSegment {
    /// Data segment: `seq` is byte sequence number, `len` is payload bytes.
    Data { seq: u64, len: u32 },
    /// ACK segment: `ack` is next expected byte (cumulative).
    Ack { ack: u64 },
}

impl Transport {
    pub fn is_tcp_data(&self) -> bool {
        matches!(self, Transport::Tcp(TcpSegment::Data { .. }))
    }
}

impl TcpSegment {
    pub fn is_ack(&self) -> bool {
        matches!(self, TcpSegment::Ack { .. })
    }
}
