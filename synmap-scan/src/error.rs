use thiserror::Error;

use synmap_packet::PacketError;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("source and destination address families differ")]
    MixedAddressFamilies,
}
