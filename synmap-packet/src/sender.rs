use std::io;
use std::net::{IpAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::AsRawFd;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::debug;

use crate::error::PacketError;
use crate::traits::RawLink;

/// Raw socket bound to one scan destination. Requires root or CAP_NET_RAW.
///
/// IPv4 sockets carry IP_HDRINCL: the caller supplies the full IP header.
/// IPv6 sockets are protocol-TCP raw sockets with IPV6_CHECKSUM set, so the
/// kernel builds the IPv6 header and fills the TCP checksum.
pub struct RawSocket {
    socket: Socket,
    dst: SockAddr,
}

impl RawSocket {
    pub fn open(dst: IpAddr) -> Result<Self, PacketError> {
        let (socket, dst_addr) = match dst {
            IpAddr::V4(v4) => {
                let socket = Socket::new(
                    Domain::IPV4,
                    Type::RAW,
                    Some(Protocol::from(libc::IPPROTO_RAW)),
                )
                .map_err(open_error)?;
                socket
                    .set_header_included(true)
                    .map_err(|e| PacketError::SocketSetup(format!("IP_HDRINCL: {e}")))?;
                (socket, SockAddr::from(SocketAddrV4::new(v4, 0)))
            }
            IpAddr::V6(v6) => {
                let socket =
                    Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::TCP)).map_err(open_error)?;
                set_ipv6_checksum_offset(&socket)?;
                (socket, SockAddr::from(SocketAddrV6::new(v6, 0, 0, 0)))
            }
        };

        debug!(dst = %dst, "raw socket opened");
        Ok(Self {
            socket,
            dst: dst_addr,
        })
    }
}

impl RawLink for RawSocket {
    fn send(&mut self, packet: &[u8]) -> Result<(), PacketError> {
        self.socket
            .send_to(packet, &self.dst)
            .map_err(|e| PacketError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

fn open_error(e: io::Error) -> PacketError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        PacketError::InsufficientPrivileges
    } else {
        PacketError::SocketSetup(e.to_string())
    }
}

/// Point the kernel at the TCP checksum field of our outgoing segments.
/// socket2 has no wrapper for IPV6_CHECKSUM.
fn set_ipv6_checksum_offset(socket: &Socket) -> Result<(), PacketError> {
    let offset: libc::c_int = 8;
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IPV6,
            libc::IPV6_CHECKSUM,
            (&offset as *const libc::c_int).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(PacketError::SocketSetup(format!(
            "IPV6_CHECKSUM: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}
