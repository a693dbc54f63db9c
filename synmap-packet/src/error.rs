use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeLevel {
    /// Raw socket access available (root on Unix).
    Full,
    /// No raw socket access; SYN scanning will fail at socket open.
    Unprivileged,
}

impl PrivilegeLevel {
    pub fn has_raw_socket_access(&self) -> bool {
        matches!(self, PrivilegeLevel::Full)
    }
}

impl std::fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivilegeLevel::Full => write!(f, "privileged (raw socket access)"),
            PrivilegeLevel::Unprivileged => write!(f, "unprivileged"),
        }
    }
}

/// Best-effort preflight for hosts that want to fail early with a clear
/// message. Only the effective uid is inspected; a process granted
/// CAP_NET_RAW without root still succeeds at the actual socket open, which
/// remains the authoritative check.
pub fn check_privileges() -> PrivilegeLevel {
    #[cfg(unix)]
    {
        if unsafe { libc::geteuid() } == 0 {
            return PrivilegeLevel::Full;
        }
        PrivilegeLevel::Unprivileged
    }
    #[cfg(not(unix))]
    {
        PrivilegeLevel::Unprivileged
    }
}

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("insufficient privileges for raw packet operations")]
    InsufficientPrivileges,
    #[error("raw socket setup failed: {0}")]
    SocketSetup(String),
    #[error("packet send failed: {0}")]
    SendFailed(String),
    #[error("capture setup failed: {0}")]
    CaptureSetup(String),
    #[error("no suitable network interface found")]
    NoInterface,
}
