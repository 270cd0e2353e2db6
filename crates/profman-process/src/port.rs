//! TCP port probing and port-owner lookup.

use profman_common::{ProcessError, ProcessResult};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, trace};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Loopback address of a local control port.
pub fn local_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// True if something accepts TCP connections on `addr`.
pub async fn is_addr_reachable(addr: SocketAddr) -> bool {
    matches!(
        tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// True if a local listener accepts connections on `port`.
pub async fn is_port_open(port: u16) -> bool {
    is_addr_reachable(local_addr(port)).await
}

/// Polls `addr` every `poll_interval` until it accepts a connection.
///
/// Bounded by `timeout`; returns `ServiceUnreachable` when it elapses.
pub async fn wait_for_port(
    addr: SocketAddr,
    timeout: Duration,
    poll_interval: Duration,
) -> ProcessResult<()> {
    let started = tokio::time::Instant::now();
    let deadline = crate::terminate::deadline_after(timeout);

    loop {
        if is_addr_reachable(addr).await {
            debug!("{} reachable after {:?}", addr, started.elapsed());
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ProcessError::ServiceUnreachable {
                address: addr.to_string(),
                waited_ms: started.elapsed().as_millis() as u64,
            });
        }
        trace!("{} not reachable yet", addr);
        tokio::time::sleep(poll_interval).await;
    }
}

/// Polls until nothing listens on `port` any more.
///
/// Returns `true` if the port was released within `timeout`.
pub async fn wait_for_port_release(port: u16, timeout: Duration, poll_interval: Duration) -> bool {
    let deadline = crate::terminate::deadline_after(timeout);
    loop {
        if !is_port_open(port).await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// PID of the process listening on a local TCP `port`, if it can be found.
///
/// Implemented on Linux through `/proc/net/tcp{,6}`; other platforms
/// report `Unsupported`.
pub fn port_owner(port: u16) -> ProcessResult<Option<u32>> {
    #[cfg(target_os = "linux")]
    {
        linux::port_owner(port)
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = port;
        Err(ProcessError::unsupported("port owner lookup"))
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use profman_common::{ProcessError, ProcessResult};
    use std::collections::HashSet;
    use std::fs;

    const TCP_LISTEN: &str = "0A";

    pub(super) fn port_owner(port: u16) -> ProcessResult<Option<u32>> {
        let mut inodes = HashSet::new();
        for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
            match fs::read_to_string(table) {
                Ok(content) => inodes.extend(listening_inodes(&content, port)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ProcessError::port_unavailable(
                        port,
                        format!("cannot read {}: {}", table, e),
                    ))
                }
            }
        }

        if inodes.is_empty() {
            return Ok(None);
        }
        Ok(find_pid_for_inodes(&inodes))
    }

    /// Socket inodes in LISTEN state bound to `port`.
    pub(super) fn listening_inodes(table: &str, port: u16) -> Vec<u64> {
        table
            .lines()
            .skip(1)
            .filter_map(|line| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 10 || fields[3] != TCP_LISTEN {
                    return None;
                }
                let local_port = fields[1].rsplit(':').next()?;
                if u16::from_str_radix(local_port, 16).ok()? != port {
                    return None;
                }
                fields[9].parse::<u64>().ok().filter(|inode| *inode != 0)
            })
            .collect()
    }

    fn find_pid_for_inodes(inodes: &HashSet<u64>) -> Option<u32> {
        let proc_dir = fs::read_dir("/proc").ok()?;
        for entry in proc_dir.flatten() {
            let pid = match entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) {
                Some(pid) => pid,
                None => continue,
            };
            let fds = match fs::read_dir(entry.path().join("fd")) {
                Ok(fds) => fds,
                Err(_) => continue,
            };
            for fd in fds.flatten() {
                let target = match fs::read_link(fd.path()) {
                    Ok(target) => target,
                    Err(_) => continue,
                };
                let inode = target
                    .to_str()
                    .and_then(|s| s.strip_prefix("socket:["))
                    .and_then(|s| s.strip_suffix(']'))
                    .and_then(|s| s.parse::<u64>().ok());
                if let Some(inode) = inode {
                    if inodes.contains(&inode) {
                        return Some(pid);
                    }
                }
            }
        }
        None
    }
}
