//! Local TCP port allocation.
//!
//! A port counts as free when a listener can bind `127.0.0.1:port`. The
//! listener is dropped straight away, so the port can be taken by someone
//! else before the caller uses it; provisioning follows immediately.

use std::net::{Ipv4Addr, TcpListener};
use tracing::debug;

use crate::error::{MirrorError, Result};

/// Ports scanned per allocation attempt.
pub const PORT_WINDOW: u16 = 100;

/// Whether `127.0.0.1:port` can be bound right now.
pub fn is_port_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}

/// First free port in `[start, start + PORT_WINDOW)`.
pub fn find_free_port(start: u16) -> Result<u16> {
    find_free_port_in(start, PORT_WINDOW)
}

/// First free port in `[start, start + window)`, clamped at 65535.
pub fn find_free_port_in(start: u16, window: u16) -> Result<u16> {
    let end = start.saturating_add(window.saturating_sub(1));
    for port in start..=end {
        if is_port_free(port) {
            debug!("Allocated local port {}", port);
            return Ok(port);
        }
    }
    Err(MirrorError::PortExhausted { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port_in_window() {
        let port = find_free_port(54320).unwrap();
        assert!((54320..54420).contains(&port));
    }

    #[test]
    fn test_held_port_is_skipped() {
        let first = find_free_port(54320).unwrap();
        let _held = TcpListener::bind((Ipv4Addr::LOCALHOST, first)).unwrap();

        let second = find_free_port(54320).unwrap();
        assert_ne!(first, second);
        assert!(!is_port_free(first));
    }

    #[test]
    fn test_exhausted_window() {
        let held = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = held.local_addr().unwrap().port();

        match find_free_port_in(port, 1) {
            Err(MirrorError::PortExhausted { start, end }) => {
                assert_eq!(start, port);
                assert_eq!(end, port);
            }
            other => panic!("expected PortExhausted, got {:?}", other),
        }
    }
}
