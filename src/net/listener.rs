//! Public port admission.
//!
//! # Responsibilities
//! - Bind the single public port that relay sessions and front-end requests share
//! - Hand out one admission slot per accepted connection
//! - Stop taking new connections while every slot is held by a live session
//!
//! # Design Decisions
//! - A slot is reserved before `accept`, so excess clients queue in the kernel
//!   backlog rather than in the relay
//! - A relay session can hold its slot for hours; the cap is on sessions,
//!   not on request rate

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

/// Failure to open or accept on the public port.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The public address is invalid or already taken.
    #[error("cannot bind public port: {0}")]
    Bind(#[source] std::io::Error),
    /// The kernel refused an incoming connection.
    #[error("accept on public port failed: {0}")]
    Accept(#[source] std::io::Error),
}

/// The relay's public port with a cap on simultaneous connections.
pub struct Listener {
    socket: TcpListener,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl Listener {
    /// Bind `config.bind_address` and size the slot pool from
    /// `config.max_connections`.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let socket = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let bound = socket.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %bound,
            capacity = config.max_connections,
            "Public port open"
        );

        Ok(Self {
            socket,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            capacity: config.max_connections,
        })
    }

    /// Wait for a free slot, then accept the next client.
    ///
    /// The returned [`ConnectionPermit`] occupies the slot until dropped.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ListenerError::Accept(std::io::Error::other(e)))?;

        let (stream, peer) = self.socket.accept().await.map_err(ListenerError::Accept)?;

        tracing::trace!(
            peer_addr = %peer,
            free_slots = self.slots.available_permits(),
            "Client admitted"
        );

        Ok((stream, peer, ConnectionPermit { _slot: slot }))
    }

    /// Address actually bound; differs from the configured one for port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    /// Slots not currently held by a connection.
    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Total slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One occupied slot on the public port.
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slots_cap_live_connections() {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            max_connections: 2,
            ..Default::default()
        };
        let listener = Listener::bind(&config).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_eq!(listener.capacity(), 2);

        let _c1 = TcpStream::connect(addr).await.unwrap();
        let _c2 = TcpStream::connect(addr).await.unwrap();
        let _c3 = TcpStream::connect(addr).await.unwrap();
        let (_s1, _, p1) = listener.accept().await.unwrap();
        let (_s2, _, _p2) = listener.accept().await.unwrap();
        assert_eq!(listener.free_slots(), 0);

        // The third client waits in the backlog until a slot frees up.
        let blocked = tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;
        assert!(blocked.is_err());

        drop(p1);
        assert_eq!(listener.free_slots(), 1);
        let third = tokio::time::timeout(std::time::Duration::from_secs(2), listener.accept()).await;
        assert!(matches!(third, Ok(Ok(_))));
    }

    #[tokio::test]
    async fn bad_address_is_bind_error() {
        let config = ListenerConfig {
            bind_address: "not an address".into(),
            ..Default::default()
        };
        assert!(matches!(Listener::bind(&config).await, Err(ListenerError::Bind(_))));
    }
}
