//! Connection registry for bulk lifecycle operations

use crate::error::{Result, TransportError};
use crate::transports::connection::{ConnectionHandle, ConnectionId};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

/// Currently open connections
///
/// Connections are added on accept and removed when their task ends.
/// Handles that closed in between are pruned on every query, so callers
/// never see a closed connection.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Register a newly opened connection
    pub fn register(&self, handle: ConnectionHandle) -> Result<()> {
        let mut connections = self.connections.write();
        connections.retain(|_, existing| existing.is_open());

        if connections.len() >= self.max_connections {
            return Err(TransportError::resource_exhausted(
                "connections",
                format!("maximum of {} connections reached", self.max_connections),
            ));
        }

        let id = handle.id();
        connections.insert(id, handle);
        info!(
            connection = %id,
            total_connections = connections.len(),
            "Registered connection"
        );
        Ok(())
    }

    pub fn remove(&self, id: ConnectionId) {
        let mut connections = self.connections.write();
        if connections.remove(&id).is_some() {
            debug!(
                connection = %id,
                total_connections = connections.len(),
                "Removed connection"
            );
        }
    }

    /// Handles of every open connection
    pub fn open_connections(&self) -> Vec<ConnectionHandle> {
        self.prune();
        self.connections
            .read()
            .values()
            .filter(|handle| handle.is_open())
            .cloned()
            .collect()
    }

    pub fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections
            .read()
            .get(&id)
            .filter(|handle| handle.is_open())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.prune();
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send an unsolicited frame to every open connection
    ///
    /// Returns the number of connections the frame was queued on.
    pub fn broadcast(&self, frame: Bytes) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, handle) in self.connections.read().iter() {
            match handle.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => failed.push(*id),
            }
        }

        if !failed.is_empty() {
            let mut connections = self.connections.write();
            for id in failed {
                connections.remove(&id);
                debug!(connection = %id, "Removed disconnected connection");
            }
        }
        delivered
    }

    /// Close every connection; returns how many were open
    pub fn close_all(&self) -> usize {
        let connections: Vec<_> = self.connections.write().drain().map(|(_, h)| h).collect();
        let mut closed = 0;
        for handle in connections {
            if handle.is_open() {
                closed += 1;
            }
            handle.close();
        }
        if closed > 0 {
            info!(connections = closed, "Closed all connections");
        }
        closed
    }

    fn prune(&self) {
        let mut connections = self.connections.write();
        connections.retain(|_, handle| handle.is_open());
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connections.read().len())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transports::connection::WriterCommand;

    #[test]
    fn test_registry_add_and_remove() {
        let registry = ConnectionRegistry::new(10);
        let (handle, _commands) = ConnectionHandle::channel("a".into());
        let id = handle.id();

        registry.register(handle).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(id).is_some());

        registry.remove(id);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_closed_connections_are_never_returned() {
        let registry = ConnectionRegistry::new(10);
        let (open, _open_commands) = ConnectionHandle::channel("open".into());
        let (closing, _closing_commands) = ConnectionHandle::channel("closing".into());
        registry.register(open.clone()).unwrap();
        registry.register(closing.clone()).unwrap();

        closing.close();

        let listed = registry.open_connections();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), open.id());
        assert!(registry.get(closing.id()).is_none());
    }

    #[test]
    fn test_limit_counts_only_open_connections() {
        let registry = ConnectionRegistry::new(1);
        let (first, _first_commands) = ConnectionHandle::channel("first".into());
        let (second, _second_commands) = ConnectionHandle::channel("second".into());

        registry.register(first.clone()).unwrap();
        assert!(matches!(
            registry.register(second.clone()),
            Err(TransportError::ResourceExhausted { .. })
        ));

        first.close();
        registry.register(second).unwrap();
    }

    #[test]
    fn test_broadcast_prunes_failed_connections() {
        let registry = ConnectionRegistry::new(10);
        let (live, mut live_commands) = ConnectionHandle::channel("live".into());
        let (dead, dead_commands) = ConnectionHandle::channel("dead".into());
        registry.register(live).unwrap();
        registry.register(dead).unwrap();
        drop(dead_commands);

        assert_eq!(registry.broadcast(Bytes::from_static(b"notice")), 1);
        assert!(matches!(live_commands.try_recv(), Ok(WriterCommand::Raw(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_close_all_closes_every_handle() {
        let registry = ConnectionRegistry::new(10);
        let handles: Vec<_> = (0..3)
            .map(|i| ConnectionHandle::channel(format!("peer-{i}")))
            .collect();
        for (handle, _) in &handles {
            registry.register(handle.clone()).unwrap();
        }

        assert_eq!(registry.close_all(), 3);
        assert!(handles.iter().all(|(handle, _)| !handle.is_open()));
        assert!(registry.is_empty());
    }
}
