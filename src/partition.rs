//! Deterministic partition routing.
//!
//! Primitive names are routed to partitions with a seeded xxHash64 reduced
//! modulo the partition count. The mapping is a pure function of
//! `(name, partition_count)`: no randomness and no external state, so every
//! client routes the same name to the same partition given the same
//! topology. Sessions are never migrated off the partition they bind to.

use crate::core::error::{SessionError, SessionResult};
use crate::transport::Transport;
use std::hash::Hasher;
use std::sync::Arc;
use twox_hash::XxHash64;

/// Seed fixed for routing stability across clients and releases.
const ROUTING_SEED: u64 = 0;

/// Stable ordinal of a partition within the configured topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionId(pub u32);

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A scoped primitive name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimitiveName {
    /// Application scope the primitive belongs to.
    pub scope: String,
    /// Logical primitive name within the scope.
    pub name: String,
}

impl PrimitiveName {
    /// Create a scoped primitive name.
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for PrimitiveName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

/// Route a primitive name to a partition index in `[0, partition_count)`.
///
/// Fails with `InvalidArgument` when the partition count is zero.
pub fn select_partition(name: &PrimitiveName, partition_count: usize) -> SessionResult<usize> {
    if partition_count == 0 {
        return Err(SessionError::invalid_argument(
            "partition count must be positive",
        ));
    }
    let mut hasher = XxHash64::with_seed(ROUTING_SEED);
    hasher.write(name.scope.as_bytes());
    hasher.write(name.name.as_bytes());
    Ok((hasher.finish() % partition_count as u64) as usize)
}

/// A partition: a stable ordinal plus a live transport handle.
///
/// The handle is independent of any session and shared by all sessions
/// bound to this partition.
#[derive(Clone)]
pub struct Partition {
    id: PartitionId,
    transport: Arc<dyn Transport>,
}

impl Partition {
    /// Create a partition over an externally established transport handle.
    pub fn new(id: PartitionId, transport: Arc<dyn Transport>) -> Self {
        Self { id, transport }
    }

    /// Get the partition ordinal.
    pub fn id(&self) -> PartitionId {
        self.id
    }

    /// Get the transport handle.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition").field("id", &self.id).finish()
    }
}

/// The ordered set of partitions configured for a client.
#[derive(Debug, Clone)]
pub struct PartitionGroup {
    partitions: Vec<Partition>,
}

impl PartitionGroup {
    /// Create a group over the given partitions.
    pub fn new(partitions: Vec<Partition>) -> Self {
        Self { partitions }
    }

    /// Number of partitions in the group.
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Check if the group is empty.
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Get a partition by index.
    pub fn get(&self, index: usize) -> Option<&Partition> {
        self.partitions.get(index)
    }

    /// Deterministically resolve the partition owning a primitive name.
    pub fn partition_for(&self, name: &PrimitiveName) -> SessionResult<&Partition> {
        let index = select_partition(name, self.partitions.len())?;
        Ok(&self.partitions[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{Frame, Reply};
    use crate::transport::{ReplyStream, TransportError};
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn unary(&self, _method: &str, _request: Frame) -> Result<Reply, TransportError> {
            Err(TransportError::Closed)
        }

        async fn server_stream(
            &self,
            _method: &str,
            _request: Frame,
        ) -> Result<ReplyStream, TransportError> {
            Err(TransportError::Closed)
        }
    }

    fn group(count: u32) -> PartitionGroup {
        let partitions = (0..count)
            .map(|i| Partition::new(PartitionId(i), Arc::new(NullTransport)))
            .collect();
        PartitionGroup::new(partitions)
    }

    #[test]
    fn selection_is_deterministic() {
        let name = PrimitiveName::new("app", "orders");
        let first = select_partition(&name, 7).unwrap();
        for _ in 0..100 {
            assert_eq!(select_partition(&name, 7).unwrap(), first);
        }
    }

    #[test]
    fn selection_stays_in_range() {
        for i in 0..1_000 {
            let name = PrimitiveName::new("app", format!("primitive-{}", i));
            let index = select_partition(&name, 7).unwrap();
            assert!(index < 7);
        }
    }

    #[test]
    fn selection_spreads_across_partitions() {
        // Statistical, not exact: arbitrary names must not all land on a
        // single partition.
        let mut hits = vec![0usize; 7];
        for i in 0..1_000 {
            let name = PrimitiveName::new("app", format!("primitive-{}", i));
            hits[select_partition(&name, 7).unwrap()] += 1;
        }
        assert!(hits.iter().all(|&count| count > 0), "hits: {:?}", hits);
    }

    #[test]
    fn scope_participates_in_routing() {
        let count = 64;
        let spread = (0..128).any(|i| {
            let a = PrimitiveName::new("scope-a", format!("p-{}", i));
            let b = PrimitiveName::new("scope-b", format!("p-{}", i));
            select_partition(&a, count).unwrap() != select_partition(&b, count).unwrap()
        });
        assert!(spread);
    }

    #[test]
    fn zero_partitions_is_invalid() {
        let name = PrimitiveName::new("app", "orders");
        let err = select_partition(&name, 0).unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument { .. }));
    }

    #[test]
    fn group_resolves_same_partition_repeatedly() {
        let group = group(5);
        let name = PrimitiveName::new("app", "orders");
        let first = group.partition_for(&name).unwrap().id();
        assert_eq!(group.partition_for(&name).unwrap().id(), first);
    }

    #[test]
    fn empty_group_rejects_routing() {
        let group = PartitionGroup::new(Vec::new());
        let name = PrimitiveName::new("app", "orders");
        assert!(group.partition_for(&name).is_err());
    }
}
