//! What a change of options requires from the registry.

use crate::options::ServiceSnapshot;

/// Registry work needed to move from one snapshot to another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// The instance identity changed: the old record must go first.
    pub reregister: bool,
    /// The registry address changed: a new client is needed.
    pub reconnect: bool,
    /// The snapshot changed: the record must be (re)written.
    pub update: bool,
}

impl ReconcilePlan {
    pub fn between(current: &ServiceSnapshot, next: &ServiceSnapshot) -> Self {
        Self {
            reregister: current.instance_id() != next.instance_id(),
            reconnect: current.naming.address != next.naming.address,
            update: current != next,
        }
    }

    pub fn is_noop(&self) -> bool {
        !self.reregister && !self.reconnect && !self.update
    }
}
