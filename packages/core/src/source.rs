use std::rc::Rc;
use std::time::Duration;

/// One structural change: nodes attached to and detached from some point in
/// the observed subtree.
///
/// Removed node handles must remain valid for selector matching after
/// detachment; matching against a removed node uses the state it had at
/// removal time.
#[derive(Clone, Debug)]
pub struct ChangeRecord<N> {
    /// Nodes attached by this change, in document order. Only subtree roots
    /// need to be reported; the engine searches inside them.
    pub added_nodes: Vec<N>,
    /// Nodes detached by this change, in document order.
    pub removed_nodes: Vec<N>,
}

impl<N> ChangeRecord<N> {
    /// A record carrying only added nodes.
    pub fn added(nodes: Vec<N>) -> Self {
        Self {
            added_nodes: nodes,
            removed_nodes: Vec::new(),
        }
    }

    /// A record carrying only removed nodes.
    pub fn removed(nodes: Vec<N>) -> Self {
        Self {
            added_nodes: Vec::new(),
            removed_nodes: nodes,
        }
    }
}

/// What a [`ChangeSource`] is asked to report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObserveConfig {
    /// Observe the whole subtree, not just direct children.
    pub subtree: bool,
    /// Report child-list (structural) changes.
    pub child_list: bool,
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            subtree: true,
            child_list: true,
        }
    }
}

impl ObserveConfig {
    /// Whole subtree, structural child changes. The configuration every wait
    /// subscribes with.
    pub fn structural() -> Self {
        Self::default()
    }
}

/// Receives batches of change records from a source.
pub type BatchListener<N> = Rc<dyn Fn(&[ChangeRecord<N>])>;

/// A subscription primitive reporting structural changes under a subtree.
///
/// Implementations deliver zero or more batches to the listener, on the host
/// event loop, until the returned subscription is disconnected. Delivering a
/// batch synchronously from inside `observe` is permitted; the engine copes.
pub trait ChangeSource<N> {
    /// Start observing `root` and deliver batches to `listener`.
    fn observe(
        &self,
        root: &N,
        config: ObserveConfig,
        listener: BatchListener<N>,
    ) -> Box<dyn Subscription>;
}

/// Detaches a live observation. Consuming the handle makes a second
/// disconnect unrepresentable.
pub trait Subscription {
    fn disconnect(self: Box<Self>);
}

/// One-shot timer scheduling, provided by the host event loop.
pub trait TimerHost {
    /// Run `callback` once after `delay`, unless the returned handle is
    /// cleared first.
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Box<dyn TimerHandle>;
}

/// Cancels a pending timeout. Clearing an already-fired timer is a no-op.
pub trait TimerHandle {
    fn clear(self: Box<Self>);
}
