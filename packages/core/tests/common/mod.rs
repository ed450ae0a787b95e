//! Shared fixture for the integration tests: a small in-memory tree that
//! plays the roles of change source, selector matcher, and tree walker, plus
//! a manually driven timer host.
//!
//! Patterns understood by the matcher: `tag`, `#id`, and `tag#id`. Detached
//! node data is kept alive, so matching a removed node sees the state it had
//! at removal time.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use slab::Slab;

use domwait_core::{
    BatchListener, ChangeRecord, ChangeSource, ObserveConfig, Selector, SelectorMatcher,
    Subscription, TimerHandle, TimerHost, TreeWalk, WaitCallback, WaitError, WatchScope,
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(usize);

struct NodeData {
    tag: String,
    id_attr: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct ListenerEntry {
    root: NodeId,
    listener: BatchListener<NodeId>,
}

struct DomInner {
    nodes: Slab<NodeData>,
    root: NodeId,
    listeners: Slab<ListenerEntry>,
}

impl DomInner {
    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.nodes[n.0].parent;
        }
        false
    }

    fn descendants_of(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[root.0].children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.nodes[node.0].children.iter().rev().copied());
        }
        out
    }

    fn node_matches(&self, node: NodeId, pattern: &str) -> bool {
        let (tag, id) = parse_pattern(pattern);
        let data = &self.nodes[node.0];
        tag.is_none_or(|t| data.tag == t) && id.is_none_or(|i| data.id_attr.as_deref() == Some(i))
    }
}

fn parse_pattern(pattern: &str) -> (Option<&str>, Option<&str>) {
    match pattern.split_once('#') {
        Some((tag, id)) => ((!tag.is_empty()).then_some(tag), Some(id)),
        None => (Some(pattern), None),
    }
}

#[derive(Clone)]
pub struct MockDom {
    inner: Rc<RefCell<DomInner>>,
}

impl MockDom {
    pub fn new() -> Self {
        let mut nodes = Slab::new();
        let root = NodeId(nodes.insert(NodeData {
            tag: "root".to_string(),
            id_attr: None,
            parent: None,
            children: Vec::new(),
        }));
        Self {
            inner: Rc::new(RefCell::new(DomInner {
                nodes,
                root,
                listeners: Slab::new(),
            })),
        }
    }

    pub fn root(&self) -> NodeId {
        self.inner.borrow().root
    }

    pub fn matcher(&self) -> MockMatcher {
        MockMatcher {
            dom: self.inner.clone(),
        }
    }

    pub fn create(&self, tag: &str) -> NodeId {
        self.create_node(tag, None)
    }

    pub fn create_with_id(&self, tag: &str, id: &str) -> NodeId {
        self.create_node(tag, Some(id.to_string()))
    }

    fn create_node(&self, tag: &str, id_attr: Option<String>) -> NodeId {
        NodeId(self.inner.borrow_mut().nodes.insert(NodeData {
            tag: tag.to_string(),
            id_attr,
            parent: None,
            children: Vec::new(),
        }))
    }

    pub fn tag_of(&self, node: NodeId) -> String {
        self.inner.borrow().nodes[node.0].tag.clone()
    }

    /// Attach `node` (with whatever subtree hangs off it) under `parent` and
    /// notify observers of the mutation point. Mutations in subtrees no
    /// observer watches deliver nothing, like appending to a detached node.
    pub fn append(&self, parent: NodeId, node: NodeId) {
        self.attach(parent, node);
        self.deliver(parent, &[ChangeRecord::added(vec![node])]);
    }

    /// Attach several siblings in one mutation: observers get a single
    /// record listing all of them.
    pub fn append_all(&self, parent: NodeId, nodes: &[NodeId]) {
        for &node in nodes {
            self.attach(parent, node);
        }
        self.deliver(parent, &[ChangeRecord::added(nodes.to_vec())]);
    }

    fn attach(&self, parent: NodeId, node: NodeId) {
        let mut inner = self.inner.borrow_mut();
        inner.nodes[node.0].parent = Some(parent);
        inner.nodes[parent.0].children.push(node);
    }

    /// Detach `node` from its parent and notify observers. The node's data
    /// stays alive, so selector matching against it still works.
    pub fn remove(&self, node: NodeId) {
        let parent = {
            let mut inner = self.inner.borrow_mut();
            let parent = inner.nodes[node.0].parent.take();
            if let Some(parent) = parent {
                inner.nodes[parent.0].children.retain(|child| *child != node);
            }
            parent
        };
        if let Some(parent) = parent {
            self.deliver(parent, &[ChangeRecord::removed(vec![node])]);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    fn deliver(&self, at: NodeId, records: &[ChangeRecord<NodeId>]) {
        // snapshot the targets: a listener may disconnect (or register a new
        // wait) from inside its callback
        let targets: Vec<BatchListener<NodeId>> = {
            let inner = self.inner.borrow();
            inner
                .listeners
                .iter()
                .filter(|(_, entry)| inner.is_inclusive_ancestor(entry.root, at))
                .map(|(_, entry)| entry.listener.clone())
                .collect()
        };
        for listener in targets {
            listener(records);
        }
    }
}

impl ChangeSource<NodeId> for MockDom {
    fn observe(
        &self,
        root: &NodeId,
        _config: ObserveConfig,
        listener: BatchListener<NodeId>,
    ) -> Box<dyn Subscription> {
        let key = self.inner.borrow_mut().listeners.insert(ListenerEntry {
            root: *root,
            listener,
        });
        Box::new(MockSubscription {
            dom: self.inner.clone(),
            key,
        })
    }
}

struct MockSubscription {
    dom: Rc<RefCell<DomInner>>,
    key: usize,
}

impl Subscription for MockSubscription {
    fn disconnect(self: Box<Self>) {
        let _ = self.dom.borrow_mut().listeners.try_remove(self.key);
    }
}

impl TreeWalk<NodeId> for MockDom {
    fn descendants(&self, root: &NodeId) -> Vec<NodeId> {
        self.inner.borrow().descendants_of(*root)
    }
}

pub struct MockMatcher {
    dom: Rc<RefCell<DomInner>>,
}

impl SelectorMatcher<NodeId> for MockMatcher {
    fn matches_self(&self, node: &NodeId, pattern: &str) -> bool {
        self.dom.borrow().node_matches(*node, pattern)
    }

    fn find_descendants(&self, root: &NodeId, pattern: &str) -> Vec<NodeId> {
        let inner = self.dom.borrow();
        inner
            .descendants_of(*root)
            .into_iter()
            .filter(|node| inner.node_matches(*node, pattern))
            .collect()
    }

    fn check_pattern(&self, pattern: &str) -> Result<(), WaitError> {
        let well_formed = !pattern.is_empty()
            && !pattern.contains(char::is_whitespace)
            && pattern.matches('#').count() <= 1;
        if well_formed {
            Ok(())
        } else {
            Err(WaitError::InvalidPattern {
                pattern: pattern.to_string(),
                message: "expected tag, #id, or tag#id".to_string(),
            })
        }
    }
}

struct TimerEntry {
    deadline: Duration,
    callback: Box<dyn FnOnce()>,
}

struct TimerInner {
    now: Duration,
    entries: Slab<TimerEntry>,
}

/// Timer host driven explicitly from the tests via [`advance`].
///
/// [`advance`]: ManualTimers::advance
#[derive(Clone)]
pub struct ManualTimers {
    inner: Rc<RefCell<TimerInner>>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(TimerInner {
                now: Duration::ZERO,
                entries: Slab::new(),
            })),
        }
    }

    /// Move the clock forward, firing due timers in deadline order. A fired
    /// callback may schedule further timers; those fire too if they land
    /// inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.inner.borrow().now + by;
        loop {
            let due = {
                let mut inner = self.inner.borrow_mut();
                let next = inner
                    .entries
                    .iter()
                    .filter(|(_, entry)| entry.deadline <= target)
                    .min_by_key(|(_, entry)| entry.deadline)
                    .map(|(key, _)| key);
                match next {
                    Some(key) => {
                        let entry = inner.entries.remove(key);
                        inner.now = inner.now.max(entry.deadline);
                        Some(entry.callback)
                    }
                    None => {
                        inner.now = target;
                        None
                    }
                }
            };
            match due {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    /// Number of timers still scheduled.
    pub fn pending(&self) -> usize {
        self.inner.borrow().entries.len()
    }
}

impl TimerHost for ManualTimers {
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Box<dyn TimerHandle> {
        let mut inner = self.inner.borrow_mut();
        let deadline = inner.now + delay;
        let key = inner.entries.insert(TimerEntry { deadline, callback });
        Box::new(ManualTimerHandle {
            timers: self.inner.clone(),
            key,
        })
    }
}

struct ManualTimerHandle {
    timers: Rc<RefCell<TimerInner>>,
    key: usize,
}

impl TimerHandle for ManualTimerHandle {
    fn clear(self: Box<Self>) {
        let _ = self.timers.borrow_mut().entries.try_remove(self.key);
    }
}

/// A scope observing the mock tree natively (the mock delivers mutation
/// batches itself).
pub fn setup() -> (MockDom, ManualTimers, WatchScope<NodeId>) {
    let dom = MockDom::new();
    let timers = ManualTimers::new();
    let scope = WatchScope::new(
        dom.root(),
        Rc::new(dom.matcher()),
        Rc::new(dom.clone()),
        Rc::new(timers.clone()),
    );
    (dom, timers, scope)
}

/// A scope whose change source is the polling fallback sweeping the mock
/// tree; the mock's own mutation delivery is not wired in.
pub fn setup_polling(interval: Duration) -> (MockDom, ManualTimers, WatchScope<NodeId>) {
    use domwait_core::PollingChangeSource;

    let dom = MockDom::new();
    let timers = ManualTimers::new();
    let source =
        PollingChangeSource::new(Rc::new(dom.clone()), Rc::new(timers.clone())).with_interval(interval);
    let scope = WatchScope::new(
        dom.root(),
        Rc::new(dom.matcher()),
        Rc::new(source),
        Rc::new(timers.clone()),
    );
    (dom, timers, scope)
}

pub type Captured = Rc<RefCell<Vec<(Vec<NodeId>, Vec<NodeId>)>>>;

/// A callback that records every invocation's `(added, removed)` pair.
pub fn capturing_callback() -> (Captured, WaitCallback<NodeId>) {
    let captured: Captured = Rc::new(RefCell::new(Vec::new()));
    let callback: WaitCallback<NodeId> = {
        let captured = captured.clone();
        Rc::new(move |added: &[NodeId], removed: &[NodeId]| {
            captured.borrow_mut().push((added.to_vec(), removed.to_vec()));
        })
    };
    (captured, callback)
}

/// Selector shorthand used all over the tests.
pub fn sel(pattern: &str) -> Selector<NodeId> {
    Selector::pattern(pattern)
}
