use std::cell::{Cell, RefCell};
use std::hash::Hash;
use std::rc::Rc;
use std::time::Duration;

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::source::{
    BatchListener, ChangeRecord, ChangeSource, ObserveConfig, Subscription, TimerHandle, TimerHost,
};

/// Tree-walk capability the polling source needs from the host.
pub trait TreeWalk<N> {
    /// Every current descendant of `root`, in document order.
    fn descendants(&self, root: &N) -> Vec<N>;
}

/// How often [`PollingChangeSource`] re-sweeps by default.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fallback change source for hosts without a native subtree observer.
///
/// Each sweep walks the observed subtree and reports nodes not seen before
/// as one added-only record; the first sweep runs synchronously inside
/// `observe` and reports everything already present. Removals are never
/// reported - a wait that needs them requires a native source.
pub struct PollingChangeSource<W> {
    walker: Rc<W>,
    timers: Rc<dyn TimerHost>,
    interval: Duration,
}

impl<W> PollingChangeSource<W> {
    pub fn new(walker: Rc<W>, timers: Rc<dyn TimerHost>) -> Self {
        Self {
            walker,
            timers,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

struct PollShared<N> {
    seen: RefCell<FxHashSet<N>>,
    timer: RefCell<Option<Box<dyn TimerHandle>>>,
    stopped: Cell<bool>,
}

struct PollingSubscription<N> {
    shared: Rc<PollShared<N>>,
}

impl<N> Subscription for PollingSubscription<N> {
    fn disconnect(self: Box<Self>) {
        self.shared.stopped.set(true);
        if let Some(timer) = self.shared.timer.borrow_mut().take() {
            timer.clear();
        }
    }
}

impl<N, W> ChangeSource<N> for PollingChangeSource<W>
where
    N: Clone + Eq + Hash + 'static,
    W: TreeWalk<N> + 'static,
{
    fn observe(
        &self,
        root: &N,
        _config: ObserveConfig,
        listener: BatchListener<N>,
    ) -> Box<dyn Subscription> {
        let shared = Rc::new(PollShared {
            seen: RefCell::new(FxHashSet::default()),
            timer: RefCell::new(None),
            stopped: Cell::new(false),
        });
        sweep(
            &shared,
            &self.walker,
            &self.timers,
            root,
            &listener,
            self.interval,
        );
        Box::new(PollingSubscription { shared })
    }
}

fn sweep<N, W>(
    shared: &Rc<PollShared<N>>,
    walker: &Rc<W>,
    timers: &Rc<dyn TimerHost>,
    root: &N,
    listener: &BatchListener<N>,
    interval: Duration,
) where
    N: Clone + Eq + Hash + 'static,
    W: TreeWalk<N> + 'static,
{
    if shared.stopped.get() {
        return;
    }
    let mut added = Vec::new();
    {
        let mut seen = shared.seen.borrow_mut();
        for node in walker.descendants(root) {
            if seen.insert(node.clone()) {
                added.push(node);
            }
        }
    }
    if !added.is_empty() {
        trace!(count = added.len(), "polling sweep found new nodes");
        listener(&[ChangeRecord::added(added)]);
    }
    // the listener may have disconnected us from inside the delivery
    if shared.stopped.get() {
        return;
    }
    let next = {
        let shared = shared.clone();
        let walker = walker.clone();
        let timers_for_tick = timers.clone();
        let root = root.clone();
        let listener = listener.clone();
        timers.set_timeout(
            interval,
            Box::new(move || {
                sweep(&shared, &walker, &timers_for_tick, &root, &listener, interval);
            }),
        )
    };
    *shared.timer.borrow_mut() = Some(next);
}
