use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::trace;

use crate::scope::ScopeInner;
use crate::selector::{Selector, SelectorKey, SelectorMatcher};
use crate::source::{ChangeRecord, Subscription, TimerHandle};
use crate::waiter_map::CallbackKey;

/// The user callback: invoked with `(added_matches, removed_matches)`.
///
/// Callbacks are keyed by `Rc` allocation identity, never by value. Hold on
/// to the `Rc` you registered if you intend to cancel that specific wait
/// later; a freshly allocated closure with the same body will not match it.
pub type WaitCallback<N> = Rc<dyn Fn(&[N], &[N])>;

/// Invoked, with no arguments, when a wait's timeout elapses.
pub type TimedOutCallback = Rc<dyn Fn()>;

/// Configuration for one wait.
#[derive(Clone)]
pub struct WaitOptions {
    /// Auto-cancel the wait after this long without resolution. `None`
    /// disables the timeout.
    pub timeout: Option<Duration>,
    /// Called once when the timeout elapses.
    pub timed_out: Option<TimedOutCallback>,
    /// Fire on matches among added nodes.
    pub include_added: bool,
    /// Fire on matches among removed nodes.
    pub include_removed: bool,
    /// Keep firing on every qualifying batch instead of stopping after the
    /// first.
    pub continuous: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            timed_out: None,
            include_added: true,
            include_removed: false,
            continuous: false,
        }
    }
}

impl WaitOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timed_out(mut self, timed_out: impl Fn() + 'static) -> Self {
        self.timed_out = Some(Rc::new(timed_out));
        self
    }

    pub fn include_added(mut self, include_added: bool) -> Self {
        self.include_added = include_added;
        self
    }

    pub fn include_removed(mut self, include_removed: bool) -> Self {
        self.include_removed = include_removed;
        self
    }

    pub fn continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum WaitState {
    Pending,
    FiredOnce,
    Cancelled,
}

/// One registered wait and its lifecycle: immediate match, live filtering,
/// timeout, teardown. `FiredOnce` and `Cancelled` are both terminal; after
/// either, the callback is never invoked again and no resources stay live.
pub(crate) struct Waiter<N: Clone + 'static> {
    selector: Selector<N>,
    selector_key: SelectorKey,
    callback: WaitCallback<N>,
    callback_key: CallbackKey,
    options: WaitOptions,
    matcher: Rc<dyn SelectorMatcher<N>>,
    scope: Weak<ScopeInner<N>>,
    state: Cell<WaitState>,
    subscription: RefCell<Option<Box<dyn Subscription>>>,
    timer: RefCell<Option<Box<dyn TimerHandle>>>,
}

pub(crate) fn callback_key_of<N>(callback: &WaitCallback<N>) -> CallbackKey {
    Rc::as_ptr(callback) as *const () as usize
}

impl<N: Clone + 'static> Waiter<N> {
    pub(crate) fn new(
        selector: Selector<N>,
        callback: WaitCallback<N>,
        options: WaitOptions,
        matcher: Rc<dyn SelectorMatcher<N>>,
        scope: Weak<ScopeInner<N>>,
    ) -> Rc<Self> {
        let selector_key = selector.key();
        let callback_key = callback_key_of(&callback);
        Rc::new(Self {
            selector,
            selector_key,
            callback,
            callback_key,
            options,
            matcher,
            scope,
            state: Cell::new(WaitState::Pending),
            subscription: RefCell::new(None),
            timer: RefCell::new(None),
        })
    }

    pub(crate) fn selector_key(&self) -> &SelectorKey {
        &self.selector_key
    }

    pub(crate) fn callback_key(&self) -> CallbackKey {
        self.callback_key
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.options.timeout
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.state.get() == WaitState::Pending
    }

    /// Check the existing tree at registration time. Returns true when the
    /// wait completed outright and needs no subscription.
    ///
    /// Only pattern selectors can be answered from the current tree, and
    /// only when removals are not of interest. The result goes through the
    /// same policy step as a live batch, so `include_added: false`
    /// suppresses it like any other added-node match.
    pub(crate) fn try_immediate(&self, root: &N) -> bool {
        let Selector::Pattern(pattern) = &self.selector else {
            return false;
        };
        if self.options.include_removed {
            return false;
        }
        let found = self.matcher.find_descendants(root, pattern);
        if self.fire(&found, &[]) && !self.options.continuous {
            self.state.set(WaitState::FiredOnce);
            trace!("wait satisfied by existing tree");
            return true;
        }
        false
    }

    pub(crate) fn attach_subscription(&self, subscription: Box<dyn Subscription>) {
        if self.is_pending() {
            *self.subscription.borrow_mut() = Some(subscription);
        } else {
            subscription.disconnect();
        }
    }

    pub(crate) fn attach_timer(&self, timer: Box<dyn TimerHandle>) {
        if self.is_pending() {
            *self.timer.borrow_mut() = Some(timer);
        } else {
            timer.clear();
        }
    }

    /// One delivery from the change source.
    pub(crate) fn on_batch(&self, records: &[ChangeRecord<N>]) {
        if !self.is_pending() {
            return;
        }
        let mut added = Vec::new();
        let mut removed = Vec::new();
        for record in records {
            self.collect_matches(&record.added_nodes, &mut added);
            self.collect_matches(&record.removed_nodes, &mut removed);
        }
        if self.fire(&added, &removed) && !self.options.continuous {
            self.shutdown(WaitState::FiredOnce);
        }
    }

    fn collect_matches(&self, nodes: &[N], out: &mut Vec<N>) {
        match &self.selector {
            Selector::Any => out.extend(nodes.iter().cloned()),
            Selector::Predicate(predicate) => {
                for node in nodes {
                    if predicate(node) {
                        out.push(node.clone());
                    }
                }
            }
            Selector::Pattern(pattern) => {
                // A record may report only the root of an inserted subtree;
                // the actual match can sit several levels below it.
                for node in nodes {
                    if !self.matcher.matches_self_or_descendant(node, pattern) {
                        continue;
                    }
                    if self.matcher.matches_self(node, pattern) {
                        out.push(node.clone());
                    }
                    out.extend(self.matcher.find_descendants(node, pattern));
                }
            }
        }
    }

    /// Aggregation policy shared by the immediate and live paths. Invokes
    /// the callback at most once per batch.
    fn fire(&self, added: &[N], removed: &[N]) -> bool {
        let has_added = !added.is_empty() && self.options.include_added;
        let has_removed = !removed.is_empty() && self.options.include_removed;
        if !(has_added || has_removed) {
            return false;
        }
        trace!(added = added.len(), removed = removed.len(), "wait matched");
        (self.callback)(added, removed);
        true
    }

    pub(crate) fn on_timeout(&self) {
        if !self.is_pending() {
            return;
        }
        trace!("wait timed out");
        self.shutdown(WaitState::Cancelled);
        if let Some(timed_out) = &self.options.timed_out {
            timed_out();
        }
    }

    /// Explicit cancellation: `off`, or scope teardown.
    pub(crate) fn stop(&self) {
        self.shutdown(WaitState::Cancelled);
    }

    /// Teardown for a waiter displaced from the registry by a
    /// re-registration of the same selector and callback. The registry slot
    /// now belongs to the replacement, so this must not touch it.
    pub(crate) fn displace(&self) {
        if self.is_pending() {
            self.state.set(WaitState::Cancelled);
        }
        self.release_resources();
    }

    fn shutdown(&self, next: WaitState) {
        if self.state.get() == WaitState::Pending {
            self.state.set(next);
        }
        self.release_resources();
        self.unregister();
    }

    /// Clear the pending timer and disconnect the subscription. Safe to call
    /// repeatedly and in any state.
    pub(crate) fn release_resources(&self) {
        if let Some(timer) = self.timer.borrow_mut().take() {
            timer.clear();
        }
        if let Some(subscription) = self.subscription.borrow_mut().take() {
            subscription.disconnect();
        }
    }

    fn unregister(&self) {
        if let Some(scope) = self.scope.upgrade() {
            scope
                .waits
                .borrow_mut()
                .remove(&self.selector_key, self.callback_key);
        }
    }
}

impl<N: Clone + 'static> Drop for Waiter<N> {
    fn drop(&mut self) {
        // A waiter displaced from the registry without an explicit stop must
        // not keep its observation alive.
        self.release_resources();
    }
}
