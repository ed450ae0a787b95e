use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::str::FromStr;
use std::task::{Context, Poll};

use futures_channel::oneshot;
use tracing::{debug, trace};

use crate::error::WaitError;
use crate::selector::{Selector, SelectorMatcher};
use crate::source::{BatchListener, ChangeSource, ObserveConfig, TimerHost};
use crate::waiter::{callback_key_of, WaitCallback, WaitOptions, Waiter};
use crate::waiter_map::WaiterMap;

/// The subtree root under which waits are registered.
///
/// A scope owns its waits: the matcher, change source, and timer host are
/// supplied explicitly at construction, and dropping the last handle to a
/// scope cancels every wait still attached to it - subscriptions are
/// disconnected and timers cleared.
///
/// Handles are cheap to clone and all refer to the same scope.
pub struct WatchScope<N: Clone + 'static> {
    inner: Rc<ScopeInner<N>>,
}

pub(crate) struct ScopeInner<N: Clone + 'static> {
    pub(crate) root: N,
    pub(crate) matcher: Rc<dyn SelectorMatcher<N>>,
    pub(crate) source: Rc<dyn ChangeSource<N>>,
    pub(crate) timers: Rc<dyn TimerHost>,
    pub(crate) waits: RefCell<WaiterMap<Rc<Waiter<N>>>>,
}

impl<N: Clone + 'static> Clone for WatchScope<N> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Outcome of a successful [`WatchScope::wait_on`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    /// The wait is registered and listening for changes.
    Listening,
    /// An immediate match already fired the callback; nothing was
    /// registered and there is nothing to cancel.
    CompletedImmediately,
}

impl<N: Clone + 'static> WatchScope<N> {
    pub fn new(
        root: N,
        matcher: Rc<dyn SelectorMatcher<N>>,
        source: Rc<dyn ChangeSource<N>>,
        timers: Rc<dyn TimerHost>,
    ) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                root,
                matcher,
                source,
                timers,
                waits: RefCell::new(WaiterMap::default()),
            }),
        }
    }

    pub fn root(&self) -> &N {
        &self.inner.root
    }

    /// Number of live registrations on this scope.
    pub fn active_waits(&self) -> usize {
        self.inner.waits.borrow().len()
    }

    /// Number of live registrations for `selector`.
    pub fn waits_for(&self, selector: &Selector<N>) -> usize {
        self.inner.waits.borrow().all(&selector.key()).count()
    }

    /// Is this exact `(selector, callback)` pair registered? The callback is
    /// compared by `Rc` identity.
    pub fn is_waiting(&self, selector: &Selector<N>, callback: &WaitCallback<N>) -> bool {
        self.inner
            .waits
            .borrow()
            .get(&selector.key(), callback_key_of(callback))
            .is_some()
    }

    /// Register a wait for `selector`.
    ///
    /// If the selector is a pattern, removals are not of interest, and the
    /// existing tree already satisfies it, the callback runs synchronously
    /// with the current matches before this returns; unless the wait is
    /// continuous, no subscription is created and
    /// [`WaitStatus::CompletedImmediately`] comes back.
    ///
    /// Otherwise the wait subscribes to the scope's change source and fires
    /// whenever a batch yields matches that pass the added/removed policy -
    /// once, or on every qualifying batch when `continuous` is set.
    ///
    /// Registering the same `(selector, callback)` pair again replaces the
    /// earlier registration. Callback identity is the `Rc` allocation: pass
    /// a clone of the original `Rc` to mean "the same callback".
    pub fn wait_on(
        &self,
        selector: impl Into<Selector<N>>,
        options: WaitOptions,
        callback: WaitCallback<N>,
    ) -> Result<WaitStatus, WaitError> {
        let selector = selector.into();
        if let Selector::Pattern(pattern) = &selector {
            self.inner.matcher.check_pattern(pattern)?;
        }
        trace!(selector = ?selector, "registering wait");

        let waiter = Waiter::new(
            selector,
            callback,
            options,
            self.inner.matcher.clone(),
            Rc::downgrade(&self.inner),
        );

        if waiter.try_immediate(&self.inner.root) {
            return Ok(WaitStatus::CompletedImmediately);
        }

        let listener: BatchListener<N> = {
            let waiter = Rc::downgrade(&waiter);
            Rc::new(move |records| {
                if let Some(waiter) = waiter.upgrade() {
                    waiter.on_batch(records);
                }
            })
        };
        let subscription =
            self.inner
                .source
                .observe(&self.inner.root, ObserveConfig::structural(), listener);
        waiter.attach_subscription(subscription);
        if !waiter.is_pending() {
            // the source delivered a matching batch from inside observe
            waiter.release_resources();
            return Ok(WaitStatus::CompletedImmediately);
        }

        let displaced = self.inner.waits.borrow_mut().add(
            waiter.selector_key().clone(),
            waiter.callback_key(),
            waiter.clone(),
        );
        if let Some(previous) = displaced {
            debug!("replacing wait registered for the same selector and callback");
            previous.displace();
        }

        if let Some(timeout) = waiter.timeout() {
            let handle = {
                let waiter = Rc::downgrade(&waiter);
                self.inner.timers.set_timeout(
                    timeout,
                    Box::new(move || {
                        if let Some(waiter) = waiter.upgrade() {
                            waiter.on_timeout();
                        }
                    }),
                )
            };
            waiter.attach_timer(handle);
        }

        Ok(WaitStatus::Listening)
    }

    /// Cancel waits for `selector` on this scope.
    ///
    /// With a callback, cancels exactly the wait registered with that `Rc`
    /// (identity, not value). Without one, cancels every wait for the
    /// selector. Cancelling a wait that does not exist, or one that already
    /// fired, is a silent no-op.
    pub fn wait_off(&self, selector: &Selector<N>, callback: Option<&WaitCallback<N>>) {
        let key = selector.key();
        match callback {
            Some(callback) => {
                let removed = self
                    .inner
                    .waits
                    .borrow_mut()
                    .remove(&key, callback_key_of(callback));
                if let Some(waiter) = removed {
                    debug!(selector = ?selector, "cancelling wait");
                    waiter.stop();
                }
            }
            None => {
                // snapshot first: stopping a wait must not race the drain
                let removed = self.inner.waits.borrow_mut().remove_all(&key);
                if !removed.is_empty() {
                    debug!(selector = ?selector, count = removed.len(), "cancelling waits");
                }
                for waiter in removed {
                    waiter.stop();
                }
            }
        }
    }

    /// Future-returning variant of [`wait_on`](Self::wait_on): resolves with
    /// the first matching set of added nodes.
    ///
    /// Fails with [`WaitError::ContinuousAsync`] before any subscription is
    /// made if `options.continuous` is set. Resolves to `None` if the wait
    /// is cancelled or times out before anything matches.
    pub fn wait_async(
        &self,
        selector: impl Into<Selector<N>>,
        options: WaitOptions,
    ) -> Result<WaitFuture<N>, WaitError> {
        if options.continuous {
            return Err(WaitError::ContinuousAsync);
        }
        let (sender, receiver) = oneshot::channel();
        let sender = RefCell::new(Some(sender));
        let callback: WaitCallback<N> = Rc::new(move |added: &[N], _removed: &[N]| {
            if let Some(sender) = sender.borrow_mut().take() {
                let _ = sender.send(added.to_vec());
            }
        });
        self.wait_on(selector, options, callback)?;
        Ok(WaitFuture { receiver })
    }
}

impl<N: Clone + 'static> Drop for ScopeInner<N> {
    fn drop(&mut self) {
        if self.waits.borrow().is_empty() {
            return;
        }
        let waiters = self.waits.borrow_mut().drain();
        debug!(count = waiters.len(), "scope dropped with live waits");
        for waiter in &waiters {
            waiter.stop();
        }
    }
}

/// Resolves with the added matches of a one-shot wait, or `None` if the wait
/// was cancelled or timed out first.
#[derive(Debug)]
pub struct WaitFuture<N> {
    receiver: oneshot::Receiver<Vec<N>>,
}

impl<N> Future for WaitFuture<N> {
    type Output = Option<Vec<N>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|sent| sent.ok())
    }
}

/// The three verbs of the wait surface, for callers bridging a dynamic
/// dispatch boundary. Parsing an unrecognized name reports it by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitAction {
    On,
    Off,
    Async,
}

impl FromStr for WaitAction {
    type Err = WaitError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "async" => Ok(Self::Async),
            other => Err(WaitError::UnknownAction(other.to_string())),
        }
    }
}
