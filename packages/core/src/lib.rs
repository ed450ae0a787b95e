//! Selector-keyed waiter registry and change-dispatch engine.
//!
//! This crate tracks active "waits" on a subtree: a caller registers
//! interest in nodes matching a [`Selector`] under a [`WatchScope`] and is
//! notified when matching nodes appear (and optionally disappear), once or
//! continuously, with an optional timeout, via callback or future.
//!
//! The tree itself stays outside the crate. Three capabilities are supplied
//! to each scope at construction:
//!
//! - a [`SelectorMatcher`], which evaluates structural patterns against
//!   nodes;
//! - a [`ChangeSource`], which reports structural child-list changes under
//!   an observed subtree until disconnected;
//! - a [`TimerHost`], which schedules one-shot timeouts on the host event
//!   loop.
//!
//! [`PollingChangeSource`] is a bundled [`ChangeSource`] for hosts without a
//! native observer; it detects additions by periodic sweeps and never
//! reports removals.
//!
//! Everything runs on one thread, driven by change deliveries and timer
//! firings. Cancellation - explicit, by timeout, or by one-shot completion -
//! is synchronous and idempotent, and dropping the last handle to a scope
//! cancels every wait still attached to it.
//!
//! # Callback identity
//!
//! Waits are keyed by `(selector, callback)` where the callback component is
//! the **`Rc` allocation**, not the closure's shape. Cancelling a specific
//! wait requires a clone of the `Rc` that registered it. See
//! [`WaitCallback`].

mod error;
mod polling;
mod scope;
mod selector;
mod source;
mod waiter;
mod waiter_map;

pub use error::WaitError;
pub use polling::{PollingChangeSource, TreeWalk, DEFAULT_POLL_INTERVAL};
pub use scope::{WaitAction, WaitFuture, WaitStatus, WatchScope};
pub use selector::{NodePredicate, Selector, SelectorMatcher};
pub use source::{
    BatchListener, ChangeRecord, ChangeSource, ObserveConfig, Subscription, TimerHandle, TimerHost,
};
pub use waiter::{TimedOutCallback, WaitCallback, WaitOptions};
