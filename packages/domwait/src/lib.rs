//! Wait for selector matches to appear in (or disappear from) a subtree.
//!
//! The engine lives in [`domwait_core`]; this crate re-exports it and adds a
//! prelude.
//!
//! ```ignore
//! use domwait::prelude::*;
//!
//! let scope = WatchScope::new(root, matcher, source, timers);
//!
//! // fire once when a match shows up (or right away if one already exists)
//! scope.wait_on(
//!     Selector::pattern("item#pending"),
//!     WaitOptions::default().timeout(Duration::from_secs(5)),
//!     Rc::new(|added, _removed| println!("matched {} node(s)", added.len())),
//! )?;
//!
//! // or await it
//! let first = scope.wait_async(Selector::pattern("item"), WaitOptions::default())?.await;
//! ```

pub use domwait_core as core;

pub use domwait_core::*;

pub mod prelude {
    pub use domwait_core::{
        ChangeRecord, ChangeSource, ObserveConfig, Selector, SelectorMatcher, Subscription,
        TimerHandle, TimerHost, WaitAction, WaitCallback, WaitError, WaitOptions, WaitStatus,
        WatchScope,
    };
}
