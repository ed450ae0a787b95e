use thiserror::Error;

/// Errors raised while registering a wait.
///
/// Every variant is surfaced synchronously from the registration call that
/// caused it. The delivery path (batch dispatch, timers) never produces an
/// error; a wait that cannot fire simply stays pending until cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    /// An action name that is not `on`, `off`, or `async` was given to
    /// [`WaitAction::from_str`](crate::WaitAction).
    #[error("wait action {0:?} does not exist")]
    UnknownAction(String),

    /// `continuous: true` was combined with the future-returning interface.
    /// A continuous wait has no single resolution value.
    #[error("cannot wait continuously through the async interface")]
    ContinuousAsync,

    /// The selector matcher rejected a structural pattern at registration
    /// time.
    #[error("invalid selector pattern {pattern:?}: {message}")]
    InvalidPattern {
        /// The pattern as given by the caller.
        pattern: String,
        /// Matcher-specific explanation.
        message: String,
    },
}
