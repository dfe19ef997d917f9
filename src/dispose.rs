//! Deferred destruction.
//!
//! Removed cache entries can hold deep chains of nested overlay objects;
//! tearing them down inline would block the notification thread. Handing the
//! value to a worker bounds handler latency, and ordering relative to other
//! observers does not matter since everything is reference-counted.

/// Drop `value` on a rayon worker instead of the calling thread.
pub(crate) fn defer_drop<T: Send + 'static>(value: T) {
    rayon::spawn(move || drop(value));
}
