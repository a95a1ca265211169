//! Reporter trait for progress output.
//!
//! Pack, unpack and install report through this trait so the engines stay
//! independent of where their progress ends up. A context wires it to its
//! [`Logger`](crate::logger::Logger); tests and embedders can pass
//! [`NullReporter`].

pub trait Reporter {
    /// A named phase has started (e.g. "verifying payload").
    fn phase(&self, scope: &str, title: &str);

    /// One entry processed, `current` of `total`.
    fn entry(&self, scope: &str, path: &str, current: usize, total: usize);

    /// Informational message.
    fn info(&self, scope: &str, msg: &str);

    /// Something was skipped or degraded but the operation continues.
    fn warning(&self, scope: &str, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for &T {
    fn phase(&self, scope: &str, title: &str) {
        (**self).phase(scope, title)
    }
    fn entry(&self, scope: &str, path: &str, current: usize, total: usize) {
        (**self).entry(scope, path, current, total)
    }
    fn info(&self, scope: &str, msg: &str) {
        (**self).info(scope, msg)
    }
    fn warning(&self, scope: &str, msg: &str) {
        (**self).warning(scope, msg)
    }
}

/// A reporter that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn phase(&self, _scope: &str, _title: &str) {}
    fn entry(&self, _scope: &str, _path: &str, _current: usize, _total: usize) {}
    fn info(&self, _scope: &str, _msg: &str) {}
    fn warning(&self, _scope: &str, _msg: &str) {}
}
