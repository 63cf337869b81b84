use std::fmt;
use std::sync::{Arc, Mutex};

type CancelFn = Box<dyn FnOnce() + Send>;

/// Aborts an in-flight upload.
///
/// Clones share the same underlying callback, which runs at most once no matter how
/// many clones call [`CancelHandle::cancel`].
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Mutex<Option<CancelFn>>>,
}

impl CancelHandle {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(f)))),
        }
    }

    /// Invoke the abort callback. Returns `true` only for the call that actually fired it.
    pub fn cancel(&self) -> bool {
        let f = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match f {
            Some(f) => {
                f();
                true
            }
            None => false,
        }
    }

    /// True while the callback has not run yet.
    pub fn is_armed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("armed", &self.is_armed())
            .finish()
    }
}
