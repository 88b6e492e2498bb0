use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-client "streaming desired" gate.
///
/// Clones share the same value: the session store keeps one, a running
/// stream keeps another, and a later stop request clears both at once.
#[derive(Clone, Debug, Default)]
pub struct StreamingFlag(Arc<AtomicBool>);

impl StreamingFlag {
    pub fn new(streaming: bool) -> Self {
        Self(Arc::new(AtomicBool::new(streaming)))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, streaming: bool) {
        self.0.store(streaming, Ordering::SeqCst);
    }
}
