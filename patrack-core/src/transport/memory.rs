use std::sync::{Arc, Mutex};

use crate::types::Envelope;

use super::Transport;

/// Records every envelope it is given. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<Envelope>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far, in send order
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return everything sent so far
    pub fn take(&self) -> Vec<Envelope> {
        self.sent
            .lock()
            .map(|mut sent| std::mem::take(&mut *sent))
            .unwrap_or_default()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, envelope: &Envelope) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(envelope.clone());
        }
    }
}
