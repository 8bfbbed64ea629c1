use crate::pipeline::command::CommandBuffer;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Auto-reset wake signal shared by a queue and whoever sleeps on it.
#[derive(Debug, Default)]
pub struct WakeEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl WakeEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        if let Ok(mut signaled) = self.signaled.lock() {
            *signaled = true;
        }
        self.cond.notify_all();
    }

    /// Blocks until notified or until `timeout` elapses. Returns whether a
    /// notification was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Ok(guard) = self.signaled.lock() else {
            return true;
        };
        let Ok((mut signaled, _)) = self
            .cond
            .wait_timeout_while(guard, timeout, |signaled| !*signaled)
        else {
            return true;
        };
        std::mem::replace(&mut *signaled, false)
    }
}

/// Unbounded multi-producer/multi-consumer FIFO of command buffers.
#[derive(Debug)]
pub struct CommandQueue {
    name: &'static str,
    tx: Sender<CommandBuffer>,
    rx: Receiver<CommandBuffer>,
    wake: Arc<WakeEvent>,
}

impl CommandQueue {
    pub fn new(name: &'static str) -> Self {
        let (tx, rx) = unbounded();
        Self {
            name,
            tx,
            rx,
            wake: Arc::new(WakeEvent::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn push(&self, buf: CommandBuffer) {
        // Both channel ends live in `self`, so the send cannot disconnect.
        if let Err(err) = self.tx.send(buf) {
            tracing::error!(queue = self.name, kind = ?err.0.kind, "command queue disconnected");
            return;
        }
        self.wake.notify();
    }

    pub fn pop(&self) -> Option<CommandBuffer> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn wake_event(&self) -> &Arc<WakeEvent> {
        &self.wake
    }
}

/// The two directional queues between the host and the engine thread.
#[derive(Debug)]
pub struct DuplexQueues {
    pub to_engine: CommandQueue,
    pub to_host: CommandQueue,
}

impl Default for DuplexQueues {
    fn default() -> Self {
        Self {
            to_engine: CommandQueue::new("host-to-engine"),
            to_host: CommandQueue::new("engine-to-host"),
        }
    }
}

impl DuplexQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake_all(&self) {
        self.to_engine.wake_event().notify();
        self.to_host.wake_event().notify();
    }
}
