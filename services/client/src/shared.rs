//! State shared between the worker task and the telephony-driven producer
//! tasks (sensor loop handlers, the keypad handler). The queue and arming
//! machine live behind one lock; `notify` is the wakeup pipe of §4.7,
//! mapped onto `tokio::sync::Notify` — multiple writers, one reader,
//! coalescing-OK wakeups, exactly what a polling worker needs.

use tokio::sync::{Mutex, Notify};

use alarm_core::ClientRuntimeState;

pub struct SharedClient {
    pub state: Mutex<ClientRuntimeState>,
    pub notify: Notify,
}

impl SharedClient {
    pub fn new(state: ClientRuntimeState) -> SharedClient {
        SharedClient {
            state: Mutex::new(state),
            notify: Notify::new(),
        }
    }

    /// Wake the worker after a producer has appended to the queue or
    /// changed arming state.
    pub fn wake(&self) {
        self.notify.notify_one();
    }
}
