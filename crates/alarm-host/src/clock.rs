//! The real-world `Clock` implementation, backed by `SystemTime`.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::interfaces::Clock;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    async fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the epoch")
            .as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn now_secs_is_plausibly_current() {
        let clock = SystemClock;
        let now = clock.now_secs().await;
        assert!(now > 1_700_000_000);
    }
}
