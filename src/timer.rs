//! Case countdown: a spawned tokio task that ticks once per second and reports
//! through an mpsc channel.
//!
//! Each countdown carries an epoch so the session can tell its own events apart from
//! a previous attempt's. Dropping the `CountdownHandle` aborts the task, so every exit
//! path (new case, restart, expiry, disconnect) stops it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Below this many seconds the clock is shown as urgent.
pub const URGENT_BELOW_SECS: u32 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { epoch: u64, remaining: u32 },
    Expired { epoch: u64 },
}

impl TimerEvent {
    pub fn epoch(&self) -> u64 {
        match *self {
            TimerEvent::Tick { epoch, .. } | TimerEvent::Expired { epoch } => epoch,
        }
    }
}

/// Owning handle for a running countdown. Cancels on drop.
#[derive(Debug)]
pub struct CountdownHandle {
    epoch: u64,
    task: JoinHandle<()>,
}

impl CountdownHandle {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn cancel(self) {
        // Drop does the work.
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
        debug!(target: "timer", epoch = self.epoch, "Countdown cancelled");
    }
}

/// Start counting down from `remaining` seconds. Emits one `Tick` per second with the
/// new value and a single `Expired` when it reaches zero; never goes negative.
/// A countdown started at zero expires immediately.
pub fn start_countdown(
    epoch: u64,
    remaining: u32,
    events: mpsc::UnboundedSender<TimerEvent>,
) -> CountdownHandle {
    let task = tokio::spawn(async move {
        let mut remaining = remaining;
        if remaining == 0 {
            let _ = events.send(TimerEvent::Expired { epoch });
            return;
        }
        let period = Duration::from_secs(1);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            remaining -= 1;
            if events.send(TimerEvent::Tick { epoch, remaining }).is_err() {
                return;
            }
            if remaining == 0 {
                let _ = events.send(TimerEvent::Expired { epoch });
                return;
            }
        }
    });
    debug!(target: "timer", epoch, remaining, "Countdown started");
    CountdownHandle { epoch, task }
}

/// `MM:SS`, both zero-padded.
pub fn format_clock(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub fn is_urgent(secs: u32) -> bool {
    secs < URGENT_BELOW_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<TimerEvent>) -> Vec<TimerEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn clock_is_zero_padded() {
        assert_eq!(format_clock(420), "07:00");
        assert_eq!(format_clock(59), "00:59");
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(605), "10:05");
        assert!(is_urgent(59));
        assert!(!is_urgent(60));
    }

    #[tokio::test(start_paused = true)]
    async fn full_countdown_expires_exactly_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = start_countdown(1, 420, tx);

        tokio::time::sleep(Duration::from_millis(419_500)).await;
        let early = drain(&mut rx);
        assert_eq!(early.len(), 419);
        assert_eq!(early.last(), Some(&TimerEvent::Tick { epoch: 1, remaining: 1 }));

        tokio::time::sleep(Duration::from_secs(30)).await;
        let late = drain(&mut rx);
        assert_eq!(
            late,
            vec![TimerEvent::Tick { epoch: 1, remaining: 0 }, TimerEvent::Expired { epoch: 1 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_remaining_expires_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = start_countdown(3, 0, tx);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(drain(&mut rx), vec![TimerEvent::Expired { epoch: 3 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_stops_ticking() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = start_countdown(1, 5, tx);
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![TimerEvent::Tick { epoch: 1, remaining: 4 }, TimerEvent::Tick { epoch: 1, remaining: 3 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_does_not_double_the_pace() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = start_countdown(1, 10, tx.clone());
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        drop(first);
        let _second = start_countdown(2, 10, tx);
        tokio::time::sleep(Duration::from_millis(3_200)).await;

        let events = drain(&mut rx);
        let first_ticks = events.iter().filter(|e| e.epoch() == 1).count();
        let second: Vec<_> = events.into_iter().filter(|e| e.epoch() == 2).collect();
        assert_eq!(first_ticks, 2);
        assert_eq!(
            second,
            vec![
                TimerEvent::Tick { epoch: 2, remaining: 9 },
                TimerEvent::Tick { epoch: 2, remaining: 8 },
                TimerEvent::Tick { epoch: 2, remaining: 7 },
            ]
        );
    }
}
