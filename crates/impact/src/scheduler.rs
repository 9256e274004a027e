use crate::analyzer::Shared;
use log::debug;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SchedulerCommand {
    /// A change was queued: restart the debounce window.
    Arm,
    /// The queue was cleared: forget any pending run.
    Disarm,
    /// Fire on the next loop turn.
    FireNow,
    /// A drain finished; re-arm if a backlog remains.
    BatchFinished,
    Shutdown,
}

/// Single-slot deferred task: arming replaces whatever was armed before.
#[derive(Debug)]
pub(crate) struct DebounceTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub(crate) const fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub(crate) fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub(crate) fn arm_now(&mut self) {
        self.deadline = Some(Instant::now());
    }

    pub(crate) fn disarm(&mut self) {
        self.deadline = None;
    }

    pub(crate) const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consumes the armed slot if it is due at `now`.
    pub(crate) fn take_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Runs the idle / batch-scheduled / batch-running state machine.
///
/// The loop holds only a weak reference so that dropping every analyzer
/// handle closes the command channel and ends the task.
pub(crate) fn spawn_scheduler(
    shared: Weak<Shared>,
    delay: Duration,
    mut command_rx: mpsc::UnboundedReceiver<SchedulerCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = DebounceTimer::new(delay);

        loop {
            let next_deadline = timer.deadline();

            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::Arm) => timer.arm(),
                        Some(SchedulerCommand::Disarm) => timer.disarm(),
                        Some(SchedulerCommand::FireNow) => timer.arm_now(),
                        Some(SchedulerCommand::BatchFinished) => {
                            let Some(shared) = shared.upgrade() else { break };
                            if shared.queue_size() > 0 {
                                timer.arm();
                            }
                        }
                        Some(SchedulerCommand::Shutdown) | None => break,
                    }
                }
                () = async {
                    if let Some(deadline) = next_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if next_deadline.is_some() => {
                    if !timer.take_if_due(Instant::now()) {
                        continue;
                    }
                    let Some(shared) = shared.upgrade() else { break };
                    shared.on_timer_fired();
                }
            }
        }
        debug!("Change analyzer scheduler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::DebounceTimer;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn rearming_pushes_the_deadline_back() {
        let mut timer = DebounceTimer::new(Duration::from_millis(100));
        timer.arm();
        let first = timer.deadline().expect("armed");

        tokio::time::advance(Duration::from_millis(60)).await;
        timer.arm();
        let second = timer.deadline().expect("armed");

        assert_eq!(second - first, Duration::from_millis(60));
        assert!(!timer.take_if_due(first));
        assert!(timer.take_if_due(second));
        assert!(timer.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_clears_the_slot() {
        let mut timer = DebounceTimer::new(Duration::from_millis(10));
        timer.arm();
        timer.disarm();
        assert!(timer.deadline().is_none());
        assert!(!timer.take_if_due(Instant::now() + Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn arm_now_is_immediately_due() {
        let mut timer = DebounceTimer::new(Duration::from_secs(30));
        timer.arm_now();
        assert!(timer.take_if_due(Instant::now()));
    }
}
