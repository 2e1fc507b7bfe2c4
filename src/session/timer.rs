use serde::Serialize;
use tracing::debug;

/// What a countdown completes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Preparation,
    Answer,
    Finishing,
    SectionBreak,
}

/// Public view of the running countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownState {
    pub kind: TimerKind,
    pub remaining_secs: u32,
}

/// The session's single countdown.
///
/// At most one timer exists; starting a new one replaces the previous one, so
/// a stale timer can never fire. Each start bumps `generation`, which the
/// runner uses to realign its 1-second ticker.
#[derive(Debug, Default)]
pub struct Countdown {
    active: Option<CountdownState>,
    generation: u64,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, kind: TimerKind, seconds: u32) {
        if let Some(previous) = self.active.take() {
            debug!("Replacing {:?} countdown ({}s left)", previous.kind, previous.remaining_secs);
        }

        self.generation += 1;
        self.active = Some(CountdownState {
            kind,
            remaining_secs: seconds,
        });
    }

    /// Clear the countdown without firing it
    pub fn cancel(&mut self) -> Option<TimerKind> {
        self.active.take().map(|state| state.kind)
    }

    /// Advance one second. Returns the kind that just reached zero, at most once.
    pub fn tick(&mut self) -> Option<TimerKind> {
        let state = self.active.as_mut()?;
        state.remaining_secs = state.remaining_secs.saturating_sub(1);

        if state.remaining_secs == 0 {
            self.active.take().map(|state| state.kind)
        } else {
            None
        }
    }

    pub fn state(&self) -> Option<CountdownState> {
        self.active
    }

    pub fn kind(&self) -> Option<TimerKind> {
        self.active.map(|state| state.kind)
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_at_zero() {
        let mut countdown = Countdown::new();
        countdown.start(TimerKind::Answer, 3);

        assert_eq!(countdown.tick(), None);
        assert_eq!(countdown.tick(), None);
        assert_eq!(countdown.tick(), Some(TimerKind::Answer));
        assert_eq!(countdown.tick(), None);
        assert!(!countdown.is_running());
    }

    #[test]
    fn test_start_replaces_previous() {
        let mut countdown = Countdown::new();
        countdown.start(TimerKind::Preparation, 1);
        countdown.start(TimerKind::Answer, 2);

        assert_eq!(countdown.generation(), 2);
        assert_eq!(countdown.tick(), None);
        assert_eq!(countdown.tick(), Some(TimerKind::Answer));
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let mut countdown = Countdown::new();
        countdown.start(TimerKind::SectionBreak, 1);

        assert_eq!(countdown.cancel(), Some(TimerKind::SectionBreak));
        assert_eq!(countdown.tick(), None);
        assert_eq!(countdown.cancel(), None);
    }

    #[test]
    fn test_zero_duration_fires_on_first_tick() {
        let mut countdown = Countdown::new();
        countdown.start(TimerKind::Finishing, 0);
        assert_eq!(countdown.tick(), Some(TimerKind::Finishing));
    }
}
