use std::time::SystemTime;

/// Barrier state owned by the monitor. `change_time` is only written on a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClosureState {
    pub down: bool,
    pub change_time: Option<SystemTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentDown,
    /// `down_time_secs` is `None` when the closure start was never observed.
    WentUp { down_time_secs: Option<u64> },
}

impl ClosureState {
    /// Feed the latest derived level. Returns the edge, if any, and records `now` as the change time.
    pub fn update(&mut self, new_down: bool, now: SystemTime) -> Option<Transition> {
        if new_down == self.down {
            return None;
        }

        let transition = if new_down {
            Transition::WentDown
        } else {
            let down_time_secs = self
                .change_time
                .map(|started| now.duration_since(started).unwrap_or_default().as_secs());
            Transition::WentUp { down_time_secs }
        };

        self.down = new_down;
        self.change_time = Some(now);
        Some(transition)
    }

    pub fn is_down(&self) -> bool {
        self.down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn same_level_is_not_a_transition() {
        let mut state = ClosureState::default();
        assert_eq!(state.update(false, UNIX_EPOCH), None);
        assert_eq!(state.change_time, None);
    }

    #[test]
    fn down_then_up_reports_floored_duration() {
        let t0 = UNIX_EPOCH + Duration::from_secs(1_000);
        let mut state = ClosureState::default();

        assert_eq!(state.update(true, t0), Some(Transition::WentDown));
        assert_eq!(state.change_time, Some(t0));

        let later = t0 + Duration::from_millis(95_900);
        assert_eq!(
            state.update(false, later),
            Some(Transition::WentUp {
                down_time_secs: Some(95)
            })
        );
        assert_eq!(state.change_time, Some(later));
        assert!(!state.is_down());
    }

    #[test]
    fn up_without_known_start_has_no_duration() {
        let mut state = ClosureState {
            down: true,
            change_time: None,
        };
        assert_eq!(
            state.update(false, UNIX_EPOCH),
            Some(Transition::WentUp {
                down_time_secs: None
            })
        );
    }

    #[test]
    fn backwards_clock_yields_zero_duration() {
        let t0 = UNIX_EPOCH + Duration::from_secs(1_000);
        let mut state = ClosureState::default();
        state.update(true, t0);
        assert_eq!(
            state.update(false, t0 - Duration::from_secs(5)),
            Some(Transition::WentUp {
                down_time_secs: Some(0)
            })
        );
    }
}
