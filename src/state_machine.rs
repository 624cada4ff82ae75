//! Minimal state machine: a current state plus enter/exit hooks.

use std::fmt;

/// A type that moves between states of [`StateMachine::State`].
///
/// Implementors store the current state and provide the hooks;
/// [`StateMachine::change_state_to`] sequences them.
pub trait StateMachine {
    type State: Copy + PartialEq + fmt::Display;

    /// `None` before the first transition.
    fn current_state(&self) -> Option<Self::State>;

    fn set_current_state(&mut self, state: Self::State);

    fn on_state_entered(&mut self, state: Self::State);

    fn on_state_exited(&mut self, state: Self::State);

    /// Make `target` current, then run the old state's exit hook and the new
    /// state's enter hook. Changing to the current state does nothing.
    fn change_state_to(&mut self, target: Self::State) {
        let last = self.current_state();
        if last == Some(target) {
            tracing::info!("already {}", target);
            return;
        }
        self.set_current_state(target);
        match last {
            None => tracing::info!("change to {}", target),
            Some(last) => {
                tracing::info!("{} -> {}", last, target);
                self.on_state_exited(last);
            }
        }
        self.on_state_entered(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Light {
        Red,
        Green,
    }

    impl fmt::Display for Light {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    #[derive(Default)]
    struct Machine {
        current: Option<Light>,
        log: Vec<String>,
    }

    impl StateMachine for Machine {
        type State = Light;

        fn current_state(&self) -> Option<Light> {
            self.current
        }

        fn set_current_state(&mut self, state: Light) {
            self.current = Some(state);
        }

        fn on_state_entered(&mut self, state: Light) {
            self.log.push(format!("enter {}", state));
        }

        fn on_state_exited(&mut self, state: Light) {
            self.log.push(format!("exit {}", state));
        }
    }

    #[test]
    fn test_hooks_run_in_order() {
        let mut m = Machine::default();
        m.change_state_to(Light::Red);
        m.change_state_to(Light::Red);
        m.change_state_to(Light::Green);
        assert_eq!(m.log, vec!["enter Red", "exit Red", "enter Green"]);
        assert_eq!(m.current_state(), Some(Light::Green));
    }
}
