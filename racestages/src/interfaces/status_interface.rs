use crate::core::stage_tracker::{StageState, TERMINAL_STAGE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

/// StatusReport is published after every processed tick and on connection changes. It is purely
/// informational.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    pub connection: ConnectionState,
    pub session_type: Option<String>,
    pub current_stage: usize,
    pub completed_laps: i32,
    pub num_winners_so_far: usize,
}

impl StatusReport {
    pub fn new(
        connection: ConnectionState,
        session_type: Option<String>,
        state: &StageState,
    ) -> StatusReport {
        StatusReport {
            connection,
            session_type,
            current_stage: state.current_stage,
            completed_laps: state.completed_laps,
            num_winners_so_far: state.num_winners_so_far,
        }
    }
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let connection = match self.connection {
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        };
        let stage = if self.current_stage >= TERMINAL_STAGE {
            "finished".to_owned()
        } else {
            format!("stage {}", self.current_stage + 1)
        };
        write!(
            f,
            "{} ({}) | {} | laps completed {} | winners {}",
            connection,
            self.session_type.as_deref().unwrap_or("-"),
            stage,
            self.completed_laps,
            self.num_winners_so_far
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_shows_active_stage() {
        let state = StageState {
            current_stage: 1,
            completed_laps: 42,
            num_winners_so_far: 3,
            ..StageState::default()
        };
        let report = StatusReport::new(ConnectionState::Connected, Some("Race".to_owned()), &state);
        assert_eq!(
            report.to_string(),
            "connected (Race) | stage 2 | laps completed 42 | winners 3"
        );
    }

    #[test]
    fn status_line_shows_finished_race() {
        let state = StageState {
            current_stage: TERMINAL_STAGE,
            completed_laps: 60,
            ..StageState::default()
        };
        let report = StatusReport::new(ConnectionState::Disconnected, None, &state);
        assert_eq!(
            report.to_string(),
            "disconnected (-) | finished | laps completed 60 | winners 0"
        );
    }
}
