//! Chaos engineering scenarios for DST.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// DST-001: Clean stream, follow-head, exact markers
    SteadyStream,

    /// DST-002: Backlog larger than the pending queue between refreshes
    BurstOverflow,

    /// DST-003: Stop, power-cycle the robot, start again
    SessionRestart,

    /// DST-004: Transport delivers lines twice
    DuplicateLines,

    /// DST-005: Junk and malformed lines mixed into the stream
    GarbageLines,

    /// DST-006: Control requests that never answer
    ControlTimeout,

    /// DST-007: Backend without a kill route
    KillFallback,

    /// DST-008: Random plan editing with undo/redo
    PlanEditing,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyStream,
            ScenarioId::BurstOverflow,
            ScenarioId::SessionRestart,
            ScenarioId::DuplicateLines,
            ScenarioId::GarbageLines,
            ScenarioId::ControlTimeout,
            ScenarioId::KillFallback,
            ScenarioId::PlanEditing,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyStream => "steady_stream",
            ScenarioId::BurstOverflow => "burst_overflow",
            ScenarioId::SessionRestart => "session_restart",
            ScenarioId::DuplicateLines => "duplicate_lines",
            ScenarioId::GarbageLines => "garbage_lines",
            ScenarioId::ControlTimeout => "control_timeout",
            ScenarioId::KillFallback => "kill_fallback",
            ScenarioId::PlanEditing => "plan_editing",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyStream => "20Hz stream, every sample appended, markers exact, head followed",
            ScenarioId::BurstOverflow => "Refresh stalls while the robot floods the queue; oldest lines dropped",
            ScenarioId::SessionRestart => "Robot clock restarts at 0 in a second session; track stays sorted",
            ScenarioId::DuplicateLines => "20% duplicated lines; duplicates rejected as out-of-order",
            ScenarioId::GarbageLines => "Prefixed lines with 10% junk; junk ignored or counted malformed",
            ScenarioId::ControlTimeout => "Start hangs once and is retried; a hung stop leaves flags untouched",
            ScenarioId::KillFallback => "Kill answers 404 and falls back to stop",
            ScenarioId::PlanEditing => "Seeded edit gestures; undo all restores empty, redo all restores final",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_stream" | "steadystream" | "dst-001" => Ok(ScenarioId::SteadyStream),
            "burst_overflow" | "burstoverflow" | "dst-002" => Ok(ScenarioId::BurstOverflow),
            "session_restart" | "sessionrestart" | "dst-003" => Ok(ScenarioId::SessionRestart),
            "duplicate_lines" | "duplicatelines" | "dst-004" => Ok(ScenarioId::DuplicateLines),
            "garbage_lines" | "garbagelines" | "dst-005" => Ok(ScenarioId::GarbageLines),
            "control_timeout" | "controltimeout" | "dst-006" => Ok(ScenarioId::ControlTimeout),
            "kill_fallback" | "killfallback" | "dst-007" => Ok(ScenarioId::KillFallback),
            "plan_editing" | "planediting" | "dst-008" => Ok(ScenarioId::PlanEditing),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
