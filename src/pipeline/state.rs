#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpLifecycle {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl PumpLifecycle {
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

pub fn can_transition(from: PumpLifecycle, to: PumpLifecycle) -> bool {
    matches!(
        (from, to),
        (PumpLifecycle::Idle, PumpLifecycle::Starting)
            | (PumpLifecycle::Starting, PumpLifecycle::Running)
            | (PumpLifecycle::Starting, PumpLifecycle::Idle)
            | (PumpLifecycle::Running, PumpLifecycle::Stopping)
            | (PumpLifecycle::Stopping, PumpLifecycle::Idle)
    ) || from == to
}
