//! Availability of the model server as seen by the client.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LifecycleStatus {
    #[default]
    Offline,
    Starting,
    Online,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    StartRequested,
    StartSucceeded,
    StartFailed,
}

impl LifecycleStatus {
    /// Next status after `event`. Completions apply from any state, so the
    /// last start to finish decides the outcome.
    pub fn transition(self, event: LifecycleEvent) -> Self {
        match event {
            LifecycleEvent::StartRequested => LifecycleStatus::Starting,
            LifecycleEvent::StartSucceeded => LifecycleStatus::Online,
            LifecycleEvent::StartFailed => LifecycleStatus::Error,
        }
    }

    pub fn can_send(self) -> bool {
        matches!(self, LifecycleStatus::Online)
    }

    pub fn can_start(self) -> bool {
        matches!(self, LifecycleStatus::Offline | LifecycleStatus::Error)
    }

    pub fn label(self) -> &'static str {
        match self {
            LifecycleStatus::Offline => "Model not started.",
            LifecycleStatus::Starting => "Starting model, please wait…",
            LifecycleStatus::Online => "Model ready. You can now ask questions.",
            LifecycleStatus::Error => "Model failed to start.",
        }
    }
}
