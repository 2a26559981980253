use crate::error::SpiderError;
use serde::Serialize;
use std::fmt;

/// Lifecycle state of a [`Scheduler`](super::Scheduler).
///
/// ```text
/// Uninitialized --init-->  Initializing --ok--> Initialized
/// Initialized   --start--> Starting     --ok--> Started
/// Started       --stop-->  Stopping     --ok--> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Uninitialized,
    Initializing,
    Initialized,
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::Uninitialized,
        Status::Initializing,
        Status::Initialized,
        Status::Starting,
        Status::Started,
        Status::Stopping,
        Status::Stopped,
    ];

    pub fn description(self) -> &'static str {
        match self {
            Status::Uninitialized => "uninitialized",
            Status::Initializing => "initializing",
            Status::Initialized => "initialized",
            Status::Starting => "starting",
            Status::Started => "started",
            Status::Stopping => "stopping",
            Status::Stopped => "stopped",
        }
    }

    /// Whether a lifecycle operation is currently running.
    pub fn is_transitional(self) -> bool {
        matches!(self, Status::Initializing | Status::Starting | Status::Stopping)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Decides whether the scheduler may move from `current` into `wanted`.
///
/// `wanted` must be one of the transitional states. Nothing may change while
/// a transition is in progress; `Starting` needs a prior initialization and
/// no running crawl; `Initializing` is refused while started; `Stopping`
/// needs a running crawl.
pub(crate) fn check_status(current: Status, wanted: Status) -> Result<(), SpiderError> {
    match current {
        Status::Initializing => {
            return Err(SpiderError::scheduler("the scheduler is being initialized"))
        }
        Status::Starting => return Err(SpiderError::scheduler("the scheduler is being started")),
        Status::Stopping => return Err(SpiderError::scheduler("the scheduler is being stopped")),
        _ => {}
    }

    match wanted {
        Status::Initializing if current == Status::Started => {
            Err(SpiderError::scheduler("the scheduler has been started"))
        }
        Status::Initializing => Ok(()),
        Status::Starting if current == Status::Uninitialized => {
            Err(SpiderError::scheduler("the scheduler has not been initialized"))
        }
        Status::Starting if current == Status::Started => {
            Err(SpiderError::scheduler("the scheduler has been started"))
        }
        Status::Starting => Ok(()),
        Status::Stopping if current != Status::Started => {
            Err(SpiderError::scheduler("the scheduler has not been started"))
        }
        Status::Stopping => Ok(()),
        other => Err(SpiderError::scheduler(format!(
            "unsupported wanted status for check: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Status::*;

    fn allowed(current: Status, wanted: Status) -> bool {
        match wanted {
            Initializing => matches!(current, Uninitialized | Initialized | Stopped),
            Starting => matches!(current, Initialized | Stopped),
            Stopping => current == Started,
            _ => false,
        }
    }

    #[test]
    fn transition_table_is_total() {
        for current in Status::ALL {
            for wanted in Status::ALL {
                let result = check_status(current, wanted);
                assert_eq!(
                    result.is_ok(),
                    allowed(current, wanted),
                    "{} -> {}",
                    current,
                    wanted
                );
                if let Err(e) = result {
                    assert!(e.as_crawler_error().is_some());
                }
            }
        }
    }

    #[test]
    fn busy_states_refuse_everything() {
        for busy in [Initializing, Starting, Stopping] {
            let err = check_status(busy, Stopping).unwrap_err();
            assert!(err.to_string().contains("the scheduler is being"));
        }
    }
}
