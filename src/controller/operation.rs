//! The operation token held for the duration of a lifecycle sequence.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::model::InstanceState;

/// Which lifecycle sequence holds the token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationKind {
    /// Start sequence.
    Start,
    /// Stop sequence.
    Stop,
    /// Restart sequence.
    Restart,
}

impl OperationKind {
    /// State reported while this operation is in flight.
    #[must_use]
    pub const fn transitional_state(self) -> InstanceState {
        match self {
            Self::Start => InstanceState::Starting,
            Self::Stop => InstanceState::Stopping,
            Self::Restart => InstanceState::Running,
        }
    }
}

/// Exclusive claim on the controller. Dropping it releases the token and
/// clears the in-flight marker, on every exit path.
#[derive(Debug)]
pub struct LifecycleOperation {
    id: Uuid,
    kind: OperationKind,
    in_flight: Arc<Mutex<Option<OperationKind>>>,
    _guard: OwnedMutexGuard<()>,
}

impl LifecycleOperation {
    /// Tries to take the token without waiting.
    pub(crate) fn acquire(
        kind: OperationKind,
        token: &Arc<tokio::sync::Mutex<()>>,
        in_flight: &Arc<Mutex<Option<OperationKind>>>,
    ) -> Option<Self> {
        let guard = Arc::clone(token).try_lock_owned().ok()?;
        *in_flight.lock().unwrap_or_else(PoisonError::into_inner) = Some(kind);
        Some(Self {
            id: Uuid::new_v4(),
            kind,
            in_flight: Arc::clone(in_flight),
            _guard: guard,
        })
    }

    /// Correlation id for log lines.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Which sequence this is.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Drop for LifecycleOperation {
    fn drop(&mut self) {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
