//! Shared model types.

use serde::{Deserialize, Serialize};

/// Event published on the client's lock-loss channel when the watchdog
/// discovers that a lease it was renewing is no longer owned by this
/// process. Long-running holders subscribe to this to fence off work
/// instead of unknowingly continuing past lease loss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockLossEvent {
    /// Lock key whose lease was lost.
    pub key: String,
    /// Owner token the watchdog was renewing with.
    pub owner: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_loss_event_roundtrip() {
        let event = LockLossEvent {
            key: "orders".to_string(),
            owner: "client-1:7".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: LockLossEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
