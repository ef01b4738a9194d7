/// The send capability shared by every hub
use super::message::Frame;
use crate::errors::RelayResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which hub a send targets (also used to route backplane traffic)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubKind {
    Authenticated,
    Anonymous,
}

impl fmt::Display for HubKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubKind::Authenticated => write!(f, "hub"),
            HubKind::Anonymous => write!(f, "anonymous-hub"),
        }
    }
}

/// Addressing of one send
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum Scope {
    User(String),
    Group(String),
    Broadcast,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::User(user_id) => write!(f, "user {}", user_id),
            Scope::Group(group) => write!(f, "group {}", group),
            Scope::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// Local fan-out outcome of a single send
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Frames queued onto connection channels
    pub delivered: usize,
    /// Connections skipped because their queue was full
    pub dropped: usize,
    /// Connections removed because their queue was closed
    pub evicted: usize,
}

#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    fn kind(&self) -> HubKind;

    async fn send(&self, scope: Scope, frame: Frame) -> RelayResult<DeliveryReport>;

    async fn send_to_user(&self, user_id: &str, frame: Frame) -> RelayResult<DeliveryReport> {
        self.send(Scope::User(user_id.to_string()), frame).await
    }

    async fn send_to_group(&self, group: &str, frame: Frame) -> RelayResult<DeliveryReport> {
        self.send(Scope::Group(group.to_string()), frame).await
    }

    async fn broadcast(&self, frame: Frame) -> RelayResult<DeliveryReport> {
        self.send(Scope::Broadcast, frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_wire_format() {
        let json = serde_json::to_string(&Scope::Group("org:o1".to_string())).unwrap();
        assert_eq!(json, r#"{"kind":"group","target":"org:o1"}"#);

        let parsed: Scope = serde_json::from_str(r#"{"kind":"broadcast"}"#).unwrap();
        assert_eq!(parsed, Scope::Broadcast);
    }
}
