/// Connection registry
///
/// A `Hub` owns the live connections of one endpoint and their group memberships.
/// It manages:
/// - Per-connection bounded outbound queues (non-blocking fan-out)
/// - User index and group index, updated atomically with the connection table
/// - The process-wide connection counter and hub-level metrics
/// - Mirroring sends to the backplane when one is attached
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::{
    arguments::is_debug_hub_enabled,
    backplane::{Backplane, BackplaneMessage},
    errors::RelayResult,
    logger::{self, LogTag},
};

use super::counter::{global_counter, ConnectionCounter};
use super::identity::Principal;
use super::message::Frame;
use super::metrics::HubMetrics;
use super::policy::{AnonymousMembership, AuthenticatedMembership, MembershipPolicy};
use super::registry::{ConnectionRegistry, DeliveryReport, HubKind, Scope};

pub type ConnectionId = u64;

pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Construction options shared by both hub flavours
#[derive(Clone)]
pub struct HubOptions {
    pub buffer_size: usize,
    pub counter: Arc<ConnectionCounter>,
    pub backplane: Option<Arc<dyn Backplane>>,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            counter: global_counter(),
            backplane: None,
        }
    }
}

/// Returned to the connection task on registration
#[derive(Debug)]
pub struct Registration {
    pub id: ConnectionId,
    pub receiver: mpsc::Receiver<Frame>,
    pub groups: Vec<String>,
}

struct ConnectionEntry {
    sender: mpsc::Sender<Frame>,
    user_id: Option<String>,
    groups: Vec<String>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    users: HashMap<String, HashSet<ConnectionId>>,
    groups: HashMap<String, HashSet<ConnectionId>>,
}

impl HubState {
    fn targets(&self, scope: &Scope) -> Vec<ConnectionId> {
        match scope {
            Scope::User(user_id) => self
                .users
                .get(user_id)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default(),
            Scope::Group(group) => self
                .groups
                .get(group)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default(),
            Scope::Broadcast => self.connections.keys().copied().collect(),
        }
    }

    /// Remove a connection and every index entry pointing at it
    fn remove(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.connections.remove(&id)?;
        if let Some(user_id) = &entry.user_id {
            remove_from_index(&mut self.users, user_id, id);
        }
        for group in &entry.groups {
            remove_from_index(&mut self.groups, group, id);
        }
        Some(entry)
    }
}

fn remove_from_index(index: &mut HashMap<String, HashSet<ConnectionId>>, key: &str, id: ConnectionId) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

pub struct Hub {
    kind: HubKind,
    policy: Box<dyn MembershipPolicy>,
    state: RwLock<HubState>,
    next_conn_id: AtomicU64,
    buffer_size: usize,
    counter: Arc<ConnectionCounter>,
    metrics: Arc<HubMetrics>,
    backplane: Option<Arc<dyn Backplane>>,
}

impl Hub {
    pub fn new(kind: HubKind, policy: Box<dyn MembershipPolicy>, options: HubOptions) -> Arc<Self> {
        Arc::new(Self {
            kind,
            policy,
            state: RwLock::new(HubState::default()),
            next_conn_id: AtomicU64::new(1),
            buffer_size: options.buffer_size.max(1),
            counter: options.counter,
            metrics: HubMetrics::new(),
            backplane: options.backplane,
        })
    }

    /// Hub for authenticated identities (`/hub`)
    pub fn authenticated(installation_id: Option<String>, options: HubOptions) -> Arc<Self> {
        Self::new(
            HubKind::Authenticated,
            Box::new(AuthenticatedMembership::new(installation_id)),
            options,
        )
    }

    /// Hub for anonymous pairing sessions (`/anonymous-hub`)
    pub fn anonymous(options: HubOptions) -> Arc<Self> {
        Self::new(HubKind::Anonymous, Box::new(AnonymousMembership), options)
    }

    /// Register a connection, applying all of its memberships at once
    pub fn register(&self, principal: &Principal) -> RelayResult<Registration> {
        let memberships = self.policy.memberships(principal)?;
        let id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.buffer_size);

        {
            let mut state = self.state.write();
            if let Some(user_id) = &memberships.user_id {
                state.users.entry(user_id.clone()).or_default().insert(id);
            }
            for group in &memberships.groups {
                state.groups.entry(group.clone()).or_default().insert(id);
            }
            state.connections.insert(
                id,
                ConnectionEntry {
                    sender: tx,
                    user_id: memberships.user_id.clone(),
                    groups: memberships.groups.clone(),
                },
            );
        }

        self.metrics.connection_opened();
        let active = self.counter.increment();

        if is_debug_hub_enabled() {
            logger::debug(
                LogTag::Hub,
                &format!(
                    "{} ({}): connection {} registered (groups={}, active={})",
                    self.kind,
                    self.policy.name(),
                    id,
                    memberships.groups.len(),
                    active
                ),
            );
        }

        Ok(Registration {
            id,
            receiver: rx,
            groups: memberships.groups,
        })
    }

    /// Remove a connection and all of its memberships; repeated calls are no-ops
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.state.write().remove(id).is_some();
        if removed {
            self.metrics.connection_closed();
            let active = self.counter.decrement();
            if is_debug_hub_enabled() {
                logger::debug(
                    LogTag::Hub,
                    &format!("{}: connection {} unregistered (active={})", self.kind, id, active),
                );
            }
        }
        removed
    }

    /// Fan a frame out to matching local connections only
    pub fn deliver_local(&self, scope: &Scope, frame: &Frame) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut closed = Vec::new();

        {
            let state = self.state.read();
            for id in state.targets(scope) {
                let Some(entry) = state.connections.get(&id) else {
                    continue;
                };
                match entry.sender.try_send(frame.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        report.dropped += 1;
                        if is_debug_hub_enabled() {
                            logger::debug(
                                LogTag::Hub,
                                &format!("{}: frame dropped for connection {} (queue full)", self.kind, id),
                            );
                        }
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
                }
            }
        }

        for id in closed {
            if self.unregister(id) {
                report.evicted += 1;
            }
        }

        self.metrics.frames_sent(report.delivered as u64);
        self.metrics.frames_dropped(report.dropped as u64);
        self.metrics.connections_evicted(report.evicted as u64);

        if is_debug_hub_enabled() {
            logger::debug(
                LogTag::Hub,
                &format!(
                    "{}: {} (delivered={}, dropped={}, evicted={})",
                    self.kind, scope, report.delivered, report.dropped, report.evicted
                ),
            );
        }

        report
    }

    /// Apply a send that originated on another instance
    pub fn apply_remote(&self, scope: &Scope, frame: &Frame) -> DeliveryReport {
        self.metrics.remote_send();
        self.deliver_local(scope, frame)
    }

    pub fn kind(&self) -> HubKind {
        self.kind
    }

    pub fn metrics(&self) -> Arc<HubMetrics> {
        self.metrics.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.state.read().connections.len()
    }

    pub fn group_size(&self, group: &str) -> usize {
        self.state.read().groups.get(group).map_or(0, HashSet::len)
    }

    pub fn user_connection_count(&self, user_id: &str) -> usize {
        self.state.read().users.get(user_id).map_or(0, HashSet::len)
    }
}

#[async_trait]
impl ConnectionRegistry for Hub {
    fn kind(&self) -> HubKind {
        self.kind
    }

    async fn send(&self, scope: Scope, frame: Frame) -> RelayResult<DeliveryReport> {
        let report = self.deliver_local(&scope, &frame);

        if let Some(backplane) = &self.backplane {
            let message = BackplaneMessage::new(
                backplane.instance_id().to_string(),
                self.kind,
                scope,
                frame.to_string(),
            );
            backplane.publish(message).await?;
        }

        Ok(report)
    }
}
