/// Notification router
///
/// `resolve` is a pure mapping from an envelope to the sends it requires. The
/// `NotificationRouter` serializes each client frame once and hands it to the hubs.
use super::types::{ClientType, Decoded, NotificationEnvelope, Payload, PushType};
use crate::arguments::is_debug_router_enabled;
use crate::errors::{RelayError, RelayResult};
use crate::hub::{groups, ClientMethod, ConnectionRegistry, Frame, HubKind, Scope, ServerMessage};
use crate::logger::{self, LogTag};
use std::fmt;
use std::sync::Arc;

/// One hub send required by an envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub hub: HubKind,
    pub scope: Scope,
    pub method: ClientMethod,
}

impl Delivery {
    fn authenticated(scope: Scope) -> Self {
        Self {
            hub: HubKind::Authenticated,
            scope,
            method: ClientMethod::ReceiveMessage,
        }
    }
}

/// Why an envelope produced no sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingSkip {
    /// None of the fields that scope this push type were present
    MissingScope(PushType),
    /// Cipher payload carried both `UserId` and `OrganizationId`
    ConflictingScope(PushType),
}

impl fmt::Display for RoutingSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingSkip::MissingScope(push_type) => {
                write!(f, "{} has no scoping field", push_type)
            }
            RoutingSkip::ConflictingScope(push_type) => {
                write!(f, "{} carries both UserId and OrganizationId", push_type)
            }
        }
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn user_only(push_type: PushType, user_id: &Option<String>) -> Result<Vec<Delivery>, RoutingSkip> {
    match present(user_id) {
        Some(user_id) => Ok(vec![Delivery::authenticated(Scope::User(user_id.to_string()))]),
        None => Err(RoutingSkip::MissingScope(push_type)),
    }
}

fn organization_only(
    push_type: PushType,
    organization_id: &Option<String>,
) -> Result<Vec<Delivery>, RoutingSkip> {
    match present(organization_id) {
        Some(org) => Ok(vec![Delivery::authenticated(Scope::Group(groups::organization(org)))]),
        None => Err(RoutingSkip::MissingScope(push_type)),
    }
}

/// Map an envelope to the sends it requires
pub fn resolve(envelope: &NotificationEnvelope) -> Result<Vec<Delivery>, RoutingSkip> {
    let push_type = envelope.push_type;

    match &envelope.payload {
        Payload::Cipher(cipher) => {
            match (present(&cipher.user_id), present(&cipher.organization_id)) {
                (Some(user_id), None) => Ok(vec![Delivery::authenticated(Scope::User(
                    user_id.to_string(),
                ))]),
                (None, Some(org)) => Ok(vec![Delivery::authenticated(Scope::Group(
                    groups::organization(org),
                ))]),
                (Some(_), Some(_)) => Err(RoutingSkip::ConflictingScope(push_type)),
                (None, None) => Err(RoutingSkip::MissingScope(push_type)),
            }
        }
        Payload::Folder(folder) => user_only(push_type, &folder.user_id),
        Payload::User(user) => user_only(push_type, &user.user_id),
        Payload::Send(send) => user_only(push_type, &send.user_id),
        Payload::AuthRequest(request) => {
            let mut deliveries = Vec::new();
            if let Some(user_id) = present(&request.user_id) {
                deliveries.push(Delivery::authenticated(Scope::User(user_id.to_string())));
            }
            if push_type == PushType::AuthRequestResponse {
                let request_id = request.id.trim();
                if !request_id.is_empty() {
                    deliveries.push(Delivery {
                        hub: HubKind::Anonymous,
                        scope: Scope::Group(groups::token(request_id)),
                        method: ClientMethod::AuthRequestResponseReceived,
                    });
                }
            }
            if deliveries.is_empty() {
                Err(RoutingSkip::MissingScope(push_type))
            } else {
                Ok(deliveries)
            }
        }
        Payload::OrganizationStatus(status) => organization_only(push_type, &status.organization_id),
        Payload::OrganizationCollectionSettings(settings) => {
            organization_only(push_type, &settings.organization_id)
        }
        Payload::Notification(notification) => {
            let client_type = notification.client_type;
            let scope = if let Some(installation) = present(&notification.installation_id) {
                Scope::Group(match client_type {
                    ClientType::All => groups::installation(installation),
                    concrete => groups::installation_client(installation, concrete),
                })
            } else if let Some(user_id) = present(&notification.user_id) {
                match client_type {
                    ClientType::All => Scope::User(user_id.to_string()),
                    concrete => Scope::Group(groups::user_client(user_id, concrete)),
                }
            } else if let Some(org) = present(&notification.organization_id) {
                Scope::Group(match client_type {
                    ClientType::All => groups::organization(org),
                    concrete => groups::organization_client(org, concrete),
                })
            } else {
                return Err(RoutingSkip::MissingScope(push_type));
            };
            Ok(vec![Delivery::authenticated(scope)])
        }
    }
}

/// Result of relaying one envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Sends were issued; `connections` counts local deliveries
    Delivered { sends: usize, connections: usize },
    /// Nothing to send for this envelope
    Skipped(RoutingSkip),
    /// `Type` outside the known set
    Unknown { code: i64 },
}

/// Dispatches envelopes to the authenticated and anonymous hubs
#[derive(Clone)]
pub struct NotificationRouter {
    hub: Arc<dyn ConnectionRegistry>,
    anonymous_hub: Arc<dyn ConnectionRegistry>,
}

impl NotificationRouter {
    pub fn new(hub: Arc<dyn ConnectionRegistry>, anonymous_hub: Arc<dyn ConnectionRegistry>) -> Self {
        Self { hub, anonymous_hub }
    }

    fn registry(&self, kind: HubKind) -> &Arc<dyn ConnectionRegistry> {
        match kind {
            HubKind::Authenticated => &self.hub,
            HubKind::Anonymous => &self.anonymous_hub,
        }
    }

    /// Decode a raw body and relay it
    pub async fn relay_raw(&self, body: &[u8]) -> RelayResult<RelayOutcome> {
        let decoded = super::types::decode(body)?;
        self.relay_decoded(decoded).await
    }

    pub async fn relay_decoded(&self, decoded: Decoded) -> RelayResult<RelayOutcome> {
        match decoded {
            Decoded::Known(envelope) => self.relay(&envelope).await,
            Decoded::Unknown { code, .. } => {
                logger::warning(
                    LogTag::Router,
                    &format!("Ignoring notification with unknown type {}", code),
                );
                Ok(RelayOutcome::Unknown { code })
            }
        }
    }

    /// Relay an envelope to every connection it targets.
    ///
    /// All sends are attempted; the first failure is returned afterwards.
    pub async fn relay(&self, envelope: &NotificationEnvelope) -> RelayResult<RelayOutcome> {
        let deliveries = match resolve(envelope) {
            Ok(deliveries) => deliveries,
            Err(skip) => {
                logger::warning(LogTag::Router, &format!("Not relaying: {}", skip));
                return Ok(RelayOutcome::Skipped(skip));
            }
        };

        let mut receive_frame: Option<Frame> = None;
        let mut auth_response_frame: Option<Frame> = None;
        let mut first_error: Option<RelayError> = None;
        let mut connections = 0;

        for delivery in &deliveries {
            let slot = match delivery.method {
                ClientMethod::ReceiveMessage => &mut receive_frame,
                ClientMethod::AuthRequestResponseReceived => &mut auth_response_frame,
            };
            let frame = match slot.clone() {
                Some(frame) => frame,
                None => {
                    let frame = ServerMessage::notification(delivery.method, envelope.clone())
                        .to_frame()?;
                    *slot = Some(frame.clone());
                    frame
                }
            };

            match self
                .registry(delivery.hub)
                .send(delivery.scope.clone(), frame)
                .await
            {
                Ok(report) => connections += report.delivered,
                Err(e) => {
                    logger::error(
                        LogTag::Router,
                        &format!(
                            "Send of {} to {} on {} failed: {}",
                            envelope.push_type, delivery.scope, delivery.hub, e
                        ),
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        if is_debug_router_enabled() {
            logger::debug(
                LogTag::Router,
                &format!(
                    "Relayed {} via {} send(s) to {} local connection(s)",
                    envelope.push_type,
                    deliveries.len(),
                    connections
                ),
            );
        }

        Ok(RelayOutcome::Delivered {
            sends: deliveries.len(),
            connections,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hub::DeliveryReport;
    use crate::notifications::types::{
        AuthRequestPayload, NotificationPayload, OrganizationStatusPayload, SyncCipherPayload,
        SyncFolderPayload, UserPayload,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records every send instead of delivering it
    pub(crate) struct RecordingRegistry {
        kind: HubKind,
        pub sends: Mutex<Vec<(Scope, String)>>,
        pub fail: bool,
    }

    impl RecordingRegistry {
        pub(crate) fn new(kind: HubKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                sends: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        pub(crate) fn failing(kind: HubKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                sends: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        pub(crate) fn scopes(&self) -> Vec<Scope> {
            self.sends.lock().iter().map(|(scope, _)| scope.clone()).collect()
        }
    }

    #[async_trait]
    impl ConnectionRegistry for RecordingRegistry {
        fn kind(&self) -> HubKind {
            self.kind
        }

        async fn send(&self, scope: Scope, frame: Frame) -> RelayResult<DeliveryReport> {
            if self.fail {
                return Err(RelayError::Transport("registry unavailable".to_string()));
            }
            self.sends.lock().push((scope, frame.to_string()));
            Ok(DeliveryReport {
                delivered: 1,
                ..DeliveryReport::default()
            })
        }
    }

    fn envelope(push_type: PushType, payload: Payload) -> NotificationEnvelope {
        NotificationEnvelope::new(push_type, payload, None).unwrap()
    }

    fn cipher(user: Option<&str>, org: Option<&str>) -> Payload {
        Payload::Cipher(SyncCipherPayload {
            id: "c1".to_string(),
            user_id: user.map(String::from),
            organization_id: org.map(String::from),
            ..SyncCipherPayload::default()
        })
    }

    fn user(push_type: PushType, user_id: &str) -> NotificationEnvelope {
        envelope(
            push_type,
            Payload::User(UserPayload {
                user_id: Some(user_id.to_string()),
                date: None,
            }),
        )
    }

    #[test]
    fn test_user_scoped_types_target_the_user() {
        for push_type in [
            PushType::SyncCiphers,
            PushType::SyncVault,
            PushType::SyncOrgKeys,
            PushType::SyncSettings,
            PushType::LogOut,
            PushType::SyncOrganizations,
            PushType::RefreshSecurityTasks,
        ] {
            let deliveries = resolve(&user(push_type, "u1")).unwrap();
            assert_eq!(
                deliveries,
                vec![Delivery::authenticated(Scope::User("u1".to_string()))]
            );
        }

        let folder = envelope(
            PushType::SyncFolderCreate,
            Payload::Folder(SyncFolderPayload {
                id: "f".to_string(),
                user_id: Some("u1".to_string()),
                revision_date: None,
            }),
        );
        assert_eq!(resolve(&folder).unwrap()[0].scope, Scope::User("u1".to_string()));
    }

    #[test]
    fn test_cipher_scoping() {
        let by_user = envelope(PushType::SyncCipherUpdate, cipher(Some("u1"), None));
        assert_eq!(resolve(&by_user).unwrap()[0].scope, Scope::User("u1".to_string()));

        let by_org = envelope(PushType::SyncCipherDelete, cipher(None, Some("o1")));
        assert_eq!(
            resolve(&by_org).unwrap(),
            vec![Delivery::authenticated(Scope::Group("org:o1".to_string()))]
        );

        let both = envelope(PushType::SyncLoginDelete, cipher(Some("u1"), Some("o1")));
        assert_eq!(
            resolve(&both),
            Err(RoutingSkip::ConflictingScope(PushType::SyncLoginDelete))
        );

        let neither = envelope(PushType::SyncCipherCreate, cipher(Some(" "), None));
        assert_eq!(
            resolve(&neither),
            Err(RoutingSkip::MissingScope(PushType::SyncCipherCreate))
        );
    }

    #[test]
    fn test_auth_request_response_reaches_both_hubs() {
        let response = envelope(
            PushType::AuthRequestResponse,
            Payload::AuthRequest(AuthRequestPayload {
                id: "req-1".to_string(),
                user_id: Some("u1".to_string()),
            }),
        );
        let deliveries = resolve(&response).unwrap();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0], Delivery::authenticated(Scope::User("u1".to_string())));
        assert_eq!(
            deliveries[1],
            Delivery {
                hub: HubKind::Anonymous,
                scope: Scope::Group("token:req-1".to_string()),
                method: ClientMethod::AuthRequestResponseReceived,
            }
        );

        let request = envelope(
            PushType::AuthRequest,
            Payload::AuthRequest(AuthRequestPayload {
                id: "req-2".to_string(),
                user_id: Some("u1".to_string()),
            }),
        );
        assert_eq!(resolve(&request).unwrap().len(), 1);
    }

    #[test]
    fn test_organization_status_targets_org_group() {
        let status = envelope(
            PushType::SyncOrganizationStatusChanged,
            Payload::OrganizationStatus(OrganizationStatusPayload {
                organization_id: Some("o7".to_string()),
                enabled: false,
            }),
        );
        assert_eq!(resolve(&status).unwrap()[0].scope, Scope::Group("org:o7".to_string()));
    }

    #[test]
    fn test_notification_precedence() {
        let notification = |installation: Option<&str>, user: Option<&str>, org: Option<&str>, ct| {
            envelope(
                PushType::Notification,
                Payload::Notification(NotificationPayload {
                    id: "n1".to_string(),
                    client_type: ct,
                    installation_id: installation.map(String::from),
                    user_id: user.map(String::from),
                    organization_id: org.map(String::from),
                    ..NotificationPayload::default()
                }),
            )
        };

        let all = resolve(&notification(Some("i1"), Some("u1"), Some("o1"), ClientType::All)).unwrap();
        assert_eq!(all[0].scope, Scope::Group("installation:i1".to_string()));

        let user_web = resolve(&notification(None, Some("u1"), Some("o1"), ClientType::Web)).unwrap();
        assert_eq!(user_web[0].scope, Scope::Group("user_client:u1:1".to_string()));

        let user_all = resolve(&notification(None, Some("u1"), None, ClientType::All)).unwrap();
        assert_eq!(user_all[0].scope, Scope::User("u1".to_string()));

        let org_mobile = resolve(&notification(None, None, Some("o1"), ClientType::Mobile)).unwrap();
        assert_eq!(org_mobile[0].scope, Scope::Group("org_client:o1:4".to_string()));

        assert!(resolve(&notification(None, None, None, ClientType::All)).is_err());
    }

    #[tokio::test]
    async fn test_router_sends_frames_to_each_hub() {
        let hub = RecordingRegistry::new(HubKind::Authenticated);
        let anonymous = RecordingRegistry::new(HubKind::Anonymous);
        let router = NotificationRouter::new(hub.clone(), anonymous.clone());

        let outcome = router
            .relay_raw(br#"{"Type":16,"Payload":{"Id":"req-1","UserId":"u1"},"ContextId":"d1"}"#)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::Delivered {
                sends: 2,
                connections: 2
            }
        );

        let hub_sends = hub.sends.lock().clone();
        assert_eq!(hub_sends.len(), 1);
        assert!(hub_sends[0].1.contains(r#""type":"receive_message""#));
        assert!(hub_sends[0].1.contains(r#""ContextId":"d1""#));

        let anonymous_sends = anonymous.sends.lock().clone();
        assert_eq!(anonymous_sends[0].0, Scope::Group("token:req-1".to_string()));
        assert!(anonymous_sends[0].1.contains(r#""type":"auth_request_response_received""#));
    }

    #[tokio::test]
    async fn test_unknown_type_makes_no_hub_calls() {
        let hub = RecordingRegistry::new(HubKind::Authenticated);
        let anonymous = RecordingRegistry::new(HubKind::Anonymous);
        let router = NotificationRouter::new(hub.clone(), anonymous.clone());

        let outcome = router
            .relay_raw(br#"{"Type":404,"Payload":{"UserId":"u1"}}"#)
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Unknown { code: 404 });
        assert!(hub.scopes().is_empty());
        assert!(anonymous.scopes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_scope_is_skipped_not_failed() {
        let hub = RecordingRegistry::new(HubKind::Authenticated);
        let router = NotificationRouter::new(hub.clone(), RecordingRegistry::new(HubKind::Anonymous));

        let outcome = router
            .relay_raw(br#"{"Type":5,"Payload":{}}"#)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::Skipped(RoutingSkip::MissingScope(PushType::SyncVault))
        );
        assert!(hub.scopes().is_empty());
    }

    #[tokio::test]
    async fn test_registry_failure_is_returned() {
        let router = NotificationRouter::new(
            RecordingRegistry::failing(HubKind::Authenticated),
            RecordingRegistry::new(HubKind::Anonymous),
        );
        let result = router.relay(&user(PushType::LogOut, "u1")).await;
        assert!(matches!(result, Err(RelayError::Transport(_))));
    }
}
