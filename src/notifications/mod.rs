//! Notification envelopes and their routing to hubs

pub mod router;
pub mod types;

pub use router::{resolve, Delivery, NotificationRouter, RelayOutcome, RoutingSkip};
pub use types::{
    decode, decode_json, AuthRequestPayload, ClientType, Decoded, NotificationEnvelope,
    NotificationPayload, OrganizationCollectionSettingsPayload, OrganizationStatusPayload,
    Payload, PayloadKind, PushType, SyncCipherPayload, SyncFolderPayload, SyncSendPayload,
    UserPayload,
};
