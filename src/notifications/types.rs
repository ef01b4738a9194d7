/// Notification envelope: the wire format shared by producers, the queue and clients
///
/// Producers send `{"Type": <int>, "Payload": {...}, "ContextId": "..."}` with PascalCase
/// keys. Decoding reads the `Type` discriminant first and then parses the payload exactly
/// once into the typed variant that discriminant selects.
use crate::errors::{RelayError, RelayResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use std::fmt;

// =============================================================================
// PUSH TYPES
// =============================================================================

/// Closed set of notification kinds. Integer codes are part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushType {
    SyncCipherUpdate,
    SyncCipherCreate,
    SyncLoginDelete,
    SyncFolderDelete,
    SyncCiphers,
    SyncVault,
    SyncOrgKeys,
    SyncFolderCreate,
    SyncFolderUpdate,
    SyncCipherDelete,
    SyncSettings,
    LogOut,
    SyncSendCreate,
    SyncSendUpdate,
    SyncSendDelete,
    AuthRequest,
    AuthRequestResponse,
    SyncOrganizations,
    SyncOrganizationStatusChanged,
    SyncOrganizationCollectionSettingChanged,
    Notification,
    NotificationStatus,
    RefreshSecurityTasks,
}

/// Payload shape selected by a push type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Cipher,
    Folder,
    User,
    Send,
    AuthRequest,
    OrganizationStatus,
    OrganizationCollectionSettings,
    Notification,
}

impl PushType {
    pub const ALL: [PushType; 23] = [
        PushType::SyncCipherUpdate,
        PushType::SyncCipherCreate,
        PushType::SyncLoginDelete,
        PushType::SyncFolderDelete,
        PushType::SyncCiphers,
        PushType::SyncVault,
        PushType::SyncOrgKeys,
        PushType::SyncFolderCreate,
        PushType::SyncFolderUpdate,
        PushType::SyncCipherDelete,
        PushType::SyncSettings,
        PushType::LogOut,
        PushType::SyncSendCreate,
        PushType::SyncSendUpdate,
        PushType::SyncSendDelete,
        PushType::AuthRequest,
        PushType::AuthRequestResponse,
        PushType::SyncOrganizations,
        PushType::SyncOrganizationStatusChanged,
        PushType::SyncOrganizationCollectionSettingChanged,
        PushType::Notification,
        PushType::NotificationStatus,
        PushType::RefreshSecurityTasks,
    ];

    pub fn code(self) -> i64 {
        match self {
            PushType::SyncCipherUpdate => 0,
            PushType::SyncCipherCreate => 1,
            PushType::SyncLoginDelete => 2,
            PushType::SyncFolderDelete => 3,
            PushType::SyncCiphers => 4,
            PushType::SyncVault => 5,
            PushType::SyncOrgKeys => 6,
            PushType::SyncFolderCreate => 7,
            PushType::SyncFolderUpdate => 8,
            PushType::SyncCipherDelete => 9,
            PushType::SyncSettings => 10,
            PushType::LogOut => 11,
            PushType::SyncSendCreate => 12,
            PushType::SyncSendUpdate => 13,
            PushType::SyncSendDelete => 14,
            PushType::AuthRequest => 15,
            PushType::AuthRequestResponse => 16,
            PushType::SyncOrganizations => 17,
            PushType::SyncOrganizationStatusChanged => 18,
            PushType::SyncOrganizationCollectionSettingChanged => 19,
            PushType::Notification => 20,
            PushType::NotificationStatus => 21,
            PushType::RefreshSecurityTasks => 22,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        PushType::ALL.iter().copied().find(|t| t.code() == code)
    }

    pub fn payload_kind(self) -> PayloadKind {
        match self {
            PushType::SyncCipherUpdate
            | PushType::SyncCipherCreate
            | PushType::SyncLoginDelete
            | PushType::SyncCipherDelete => PayloadKind::Cipher,
            PushType::SyncFolderDelete | PushType::SyncFolderCreate | PushType::SyncFolderUpdate => {
                PayloadKind::Folder
            }
            PushType::SyncCiphers
            | PushType::SyncVault
            | PushType::SyncOrgKeys
            | PushType::SyncSettings
            | PushType::LogOut
            | PushType::SyncOrganizations
            | PushType::RefreshSecurityTasks => PayloadKind::User,
            PushType::SyncSendCreate | PushType::SyncSendUpdate | PushType::SyncSendDelete => {
                PayloadKind::Send
            }
            PushType::AuthRequest | PushType::AuthRequestResponse => PayloadKind::AuthRequest,
            PushType::SyncOrganizationStatusChanged => PayloadKind::OrganizationStatus,
            PushType::SyncOrganizationCollectionSettingChanged => {
                PayloadKind::OrganizationCollectionSettings
            }
            PushType::Notification | PushType::NotificationStatus => PayloadKind::Notification,
        }
    }
}

impl fmt::Display for PushType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

impl Serialize for PushType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

// =============================================================================
// CLIENT TYPE
// =============================================================================

/// Kind of client application a connection (or a notification) targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClientType {
    #[default]
    All,
    Web,
    Browser,
    Desktop,
    Mobile,
    Cli,
    DirectoryConnector,
}

impl ClientType {
    pub fn code(self) -> u8 {
        match self {
            ClientType::All => 0,
            ClientType::Web => 1,
            ClientType::Browser => 2,
            ClientType::Desktop => 3,
            ClientType::Mobile => 4,
            ClientType::Cli => 5,
            ClientType::DirectoryConnector => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ClientType::All),
            1 => Some(ClientType::Web),
            2 => Some(ClientType::Browser),
            3 => Some(ClientType::Desktop),
            4 => Some(ClientType::Mobile),
            5 => Some(ClientType::Cli),
            6 => Some(ClientType::DirectoryConnector),
            _ => None,
        }
    }

    /// `All` means "no particular client"; anything else narrows a group
    pub fn is_concrete(self) -> bool {
        self != ClientType::All
    }
}

impl Serialize for ClientType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ClientType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        ClientType::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown client type {}", code)))
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SyncCipherPayload {
    pub id: String,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub collection_ids: Option<Vec<String>>,
    pub revision_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SyncFolderPayload {
    pub id: String,
    pub user_id: Option<String>,
    pub revision_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserPayload {
    pub user_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SyncSendPayload {
    pub id: String,
    pub user_id: Option<String>,
    pub revision_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AuthRequestPayload {
    /// Auth request id; the anonymous pairing token for the response
    pub id: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OrganizationStatusPayload {
    pub organization_id: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OrganizationCollectionSettingsPayload {
    pub organization_id: Option<String>,
    pub limit_collection_creation: Option<bool>,
    pub limit_collection_deletion: Option<bool>,
    pub limit_item_deletion: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NotificationPayload {
    pub id: String,
    pub priority: Option<i32>,
    pub global: bool,
    pub client_type: ClientType,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub installation_id: Option<String>,
    pub task_id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub revision_date: Option<DateTime<Utc>>,
    pub read_date: Option<DateTime<Utc>>,
    pub deleted_date: Option<DateTime<Utc>>,
}

/// Typed payload, serialized without a tag (the envelope's `Type` carries it)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Cipher(SyncCipherPayload),
    Folder(SyncFolderPayload),
    User(UserPayload),
    Send(SyncSendPayload),
    AuthRequest(AuthRequestPayload),
    OrganizationStatus(OrganizationStatusPayload),
    OrganizationCollectionSettings(OrganizationCollectionSettingsPayload),
    Notification(NotificationPayload),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Cipher(_) => PayloadKind::Cipher,
            Payload::Folder(_) => PayloadKind::Folder,
            Payload::User(_) => PayloadKind::User,
            Payload::Send(_) => PayloadKind::Send,
            Payload::AuthRequest(_) => PayloadKind::AuthRequest,
            Payload::OrganizationStatus(_) => PayloadKind::OrganizationStatus,
            Payload::OrganizationCollectionSettings(_) => PayloadKind::OrganizationCollectionSettings,
            Payload::Notification(_) => PayloadKind::Notification,
        }
    }

    fn parse(kind: PayloadKind, raw: &RawValue) -> serde_json::Result<Self> {
        let json = raw.get();
        Ok(match kind {
            PayloadKind::Cipher => Payload::Cipher(serde_json::from_str(json)?),
            PayloadKind::Folder => Payload::Folder(serde_json::from_str(json)?),
            PayloadKind::User => Payload::User(serde_json::from_str(json)?),
            PayloadKind::Send => Payload::Send(serde_json::from_str(json)?),
            PayloadKind::AuthRequest => Payload::AuthRequest(serde_json::from_str(json)?),
            PayloadKind::OrganizationStatus => {
                Payload::OrganizationStatus(serde_json::from_str(json)?)
            }
            PayloadKind::OrganizationCollectionSettings => {
                Payload::OrganizationCollectionSettings(serde_json::from_str(json)?)
            }
            PayloadKind::Notification => Payload::Notification(serde_json::from_str(json)?),
        })
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEnvelope {
    #[serde(rename = "Type")]
    pub push_type: PushType,
    #[serde(rename = "Payload")]
    pub payload: Payload,
    /// Originating device, passed through so clients can ignore their own changes
    #[serde(rename = "ContextId", skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl NotificationEnvelope {
    /// Build an envelope, rejecting a payload that does not match the push type
    pub fn new(
        push_type: PushType,
        payload: Payload,
        context_id: Option<String>,
    ) -> RelayResult<Self> {
        if payload.kind() != push_type.payload_kind() {
            return Err(RelayError::decode(format!(
                "payload {:?} does not match {}",
                payload.kind(),
                push_type
            )));
        }
        Ok(Self {
            push_type,
            payload,
            context_id,
        })
    }

    pub fn to_json(&self) -> RelayResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Result of decoding a queue body or request body
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Known(NotificationEnvelope),
    /// Well-formed envelope whose `Type` is outside the known set
    Unknown {
        code: i64,
        context_id: Option<String>,
    },
}

#[derive(Deserialize)]
struct RawEnvelope<'a> {
    #[serde(rename = "Type")]
    push_type: i64,
    #[serde(rename = "Payload", borrow, default)]
    payload: Option<&'a RawValue>,
    #[serde(rename = "ContextId", default)]
    context_id: Option<String>,
}

/// Decode an envelope from raw bytes, unwrapping base64 when the body is not a JSON object
pub fn decode(body: &[u8]) -> RelayResult<Decoded> {
    let text = std::str::from_utf8(body)
        .map_err(|e| RelayError::decode(format!("body is not UTF-8: {}", e)))?;
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return decode_json(trimmed);
    }

    let bytes = STANDARD
        .decode(trimmed)
        .map_err(|e| RelayError::decode(format!("body is neither JSON nor base64: {}", e)))?;
    let inner = std::str::from_utf8(&bytes)
        .map_err(|e| RelayError::decode(format!("base64 body is not UTF-8: {}", e)))?;
    decode_json(inner.trim())
}

/// Decode an envelope from JSON text
pub fn decode_json(json: &str) -> RelayResult<Decoded> {
    let raw: RawEnvelope<'_> = serde_json::from_str(json)
        .map_err(|e| RelayError::decode(format!("malformed envelope: {}", e)))?;

    let push_type = match PushType::from_code(raw.push_type) {
        Some(push_type) => push_type,
        None => {
            return Ok(Decoded::Unknown {
                code: raw.push_type,
                context_id: raw.context_id,
            })
        }
    };

    let raw_payload = match raw.payload {
        Some(payload) if payload.get() != "null" => payload,
        _ => return Err(RelayError::decode(format!("{} has no payload", push_type))),
    };

    let payload = Payload::parse(push_type.payload_kind(), raw_payload)
        .map_err(|e| RelayError::decode(format!("invalid {} payload: {}", push_type, e)))?;

    Ok(Decoded::Known(NotificationEnvelope {
        push_type,
        payload,
        context_id: raw.context_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_type_codes_are_stable() {
        for (index, push_type) in PushType::ALL.iter().enumerate() {
            assert_eq!(push_type.code(), index as i64);
            assert_eq!(PushType::from_code(index as i64), Some(*push_type));
        }
        assert_eq!(PushType::from_code(23), None);
        assert_eq!(PushType::from_code(-1), None);
    }

    #[test]
    fn test_decode_cipher_envelope() {
        let body = br#"{"Type":1,"Payload":{"Id":"c1","UserId":"u1","RevisionDate":"2024-05-01T10:00:00Z","Extra":true},"ContextId":"device-7"}"#;
        let decoded = decode(body).unwrap();

        let Decoded::Known(envelope) = decoded else {
            panic!("expected known envelope");
        };
        assert_eq!(envelope.push_type, PushType::SyncCipherCreate);
        assert_eq!(envelope.context_id.as_deref(), Some("device-7"));
        match envelope.payload {
            Payload::Cipher(cipher) => {
                assert_eq!(cipher.id, "c1");
                assert_eq!(cipher.user_id.as_deref(), Some("u1"));
                assert!(cipher.organization_id.is_none());
                assert!(cipher.revision_date.is_some());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_decode_base64_body() {
        let json = r#"{"Type":11,"Payload":{"UserId":"u9"}}"#;
        let wrapped = STANDARD.encode(json);
        let decoded = decode(wrapped.as_bytes()).unwrap();

        let Decoded::Known(envelope) = decoded else {
            panic!("expected known envelope");
        };
        assert_eq!(envelope.push_type, PushType::LogOut);
        assert_eq!(
            envelope.payload,
            Payload::User(UserPayload {
                user_id: Some("u9".to_string()),
                date: None
            })
        );
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let decoded = decode(br#"{"Type":999,"Payload":{"Anything":1}}"#).unwrap();
        assert_eq!(
            decoded,
            Decoded::Unknown {
                code: 999,
                context_id: None
            }
        );
    }

    #[test]
    fn test_decode_failures() {
        assert!(decode(b"not json at all!").is_err());
        assert!(decode(br#"{"Payload":{}}"#).is_err());
        assert!(decode(br#"{"Type":0}"#).is_err());
        assert!(decode(br#"{"Type":0,"Payload":null}"#).is_err());
        assert!(decode(br#"{"Type":0,"Payload":{"Id":42}}"#).is_err());
        assert!(decode(br#"{"Type":20,"Payload":{"ClientType":99}}"#).is_err());
    }

    #[test]
    fn test_envelope_serializes_pascal_case() {
        let envelope = NotificationEnvelope::new(
            PushType::SyncFolderUpdate,
            Payload::Folder(SyncFolderPayload {
                id: "f1".to_string(),
                user_id: Some("u1".to_string()),
                revision_date: None,
            }),
            None,
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(value["Type"], 8);
        assert_eq!(value["Payload"]["Id"], "f1");
        assert_eq!(value["Payload"]["UserId"], "u1");
        assert!(value.get("ContextId").is_none());
    }

    #[test]
    fn test_envelope_rejects_mismatched_payload() {
        let result = NotificationEnvelope::new(
            PushType::LogOut,
            Payload::Send(SyncSendPayload::default()),
            None,
        );
        assert!(result.is_err());
    }
}
