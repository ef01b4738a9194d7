/// Who is on the other end of a connection
///
/// An authenticated `Identity` is validated upstream and handed to the relay at
/// connect time; the hub never rebuilds or mutates it.
use crate::errors::{RelayError, RelayResult};
use crate::notifications::ClientType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationRole {
    Owner,
    Admin,
    User,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMembership {
    pub id: String,
    pub role: OrganizationRole,
}

impl OrganizationMembership {
    pub fn new(id: impl Into<String>, role: OrganizationRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Authenticated principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    user_id: String,
    #[serde(default)]
    client_type: ClientType,
    #[serde(default)]
    organizations: Vec<OrganizationMembership>,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        client_type: ClientType,
        organizations: Vec<OrganizationMembership>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            client_type,
            organizations,
        }
    }

    /// Decode the JSON identity a trusted gateway forwards in a request header
    pub fn from_header_value(value: &str) -> RelayResult<Self> {
        let identity: Identity = serde_json::from_str(value)
            .map_err(|e| RelayError::Membership(format!("invalid identity header: {}", e)))?;
        if identity.user_id.trim().is_empty() {
            return Err(RelayError::Membership(
                "identity header has an empty user id".to_string(),
            ));
        }
        Ok(identity)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn client_type(&self) -> ClientType {
        self.client_type
    }

    pub fn organizations(&self) -> &[OrganizationMembership] {
        &self.organizations
    }
}

/// What a connection presents when it is registered with a hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Authenticated(Identity),
    /// Unauthenticated pairing session; the token comes from the `Token` query parameter
    Anonymous { token: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_header() {
        let identity = Identity::from_header_value(
            r#"{"user_id":"u1","client_type":1,"organizations":[{"id":"o1","role":"admin"}]}"#,
        )
        .unwrap();

        assert_eq!(identity.user_id(), "u1");
        assert_eq!(identity.client_type(), ClientType::Web);
        assert_eq!(
            identity.organizations(),
            &[OrganizationMembership::new("o1", OrganizationRole::Admin)]
        );
    }

    #[test]
    fn test_identity_header_defaults_and_rejections() {
        let identity = Identity::from_header_value(r#"{"user_id":"u2"}"#).unwrap();
        assert_eq!(identity.client_type(), ClientType::All);
        assert!(identity.organizations().is_empty());

        assert!(Identity::from_header_value(r#"{"user_id":"  "}"#).is_err());
        assert!(Identity::from_header_value("not-json").is_err());
    }
}
