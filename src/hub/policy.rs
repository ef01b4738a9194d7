/// Membership policies: how a principal maps to a user index entry and groups
///
/// The authenticated and anonymous hubs are the same `Hub` with different policies.
use super::groups;
use super::identity::Principal;
use crate::errors::{RelayError, RelayResult};

/// Addressing computed for one connection at registration time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memberships {
    /// Key for `send_to_user`; `None` means the connection is not user-addressable
    pub user_id: Option<String>,
    pub groups: Vec<String>,
}

pub trait MembershipPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn memberships(&self, principal: &Principal) -> RelayResult<Memberships>;
}

/// Authenticated connections: user index plus organization, client-type and
/// installation groups
#[derive(Debug, Clone, Default)]
pub struct AuthenticatedMembership {
    installation_id: Option<String>,
}

impl AuthenticatedMembership {
    pub fn new(installation_id: Option<String>) -> Self {
        Self { installation_id }
    }
}

impl MembershipPolicy for AuthenticatedMembership {
    fn name(&self) -> &'static str {
        "authenticated"
    }

    fn memberships(&self, principal: &Principal) -> RelayResult<Memberships> {
        let identity = match principal {
            Principal::Authenticated(identity) => identity,
            Principal::Anonymous { .. } => {
                return Err(RelayError::Membership(
                    "authenticated hub requires an identity".to_string(),
                ))
            }
        };

        let client_type = identity.client_type();
        let mut groups = Vec::new();

        for membership in identity.organizations() {
            groups.push(groups::organization(&membership.id));
            if client_type.is_concrete() {
                groups.push(groups::organization_client(&membership.id, client_type));
            }
        }

        if client_type.is_concrete() {
            groups.push(groups::user_client(identity.user_id(), client_type));
        }

        if let Some(installation_id) = &self.installation_id {
            groups.push(groups::installation(installation_id));
            if client_type.is_concrete() {
                groups.push(groups::installation_client(installation_id, client_type));
            }
        }

        groups.sort();
        groups.dedup();

        Ok(Memberships {
            user_id: Some(identity.user_id().to_string()),
            groups,
        })
    }
}

/// Anonymous connections: only the pairing token group, never a user
#[derive(Debug, Clone, Default)]
pub struct AnonymousMembership;

impl MembershipPolicy for AnonymousMembership {
    fn name(&self) -> &'static str {
        "anonymous"
    }

    fn memberships(&self, principal: &Principal) -> RelayResult<Memberships> {
        match principal {
            Principal::Anonymous { token } => {
                let groups = token
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(|t| vec![groups::token(t)])
                    .unwrap_or_default();
                Ok(Memberships {
                    user_id: None,
                    groups,
                })
            }
            Principal::Authenticated(_) => Err(RelayError::Membership(
                "anonymous hub does not accept identities".to_string(),
            )),
        }
    }
}
