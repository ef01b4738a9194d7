/// Group key naming
///
/// Every send targets either a user id, one of these group keys, or all connections.
use crate::notifications::ClientType;

pub fn organization(organization_id: &str) -> String {
    format!("org:{}", organization_id)
}

pub fn token(token: &str) -> String {
    format!("token:{}", token)
}

pub fn user_client(user_id: &str, client_type: ClientType) -> String {
    format!("user_client:{}:{}", user_id, client_type.code())
}

pub fn organization_client(organization_id: &str, client_type: ClientType) -> String {
    format!("org_client:{}:{}", organization_id, client_type.code())
}

pub fn installation(installation_id: &str) -> String {
    format!("installation:{}", installation_id)
}

pub fn installation_client(installation_id: &str, client_type: ClientType) -> String {
    format!(
        "installation_client:{}:{}",
        installation_id,
        client_type.code()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_keys() {
        assert_eq!(organization("o1"), "org:o1");
        assert_eq!(token("abc"), "token:abc");
        assert_eq!(user_client("u1", ClientType::Mobile), "user_client:u1:4");
        assert_eq!(organization_client("o1", ClientType::Web), "org_client:o1:1");
        assert_eq!(installation("i1"), "installation:i1");
        assert_eq!(
            installation_client("i1", ClientType::Desktop),
            "installation_client:i1:3"
        );
    }
}
