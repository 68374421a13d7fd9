use serde_json::{Map, Value};
use uuid::Uuid;

use super::ports::{claim_types, AuthError, AuthenticatedIdentity};

/// Portal user profile: the raw document plus the fields we understand
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    document: Map<String, Value>,
    pub id: Option<Uuid>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl UserProfile {
    /// Reads the typed fields out of a profile document.
    ///
    /// Missing fields are tolerated; an `id` that is present but not a UUID is
    /// treated as a malformed profile.
    pub fn from_document(document: Map<String, Value>) -> Result<Self, AuthError> {
        let id = match text_value(&document, "id").filter(|raw| !raw.trim().is_empty()) {
            Some(raw) => Some(Uuid::parse_str(raw.trim()).map_err(|e| {
                AuthError::ProfileFetchFailed(format!("Profile id is not a valid UUID: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            id,
            username: text_value(&document, "username"),
            first_name: text_value(&document, "firstName"),
            last_name: text_value(&document, "lastName"),
            email: text_value(&document, "email"),
            document,
        })
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }
}

// Non-string scalars keep their JSON rendering; null counts as absent
fn text_value(document: &Map<String, Value>, key: &str) -> Option<String> {
    match document.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Builds the identity for `profile`, one claim per populated field
pub fn map_identity(profile: &UserProfile, authentication_scheme: &str) -> AuthenticatedIdentity {
    let mut identity = AuthenticatedIdentity::new(authentication_scheme);

    if let Some(id) = profile.id {
        identity.add_claim(claim_types::NAME_IDENTIFIER, id.to_string());
    }
    if let Some(username) = non_empty(&profile.username) {
        identity.add_claim(claim_types::NAME, username);
    }
    if let Some(first_name) = non_empty(&profile.first_name) {
        identity.add_claim(claim_types::GIVEN_NAME, first_name);
    }
    if let Some(last_name) = non_empty(&profile.last_name) {
        identity.add_claim(claim_types::SURNAME, last_name);
    }
    if let Some(email) = non_empty(&profile.email) {
        identity.add_claim(claim_types::EMAIL, email);
    }

    identity
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(value: Value) -> UserProfile {
        match value {
            Value::Object(document) => UserProfile::from_document(document).unwrap(),
            _ => panic!("profile fixture must be an object"),
        }
    }

    #[test]
    fn test_full_profile_maps_to_five_claims() {
        let profile = profile(json!({
            "id": "dcec99ad-28e1-4194-a4e0-f22148963cc5",
            "username": "cashj",
            "firstName": "Johnny",
            "lastName": "Cash",
            "email": "cashj@walktheline.com"
        }));

        assert_eq!(
            profile.id,
            Some(Uuid::parse_str("dcec99ad-28e1-4194-a4e0-f22148963cc5").unwrap())
        );

        let identity = map_identity(&profile, "CogniStreamer");
        let claims: Vec<(&str, &str)> = identity
            .claims()
            .iter()
            .map(|c| (c.claim_type.as_str(), c.value.as_str()))
            .collect();

        assert_eq!(
            claims,
            vec![
                (
                    claim_types::NAME_IDENTIFIER,
                    "dcec99ad-28e1-4194-a4e0-f22148963cc5"
                ),
                (claim_types::NAME, "cashj"),
                (claim_types::GIVEN_NAME, "Johnny"),
                (claim_types::SURNAME, "Cash"),
                (claim_types::EMAIL, "cashj@walktheline.com"),
            ]
        );
        assert!(identity.claims().iter().all(|c| c.issuer == "CogniStreamer"));
        assert_eq!(identity.authentication_scheme, "CogniStreamer");
    }

    #[test]
    fn test_empty_and_missing_fields_produce_no_claims() {
        let profile = profile(json!({
            "username": "",
            "firstName": null,
            "unrelated": {"nested": true}
        }));

        let identity = map_identity(&profile, "CogniStreamer");
        assert!(identity.claims().is_empty());
        assert_eq!(profile.get("unrelated"), Some(&json!({"nested": true})));
    }

    #[test]
    fn test_non_string_values_are_rendered() {
        let profile = profile(json!({ "a": 12345, "username": 42 }));

        assert_eq!(profile.username.as_deref(), Some("42"));
        assert_eq!(profile.get("a"), Some(&json!(12345)));
    }

    #[test]
    fn test_invalid_id_is_rejected() {
        let document = match json!({ "id": "not-a-uuid" }) {
            Value::Object(document) => document,
            _ => unreachable!(),
        };

        let result = UserProfile::from_document(document);
        assert!(matches!(result, Err(AuthError::ProfileFetchFailed(_))));
    }
}
