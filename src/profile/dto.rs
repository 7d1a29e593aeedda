use serde::Deserialize;

use crate::error::AuthError;
use crate::users::{Metadata, ProfileChanges};

/// Body of `PUT /profile`: `{ "user": { ... } }`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateProfileRequest {
    pub user: ProfileFields,
}

/// Editable profile fields. Anything else (email, password) is ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub metadata: Option<Metadata>,
}

impl UpdateProfileRequest {
    pub fn validate(self) -> Result<ProfileChanges, AuthError> {
        let fields = self.user;
        let first_name = match fields.first_name.map(|n| n.trim().to_string()) {
            Some(name) if name.is_empty() => {
                return Err(AuthError::Validation("first_name cannot be empty".into()))
            }
            other => other,
        };
        Ok(ProfileChanges {
            first_name,
            last_name: fields
                .last_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            metadata: fields.metadata,
        })
    }
}
