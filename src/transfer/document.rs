//! Document model
//!
//! A document lives in exactly one domain. Team-only fields exist only inside
//! [`DocumentDomain::Team`], so a personal document cannot carry an owner,
//! lock or share by construction.

use serde::{Deserialize, Serialize};

use super::error::TransferError;

/// Current user as reported by the identity collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub display_name: String,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Edit lock held by a team member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLock {
    pub locked_by: String,
    pub locked_at: i64,
}

/// Team sharing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareSettings {
    pub share_id: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Fields that only exist on team documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamFields {
    pub owner_id: String,
    pub owner_name: String,
    pub last_modified_by: String,
    pub last_modified_by_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<DocumentLock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<ShareSettings>,
}

impl TeamFields {
    /// Ownership and modification fields for a freshly transferred document
    pub fn owned_by(user: &UserIdentity) -> Self {
        Self {
            owner_id: user.id.clone(),
            owner_name: user.display_name.clone(),
            last_modified_by: user.id.clone(),
            last_modified_by_name: user.display_name.clone(),
            lock: None,
            share: None,
        }
    }
}

/// Storage domain of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "kebab-case")]
pub enum DocumentDomain {
    Personal,
    Team(TeamFields),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(flatten)]
    pub domain: DocumentDomain,
}

/// Metadata pushed to the list-view index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub id: String,
    pub title: String,
    pub is_team_document: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    pub updated_at: i64,
}

impl Document {
    /// Create a personal document stamped with the current time
    pub fn personal(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: id.into(),
            title: title.into(),
            content: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
            domain: DocumentDomain::Personal,
        }
    }

    #[inline]
    pub fn is_team_document(&self) -> bool {
        matches!(self.domain, DocumentDomain::Team(_))
    }

    pub fn team(&self) -> Option<&TeamFields> {
        match &self.domain {
            DocumentDomain::Team(fields) => Some(fields),
            DocumentDomain::Personal => None,
        }
    }

    /// Move into the team domain, owned and last modified by `user`
    pub fn into_team(self, user: &UserIdentity, now: i64) -> Self {
        Self {
            updated_at: now,
            domain: DocumentDomain::Team(TeamFields::owned_by(user)),
            ..self
        }
    }

    /// Move into the personal domain, dropping every team-only field
    pub fn into_personal(self, now: i64) -> Self {
        Self {
            updated_at: now,
            domain: DocumentDomain::Personal,
            ..self
        }
    }

    /// Structural checks a rollback snapshot must pass
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.id.trim().is_empty() {
            return Err(TransferError::InvalidSnapshot("empty document id".into()));
        }
        if self.created_at < 0 || self.updated_at < 0 {
            return Err(TransferError::InvalidSnapshot(format!(
                "negative timestamp on {}",
                self.id
            )));
        }
        if let DocumentDomain::Team(fields) = &self.domain
            && fields.owner_id.trim().is_empty()
        {
            return Err(TransferError::InvalidSnapshot(format!(
                "team document {} has no owner",
                self.id
            )));
        }
        Ok(())
    }

    /// Independent, validated copy used as the rollback source of truth
    pub fn snapshot(&self) -> Result<Document, TransferError> {
        self.validate()?;
        Ok(self.clone())
    }

    pub fn metadata(&self) -> DocumentMetadata {
        let team = self.team();
        DocumentMetadata {
            id: self.id.clone(),
            title: self.title.clone(),
            is_team_document: team.is_some(),
            owner_id: team.map(|t| t.owner_id.clone()),
            owner_name: team.map(|t| t.owner_name.clone()),
            updated_at: self.updated_at,
        }
    }
}
