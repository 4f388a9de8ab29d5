use super::content::ProfileContent;
use super::patch::{assign, clearable, merge_nested, ContentPatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sync_framework::SyncEntity;
use uuid::Uuid;

/// Reusable master record that resumes select from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub content: ProfileContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a new profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub content: ProfileContent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `Some(None)` removes the description.
    #[serde(
        default,
        deserialize_with = "clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentPatch>,
}

impl SyncEntity for Profile {
    type Id = String;
    type Draft = ProfileDraft;
    type Patch = ProfilePatch;

    const KIND: &'static str = "profile";
    const COLLECTION: &'static str = "profiles";

    fn id(&self) -> &String {
        &self.id
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn from_draft(id: String, draft: ProfileDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: None,
            name: draft.name,
            description: draft.description,
            content: draft.content,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply_patch(&self, patch: &ProfilePatch) -> Self {
        let mut next = self.clone();
        assign(&mut next.name, &patch.name);
        assign(&mut next.description, &patch.description);
        if let Some(content) = &patch.content {
            next.content = content.apply_to(&self.content);
        }
        next
    }

    fn merge_patches(earlier: ProfilePatch, later: ProfilePatch) -> ProfilePatch {
        ProfilePatch {
            name: later.name.or(earlier.name),
            description: later.description.or(earlier.description),
            content: merge_nested(earlier.content, later.content, ContentPatch::merge),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
