use super::content::ResumeContent;
use super::link::ProfileLink;
use super::patch::{assign, clearable, merge_nested, ContentPatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sync_framework::SyncEntity;
use uuid::Uuid;

/// A presentable document, optionally derived from a profile.
///
/// When `profile_link` is present, `content` is expected to be the resolver's output for
/// that link, but nothing enforces it; see [`crate::resolver::has_drifted`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resume {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub content: ResumeContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_link: Option<ProfileLink>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// Payload for creating a new resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeDraft {
    pub title: String,
    #[serde(default)]
    pub content: ResumeContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_link: Option<ProfileLink>,
}

impl ResumeDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update of a resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentPatch>,
    /// `Some(None)` unlinks the resume from its profile.
    #[serde(
        default,
        deserialize_with = "clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_link: Option<Option<ProfileLink>>,
}

impl ResumePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn content(content: ContentPatch) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    /// Detaches the resume from its profile. The content stays as it is.
    pub fn unlink() -> Self {
        Self {
            profile_link: Some(None),
            ..Default::default()
        }
    }
}

impl Resume {
    /// Create payload for a copy of this resume. The suffix is appended every time, so a
    /// copy of a copy ends in `" (Copy) (Copy)"`. The profile link is not carried over.
    pub fn duplicate_draft(&self) -> ResumeDraft {
        ResumeDraft {
            title: format!("{} (Copy)", self.title),
            content: self.content.clone(),
            profile_link: None,
        }
    }
}

impl SyncEntity for Resume {
    type Id = String;
    type Draft = ResumeDraft;
    type Patch = ResumePatch;

    const KIND: &'static str = "resume";
    const COLLECTION: &'static str = "resumes";

    fn id(&self) -> &String {
        &self.id
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn from_draft(id: String, draft: ResumeDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: None,
            title: draft.title,
            content: draft.content,
            profile_link: draft.profile_link,
            created_at: now,
            updated_at: now,
            version: Some(1),
        }
    }

    fn apply_patch(&self, patch: &ResumePatch) -> Self {
        let mut next = self.clone();
        assign(&mut next.title, &patch.title);
        if let Some(content) = &patch.content {
            next.content = content.apply_to(&self.content);
        }
        assign(&mut next.profile_link, &patch.profile_link);
        next
    }

    fn merge_patches(earlier: ResumePatch, later: ResumePatch) -> ResumePatch {
        ResumePatch {
            title: later.title.or(earlier.title),
            content: merge_nested(earlier.content, later.content, ContentPatch::merge),
            profile_link: later.profile_link.or(earlier.profile_link),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        if let Some(version) = self.version.as_mut() {
            *version += 1;
        }
    }
}
