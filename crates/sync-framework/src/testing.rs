//! A small entity used by this crate's unit tests.

use crate::entity::SyncEntity;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub body: String,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteDraft {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl NotePatch {
    pub fn title(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }
}

pub fn note(id: &str, title: &str) -> Note {
    Note {
        id: id.to_string(),
        title: title.to_string(),
        body: String::new(),
        updated_at: Utc.timestamp_opt(0, 0).unwrap(),
        version: 1,
    }
}

impl SyncEntity for Note {
    type Id = String;
    type Draft = NoteDraft;
    type Patch = NotePatch;

    const KIND: &'static str = "note";
    const COLLECTION: &'static str = "notes";

    fn id(&self) -> &String {
        &self.id
    }

    fn new_id() -> String {
        format!("note-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    fn from_draft(id: String, draft: NoteDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            body: draft.body,
            updated_at: now,
            version: 1,
        }
    }

    fn apply_patch(&self, patch: &NotePatch) -> Self {
        let mut next = self.clone();
        if let Some(title) = &patch.title {
            next.title = title.clone();
        }
        if let Some(body) = &patch.body {
            next.body = body.clone();
        }
        next
    }

    fn merge_patches(earlier: NotePatch, later: NotePatch) -> NotePatch {
        NotePatch {
            title: later.title.or(earlier.title),
            body: later.body.or(earlier.body),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}
