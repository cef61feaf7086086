//! Artifacts ("content items") produced by a completed job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::job::uuid_shim::UserId;

/// A materialized image record produced by exactly one completed job.
/// Never mutated by the pipeline after creation, except tag sync
/// (`spec.md` §3) — which this repo does not implement, tags being
/// out of scope for the job pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: i64,
    pub user_id: UserId,

    /// Derived from the originating prompt.
    pub title: String,
    pub path: String,
    pub thumbnail_path: String,
    /// Additional thumbnail sizes keyed by a resolution label, e.g.
    /// `"512"` -> relative path. Empty when only the default thumbnail
    /// was produced.
    #[serde(default)]
    pub alt_resolution_thumbnails: HashMap<String, String>,

    pub content_type: ArtifactFormat,
    /// Arbitrary metadata, always includes the original prompt under
    /// the `"prompt"` key.
    #[serde(default)]
    pub item_metadata: serde_json::Value,
    pub quality_score: Option<f32>,
    #[serde(default)]
    pub tags: HashSet<i64>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Png,
    Jpeg,
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// Fields required to materialize a new artifact row. Built by the
/// worker after fetching and writing output bytes to disk.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub user_id: UserId,
    pub title: String,
    pub path: String,
    pub thumbnail_path: String,
    pub alt_resolution_thumbnails: HashMap<String, String>,
    pub content_type: ArtifactFormat,
    pub item_metadata: serde_json::Value,
}
