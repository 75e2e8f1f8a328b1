//! Traits for the collaborators the conversation leans on.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::draft::DraftContext;

/// Resolves an opaque chat file handle to a download URL.
///
/// Best-effort: any failure yields `None`.
#[async_trait]
pub trait FileResolver: Send + Sync {
    async fn file_url(&self, file_id: &str) -> Option<String>;
}

/// Pins an uploaded image somewhere durable and returns the reference to store
/// in the draft (typically `ipfs://<cid>`).
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, source_url: &str) -> anyhow::Result<String>;
}

/// Links recognised in a piece of free text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedLinks {
    /// The post or cast the deploy refers to.
    pub context: Option<DraftContext>,
    /// Social profiles keyed by platform.
    pub socials: BTreeMap<String, String>,
}

impl ExtractedLinks {
    pub fn is_empty(&self) -> bool {
        self.context.is_none() && self.socials.is_empty()
    }
}

/// Pulls context URLs and social links out of free text.
pub trait LinkExtractor: Send + Sync {
    fn extract(&self, text: &str) -> ExtractedLinks;
}
