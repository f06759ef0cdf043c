use std::path::PathBuf;
use tracing::warn;

use topicmap_core::traits::{MemberMetadata, MetadataProvider};

/// Reads `<dir>/<member_id>.meta.json`; unreadable or malformed files count as absent.
pub struct JsonMetadataDir {
    dir: PathBuf,
}

impl JsonMetadataDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }
}

impl MetadataProvider for JsonMetadataDir {
    fn get(&self, member_id: &str) -> Option<MemberMetadata> {
        let path = self.dir.join(format!("{member_id}.meta.json"));
        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed metadata");
                None
            }
        }
    }
}
