use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use rc_core::{ObjectLocator, TemplateRead};

/// In-progress generate-flow state saved across a page reload or an auth
/// redirect. Optional collaborator; the polling engine never depends on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResumeState {
    pub templates: Vec<TemplateRead>,
    pub file_name: String,
    #[serde(with = "base64_bytes")]
    pub file_data: Vec<u8>,
    pub uploaded: Option<ObjectLocator>,
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

pub trait SessionCache: Send + Sync {
    fn save(&self, state: &ResumeState) -> anyhow::Result<()>;
    fn load(&self) -> anyhow::Result<Option<ResumeState>>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// JSON file in a local state directory.
pub struct FileSessionCache {
    path: PathBuf,
}

impl FileSessionCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SessionCache for FileSessionCache {
    fn save(&self, state: &ResumeState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(state)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn load(&self) -> anyhow::Result<Option<ResumeState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn clear(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Test and single-process stand-in.
#[derive(Default)]
pub struct MemorySessionCache {
    slot: Mutex<Option<ResumeState>>,
}

impl SessionCache for MemorySessionCache {
    fn save(&self, state: &ResumeState) -> anyhow::Result<()> {
        *self.slot.lock().unwrap() = Some(state.clone());
        Ok(())
    }

    fn load(&self) -> anyhow::Result<Option<ResumeState>> {
        Ok(self.slot.lock().unwrap().clone())
    }

    fn clear(&self) -> anyhow::Result<()> {
        *self.slot.lock().unwrap() = None;
        Ok(())
    }
}
