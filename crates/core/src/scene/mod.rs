use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{FrameBuffer, Result, UNIVERSE_SIZE};

/// Full 512-value snapshot of the universe, stored as a flat JSON array.
///
/// Scenes are a persistence format only; the live state always stays in the
/// [`FrameBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scene {
    values: Vec<u8>,
}

impl Scene {
    /// An all-zero scene.
    pub fn blank() -> Self {
        Self {
            values: vec![0; UNIVERSE_SIZE],
        }
    }

    /// Builds a scene from arbitrary integers: values are clamped to [0, 255],
    /// short input is padded with zeros and long input truncated.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        let mut scene: Vec<u8> = values
            .into_iter()
            .take(UNIVERSE_SIZE)
            .map(|value| value.clamp(0, u8::MAX as i64) as u8)
            .collect();
        scene.resize(UNIVERSE_SIZE, 0);
        Self { values: scene }
    }

    pub fn capture(buffer: &FrameBuffer) -> Self {
        Self {
            values: buffer.snapshot().to_vec(),
        }
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    /// Copies every value into the live buffer.
    pub fn apply(&self, buffer: &FrameBuffer) {
        buffer.load(&self.values);
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string(self)?)?;
        tracing::info!(path = %path.display(), "scene saved");
        Ok(())
    }

    /// Reads a scene file, reporting malformed content as an error.
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let values: Vec<i64> = serde_json::from_str(&raw)?;
        Ok(Self::from_values(values))
    }

    /// Reads a scene file; any failure is logged and yields a blank scene.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(scene) => {
                tracing::info!(path = %path.display(), "scene loaded");
                scene
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "failed to load scene");
                Self::blank()
            }
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::blank()
    }
}
