//! Processing pipelines sent with every `/images/{id}/process` call.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single step of a processing pipeline.
///
/// Serialised as a JSON object tagged by `"type"`, e.g.
/// `{"type": "resize", "width": 1920, "height": 1080}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    Resize { width: u32, height: u32 },
    Blur { sigma: f32 },
    Sharpen { sigma: f32 },
    Convolve,
    Tint,
    Composite,
}

/// Body of a process request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRequest {
    pub operations: Vec<Operation>,
    /// Always the uploaded image, so requests never chain on earlier results.
    pub source: String,
}

/// An ordered list of operations applied to the fixture image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub operations: Vec<Operation>,
}

impl Pipeline {
    /// The default CPU-bound pipeline.
    pub fn cpu_heavy() -> Self {
        Self {
            operations: vec![
                Operation::Resize {
                    width: 1920,
                    height: 1080,
                },
                Operation::Blur { sigma: 15.0 },
                Operation::Convolve,
                Operation::Tint,
                Operation::Composite,
                Operation::Sharpen { sigma: 3.0 },
                Operation::Composite,
            ],
        }
    }

    /// Load a pipeline from a JSON file shaped like `{"operations": [...]}`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        let pipeline: Pipeline = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid pipeline file {}", path.display()))?;

        if pipeline.operations.is_empty() {
            anyhow::bail!("Pipeline file {} has no operations", path.display());
        }

        Ok(pipeline)
    }

    pub fn request_for(&self, image_id: &str) -> ProcessRequest {
        ProcessRequest {
            operations: self.operations.clone(),
            source: image_id.to_string(),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::cpu_heavy()
    }
}
