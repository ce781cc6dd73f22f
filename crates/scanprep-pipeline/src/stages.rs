// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-page stages — load one page file, transform it, save the result and
// hand it to the blob store. Each stage is the unit of work the batch
// runner retries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scanprep_core::error::Result;
use scanprep_core::types::PAGE_IMAGE_EXTENSIONS;
use scanprep_document::{Page, PageOrderer, TextEnhancer, WatermarkSuppressor, enhanced_file_name, page_ordinal};
use serde::Serialize;
use tracing::{info, instrument};

use crate::retry::RetryPolicy;
use crate::store::{BlobStore, RemoteId, put_with_retry};

/// Where one processed page ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutput {
    pub path: PathBuf,
    /// `None` when the store skipped the file.
    pub remote: Option<RemoteId>,
}

/// A transform applied to one page file.
pub trait PageStage: Send + Sync {
    fn name(&self) -> &'static str;
    fn process(&self, input: &Path) -> Result<StageOutput>;
}

/// Page image files in `dir` (png, jpg, jpeg), in reading order.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    PageOrderer::without_sentinel().order_directory(dir, PAGE_IMAGE_EXTENSIONS)
}

fn ordinal_of(path: &Path) -> u32 {
    path.file_name()
        .and_then(|n| page_ordinal(&n.to_string_lossy()))
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

/// Where a stage writes and uploads its output.
#[derive(Clone)]
pub struct StageSink {
    pub output_dir: PathBuf,
    pub store: Arc<dyn BlobStore>,
    pub folder: String,
    pub upload_policy: RetryPolicy,
}

impl StageSink {
    pub fn new(output_dir: impl Into<PathBuf>, store: Arc<dyn BlobStore>, folder: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            store,
            folder: folder.into(),
            upload_policy: RetryPolicy::default(),
        }
    }

    pub fn with_upload_policy(mut self, policy: RetryPolicy) -> Self {
        self.upload_policy = policy;
        self
    }

    fn write(&self, page: &Page, file_name: &str) -> Result<StageOutput> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(file_name);
        page.save(&path)?;
        let remote = put_with_retry(self.store.as_ref(), &path, &self.folder, &self.upload_policy)?;
        Ok(StageOutput { path, remote })
    }
}

// ---------------------------------------------------------------------------
// Watermark stage
// ---------------------------------------------------------------------------

/// Suppresses watermarks and keeps the input file name.
pub struct WatermarkStage {
    suppressor: WatermarkSuppressor,
    sink: StageSink,
}

impl WatermarkStage {
    pub fn new(suppressor: WatermarkSuppressor, sink: StageSink) -> Self {
        Self { suppressor, sink }
    }
}

impl PageStage for WatermarkStage {
    fn name(&self) -> &'static str {
        "watermark"
    }

    #[instrument(skip(self, input), fields(input = %input.display()))]
    fn process(&self, input: &Path) -> Result<StageOutput> {
        let page = Page::open(input, ordinal_of(input))?;
        page.ensure_processable()?;
        let (cleaned, stats) = self.suppressor.suppress_with_stats(&page);
        let output = self.sink.write(&cleaned, page.name())?;
        info!(changed = stats.changed, output = %output.path.display(), "Watermark removed");
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Enhancement stage
// ---------------------------------------------------------------------------

/// Enhances text and writes a PNG named after the input.
pub struct EnhanceStage {
    enhancer: TextEnhancer,
    sink: StageSink,
}

impl EnhanceStage {
    pub fn new(enhancer: TextEnhancer, sink: StageSink) -> Self {
        Self { enhancer, sink }
    }
}

impl PageStage for EnhanceStage {
    fn name(&self) -> &'static str {
        "enhance"
    }

    #[instrument(skip(self, input), fields(input = %input.display()))]
    fn process(&self, input: &Path) -> Result<StageOutput> {
        // Decode failures surface here, before any filter runs.
        let page = Page::open_grayscale(input, ordinal_of(input))?;
        let enhanced = self.enhancer.enhance(&page)?;
        let output = self.sink.write(&enhanced, &enhanced_file_name(page.name()))?;
        info!(output = %output.path.display(), "Enhanced image saved");
        Ok(output)
    }
}
