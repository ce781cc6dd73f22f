// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanprep-pipeline — Batch execution and orchestration for Scanprep.
//
// Runs per-page transforms with retry over a worker pool, hands artifacts to
// an injected blob store, and wires rasterization, watermark suppression,
// text enhancement and merging into one pipeline.

pub mod pipeline;
pub mod pool;
pub mod raster;
pub mod retry;
pub mod runner;
pub mod stages;
pub mod store;

pub use pipeline::{MergeOutcome, Pipeline, PipelineLayout, PipelineReport, StageReports};
pub use pool::{TaskHandle, WorkerPool};
pub use raster::{PageRasterizer, PdftoppmRasterizer};
pub use retry::{RetryDecision, RetryPolicy, classify_error};
pub use runner::{BatchEntry, BatchReport, BatchRunner, BatchSummary, CancelToken, ProcessingOutcome};
pub use stages::{EnhanceStage, PageStage, StageOutput, StageSink, WatermarkStage};
pub use store::{BlobStore, LocalBlobStore, RemoteId};
