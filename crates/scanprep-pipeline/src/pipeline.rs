// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline — wires rasterization, the two page stages and merging together
// around an injected blob store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use scanprep_core::config::PipelineConfig;
use scanprep_core::error::Result;
use scanprep_core::types::RunId;
use scanprep_document::{MergeSummary, PageMerger, TextEnhancer, WatermarkSuppressor};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::raster::{PageRasterizer, save_pages};
use crate::retry::RetryPolicy;
use crate::runner::{BatchReport, BatchRunner};
use crate::stages::{EnhanceStage, PageStage, StageOutput, StageSink, WatermarkStage, discover_inputs};
use crate::store::{BlobStore, RemoteId, put_with_retry};

/// Local directories for each stage's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayout {
    pub converted: PathBuf,
    pub watermark_removed: PathBuf,
    pub text_enhanced: PathBuf,
}

impl PipelineLayout {
    /// Standard layout under a working directory.
    pub fn under(work_dir: impl AsRef<Path>) -> Self {
        let work_dir = work_dir.as_ref();
        Self {
            converted: work_dir.join("converted_images_600dpi"),
            watermark_removed: work_dir.join("watermark_removed_images_600dpi"),
            text_enhanced: work_dir.join("text_enhanced_images_600dpi"),
        }
    }
}

/// Per-stage outcomes of cleaning a set of pages.
#[derive(Debug, Clone, Serialize)]
pub struct StageReports {
    pub watermark: BatchReport<PathBuf, StageOutput>,
    pub enhancement: BatchReport<PathBuf, StageOutput>,
}

/// Everything one end-to-end run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: RunId,
    pub document: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Pages rasterized from the document.
    pub pages: usize,
    pub stages: StageReports,
}

impl PipelineReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A merged document and where it was stored.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub summary: MergeSummary,
    pub remote: Option<RemoteId>,
}

/// The scan-cleanup pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn BlobStore>,
    rasterizer: Arc<dyn PageRasterizer>,
    runner: BatchRunner,
    layout: PipelineLayout,
}

impl Pipeline {
    /// Build a pipeline writing under `work_dir`. The configuration is
    /// validated here so a bad file fails before any page is touched.
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn BlobStore>,
        rasterizer: Arc<dyn PageRasterizer>,
        work_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            runner: BatchRunner::from_config(&config),
            layout: PipelineLayout::under(work_dir),
            config,
            store,
            rasterizer,
        })
    }

    pub fn with_runner(mut self, runner: BatchRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_layout(mut self, layout: PipelineLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }

    pub fn runner(&self) -> &BatchRunner {
        &self.runner
    }

    fn upload_policy(&self) -> RetryPolicy {
        self.config.retry.into()
    }

    fn sink(&self, dir: &Path, folder: &str) -> StageSink {
        StageSink::new(dir, Arc::clone(&self.store), folder).with_upload_policy(self.upload_policy())
    }

    /// Rasterize `document` at the configured DPI, save every page into the
    /// converted directory and upload it. Returns the saved paths in page
    /// order.
    #[instrument(skip(self, document), fields(document = %document.display()))]
    pub fn rasterize(&self, document: &Path) -> Result<Vec<PathBuf>> {
        let pages = self.rasterizer.rasterize(document, self.config.dpi)?;
        let paths = save_pages(&pages, &self.layout.converted)?;
        let policy = self.upload_policy();
        for path in &paths {
            if let Err(err) = put_with_retry(self.store.as_ref(), path, &self.config.folders.converted, &policy) {
                warn!(page = %path.display(), error = %err, "Converted page not uploaded");
            }
        }
        info!(pages = paths.len(), dir = %self.layout.converted.display(), "Pages saved");
        Ok(paths)
    }

    /// Run the watermark stage over `inputs`, then the enhancement stage
    /// over the pages that survived it.
    pub fn process_pages(&self, inputs: &[PathBuf]) -> Result<StageReports> {
        let watermark_stage: Arc<dyn PageStage> = Arc::new(WatermarkStage::new(
            WatermarkSuppressor::from_config(self.config.watermark),
            self.sink(&self.layout.watermark_removed, &self.config.folders.watermark_removed),
        ));
        let watermark = self.run_stage(watermark_stage, inputs);

        let survivors: Vec<PathBuf> = watermark.outputs().map(|out| out.path.clone()).collect();
        let enhance_stage: Arc<dyn PageStage> = Arc::new(EnhanceStage::new(
            TextEnhancer::new(self.config.enhancement.clone())?,
            self.sink(&self.layout.text_enhanced, &self.config.folders.text_enhanced),
        ));
        let enhancement = self.run_stage(enhance_stage, &survivors);

        Ok(StageReports {
            watermark,
            enhancement,
        })
    }

    /// Clean every page image already present in the converted directory.
    pub fn clean_directory(&self) -> Result<StageReports> {
        let inputs = discover_inputs(&self.layout.converted)?;
        info!(pages = inputs.len(), dir = %self.layout.converted.display(), "Cleaning pages");
        self.process_pages(&inputs)
    }

    fn run_stage(&self, stage: Arc<dyn PageStage>, inputs: &[PathBuf]) -> BatchReport<PathBuf, StageOutput> {
        let name = stage.name();
        let report = self.runner.run(inputs, move |path: &PathBuf| stage.process(path));
        let summary = report.summary();
        info!(
            stage = name,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Stage finished"
        );
        report
    }

    /// Rasterize, clean and enhance one document end to end.
    #[instrument(skip(self, document), fields(document = %document.display()))]
    pub fn run(&self, document: &Path) -> Result<PipelineReport> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        info!(%run_id, "Pipeline run started");

        let pages = self.rasterize(document)?;
        let stages = self.process_pages(&pages)?;

        let report = PipelineReport {
            run_id,
            document: document.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            pages: pages.len(),
            stages,
        };
        info!(
            %run_id,
            pages = report.pages,
            enhanced = report.stages.enhancement.summary().succeeded,
            "Pipeline run finished"
        );
        Ok(report)
    }

    /// Merge the page documents in `dir` into `dir/<merge_sentinel>` and
    /// upload the result.
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub fn merge(&self, dir: &Path) -> Result<MergeOutcome> {
        let summary = PageMerger::new().merge_directory(dir, &self.config.merge_sentinel)?;
        let remote = put_with_retry(
            self.store.as_ref(),
            &summary.output,
            &self.config.folders.merged,
            &self.upload_policy(),
        )?;
        Ok(MergeOutcome { summary, remote })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::page_file_name;
    use crate::runner::ProcessingOutcome;
    use crate::store::LocalBlobStore;
    use image::{Rgb, RgbImage};
    use lopdf::{Document, Object, Stream, dictionary};
    use scanprep_core::error::ScanprepError;
    use scanprep_core::types::DispatchMode;
    use scanprep_document::{Page, Raster};

    /// Produces synthetic pages instead of shelling out.
    struct FakeRasterizer {
        pages: u32,
    }

    impl PageRasterizer for FakeRasterizer {
        fn rasterize(&self, document: &Path, _dpi: u32) -> Result<Vec<Page>> {
            let stem = document.file_stem().unwrap().to_string_lossy().into_owned();
            Ok((1..=self.pages)
                .map(|n| {
                    let img = RgbImage::from_fn(24, 24, |x, _| {
                        if (10..14).contains(&x) {
                            Rgb([20, 20, 20])
                        } else {
                            Rgb([210, 205, 200])
                        }
                    });
                    Page::new(n, page_file_name(&stem, n), Raster::Rgb(img))
                })
                .collect())
        }
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.retry.base_delay_ms = 0;
        config.retry.max_delay_ms = 0;
        config.batch.mode = DispatchMode::Sequential;
        config
    }

    fn pipeline(tmp: &Path, pages: u32) -> Pipeline {
        let store = Arc::new(LocalBlobStore::new(tmp.join("store")).unwrap());
        Pipeline::new(config(), store, Arc::new(FakeRasterizer { pages }), tmp.join("work")).unwrap()
    }

    #[test]
    fn run_processes_every_page_through_both_stages() {
        let tmp = tempfile::tempdir().unwrap();
        let report = pipeline(tmp.path(), 3).run(Path::new("book.pdf")).unwrap();

        assert_eq!(report.pages, 3);
        assert_eq!(report.stages.watermark.summary().succeeded, 3);
        assert_eq!(report.stages.enhancement.summary().succeeded, 3);
        assert!(report.finished_at >= report.started_at);

        for n in 1..=3 {
            let name = page_file_name("book", n);
            assert!(tmp.path().join("store/Converted_Images_600DPI").join(&name).is_file());
            assert!(tmp.path().join("store/Watermark_Removed_Images").join(&name).is_file());
            assert!(tmp.path().join("store/Text_Enhanced_Images").join(&name).is_file());
        }
        let json = report.to_json().unwrap();
        assert!(json.contains("\"run_id\""));
    }

    #[test]
    fn parallel_run_matches_sequential_outputs() {
        let seq_tmp = tempfile::tempdir().unwrap();
        let par_tmp = tempfile::tempdir().unwrap();
        let sequential = pipeline(seq_tmp.path(), 4).run(Path::new("doc.pdf")).unwrap();
        let parallel = pipeline(par_tmp.path(), 4)
            .with_runner(BatchRunner::new(RetryPolicy::immediate(3), DispatchMode::Parallel).with_workers(3))
            .run(Path::new("doc.pdf"))
            .unwrap();

        let read_all = |tmp: &Path| -> Vec<Vec<u8>> {
            (1..=4)
                .map(|n| std::fs::read(tmp.join("store/Text_Enhanced_Images").join(page_file_name("doc", n))).unwrap())
                .collect()
        };
        assert_eq!(read_all(seq_tmp.path()), read_all(par_tmp.path()));
        assert_eq!(
            sequential.stages.enhancement.summary(),
            parallel.stages.enhancement.summary()
        );
    }

    #[test]
    fn bad_page_is_reported_and_others_continue() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline(tmp.path(), 0);
        let converted = &pipeline.layout().converted;
        std::fs::create_dir_all(converted).unwrap();
        RgbImage::from_pixel(16, 16, Rgb([240, 240, 240]))
            .save(converted.join("doc_page_1.png"))
            .unwrap();
        std::fs::write(converted.join("doc_page_2.png"), b"corrupt").unwrap();

        let reports = pipeline.clean_directory().unwrap();
        let entries = reports.watermark.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].outcome.is_completed());
        assert!(matches!(entries[1].outcome, ProcessingOutcome::Failed { attempts: 3, .. }));
        assert_eq!(reports.enhancement.len(), 1);
    }

    fn single_page_pdf(path: &Path, label: &str) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content = doc.add_object(Stream::new(dictionary! {}, format!("({label}) Tj").into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content,
            "MediaBox" => vec![0.into(), 0.into(), 200.into(), 200.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog);
        doc.save(path).unwrap();
    }

    #[test]
    fn merge_writes_sentinel_and_uploads_it() {
        let tmp = tempfile::tempdir().unwrap();
        let pdfs = tmp.path().join("pdfs");
        std::fs::create_dir_all(&pdfs).unwrap();
        single_page_pdf(&pdfs.join("part_2.pdf"), "two");
        single_page_pdf(&pdfs.join("part_1.pdf"), "one");

        let outcome = pipeline(tmp.path(), 0).merge(&pdfs).unwrap();
        assert_eq!(outcome.summary.pages, 2);
        assert_eq!(outcome.summary.output, pdfs.join("percentage.pdf"));
        assert_eq!(outcome.remote.unwrap().folder, "Merged_PDFs");
        assert!(tmp.path().join("store/Merged_PDFs/percentage.pdf").is_file());
    }

    #[test]
    fn merge_of_empty_directory_is_empty_input() {
        let tmp = tempfile::tempdir().unwrap();
        let err = pipeline(tmp.path(), 0).merge(tmp.path()).unwrap_err();
        assert!(matches!(err, ScanprepError::EmptyInput));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config();
        config.enhancement.clahe_tiles = (0, 4);
        let store = Arc::new(LocalBlobStore::new(tmp.path().join("store")).unwrap());
        let result = Pipeline::new(config, store, Arc::new(FakeRasterizer { pages: 1 }), tmp.path());
        assert!(matches!(result, Err(ScanprepError::Config(_))));
    }
}
