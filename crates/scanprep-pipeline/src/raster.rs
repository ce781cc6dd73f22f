// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rasterization — turn a page document into one raster per page.
//
// `PdftoppmRasterizer` drives Poppler's `pdftoppm` once per page into a
// scratch directory, then decodes each rendered file. All decoded pages are
// returned together, so memory grows with the page count and the DPI.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use scanprep_core::error::{Result, ScanprepError};
use scanprep_document::Page;
use scanprep_document::pdf::merge::load_document;
use tracing::{debug, info, instrument};

/// Converts a page document into page rasters, in page order.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, document: &Path, dpi: u32) -> Result<Vec<Page>>;
}

/// File name of rasterized page `number` (1-based) of the document `stem`.
pub fn page_file_name(stem: &str, number: u32) -> String {
    format!("{stem}_page_{number}.png")
}

/// Save each page under its own name in `dir`, returning the written paths
/// in page order.
pub fn save_pages(pages: &[Page], dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    pages
        .iter()
        .map(|page| {
            let path = dir.join(page.name());
            page.save(&path)?;
            Ok(path)
        })
        .collect()
}

/// Rasterizer backed by the `pdftoppm` command-line tool.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: PathBuf,
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PdftoppmRasterizer {
    /// Use `pdftoppm` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("pdftoppm")
    }

    /// Use a specific `pdftoppm` binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn render_page(&self, document: &Path, number: u32, dpi: u32, prefix: &Path) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg("-singlefile")
            .arg("-f")
            .arg(number.to_string())
            .arg("-l")
            .arg(number.to_string())
            .arg(document)
            .arg(prefix)
            .output()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => ScanprepError::Rasterize(format!(
                    "{} not found (install poppler-utils)",
                    self.program.display()
                )),
                _ => ScanprepError::Rasterize(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    err
                )),
            })?;

        if !output.status.success() {
            return Err(ScanprepError::Rasterize(format!(
                "{} failed on page {}: {}",
                self.program.display(),
                number,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl PageRasterizer for PdftoppmRasterizer {
    #[instrument(skip(self, document), fields(document = %document.display()))]
    fn rasterize(&self, document: &Path, dpi: u32) -> Result<Vec<Page>> {
        let page_count = load_document(document)?.get_pages().len() as u32;
        let stem = document
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        info!(pages = page_count, dpi, "Rasterizing document");

        let scratch = tempfile::tempdir()?;
        let mut pages = Vec::with_capacity(page_count as usize);
        for number in 1..=page_count {
            let prefix = scratch.path().join(format!("page-{number}"));
            self.render_page(document, number, dpi, &prefix)?;
            let rendered = prefix.with_extension("png");
            let page = Page::open(&rendered, number).map_err(|err| {
                ScanprepError::Rasterize(format!("page {number} was not rendered: {err}"))
            })?;
            debug!(page = number, width = page.width(), height = page.height(), "Page rasterized");
            pages.push(Page::new(
                number,
                page_file_name(&stem, number),
                page.into_raster(),
            ));
        }
        Ok(pages)
    }
}
