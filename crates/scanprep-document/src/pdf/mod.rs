// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — ordering page files and concatenating them into one document.

pub mod merge;
pub mod order;

pub use merge::PageMerger;
pub use order::PageOrderer;
