//! # Workflows Module
//!
//! This module provides the high-level entry points that orchestrate complete
//! density-grid fitting runs.
//!
//! ## Overview
//!
//! Workflows are the top-level API of voxfit. They encapsulate the entire
//! pipeline — kernel construction, peak detection, the greedy search, and
//! final refinement — behind a single call, handling progress reporting and
//! result organization.
//!
//! ## Architecture
//!
//! - **Fit Workflow** ([`fit`]) - Complete grid-to-structure fitting, from the
//!   initial single-shot detection through the refined final struct and its
//!   visited-hypothesis history.

pub mod fit;
