//! Plate text selection and registry validation.
//!
//! OCR on a plate crop often splits stacked characters into separate lines, so
//! the two tallest lines are tried alone and concatenated in both orders.

use anyhow::{Context, Result};
use common::{OcrLine, PlateRegistry};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Accepted plate alphabet: uppercase letters, digits, `-`, `:`, space and bullet
const PLATE_FORMAT_PATTERN: &str = r"^[A-Z0-9\-: •]{1,20}$";

static PLATE_FORMAT: OnceCell<Regex> = OnceCell::new();

/// Compiled plate format, built on first use
pub fn plate_format() -> Result<&'static Regex> {
    PLATE_FORMAT.get_or_try_init(|| {
        Regex::new(PLATE_FORMAT_PATTERN).context("Invalid plate format pattern")
    })
}

/// Candidate strings for one crop, most likely first.
///
/// Lines are ranked by bounding-box height, tallest first. The sort is stable;
/// lines without a box rank below every boxed line and keep their original
/// order. Yields no candidates for no lines, the tallest line alone for one
/// line, and otherwise `[first, second, first+second, second+first]`.
pub fn select_candidates(lines: &[OcrLine]) -> Vec<String> {
    let mut ranked: Vec<&OcrLine> = lines.iter().collect();
    ranked.sort_by_key(|line| Reverse(line.height()));

    let Some(first) = ranked.first() else {
        return Vec::new();
    };
    let first = first.text.trim();

    let mut candidates = vec![first.to_string()];
    if let Some(second) = ranked.get(1) {
        let second = second.text.trim();
        candidates.push(second.to_string());
        candidates.push(format!("{first}{second}"));
        candidates.push(format!("{second}{first}"));
    }
    candidates
}

/// Whether `candidate` looks like plate text at all
pub fn is_plate_format(candidate: &str) -> bool {
    match plate_format() {
        Ok(format) => format.is_match(candidate),
        Err(e) => {
            tracing::error!(error = %e, "Plate format unavailable, rejecting candidate");
            false
        }
    }
}

/// Drop `-` and `:` separators, uppercase and trim
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '-' && *c != ':')
        .collect::<String>()
        .to_uppercase()
        .trim()
        .to_string()
}

/// Exact membership first, then normalized containment: the candidate matches
/// when its normalized form contains a normalized registry entry, which
/// tolerates OCR noise around the real plate text.
pub fn validate(candidate: &str, registry: &PlateRegistry) -> bool {
    if registry.contains(candidate) {
        return true;
    }

    let normalized = normalize(candidate);
    registry.entries().iter().any(|entry| {
        let entry = normalize(entry);
        !entry.is_empty() && normalized.contains(&entry)
    })
}

/// What one plate crop contributed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropOutcome {
    /// First candidate that matched the registry
    pub registered: Option<String>,

    /// Well-formed candidates that did not match; empty once a match is found
    pub unregistered: Vec<String>,
}

impl CropOutcome {
    pub fn is_empty(&self) -> bool {
        self.registered.is_none() && self.unregistered.is_empty()
    }
}

/// Validates OCR output against a read-only plate registry
#[derive(Debug, Clone, Copy)]
pub struct PlateTextValidator<'a> {
    registry: &'a PlateRegistry,
}

impl<'a> PlateTextValidator<'a> {
    pub fn new(registry: &'a PlateRegistry) -> Self {
        Self { registry }
    }

    pub fn validate(&self, candidate: &str) -> bool {
        validate(candidate, self.registry)
    }

    /// Run candidate selection, the format filter and registry validation for
    /// the lines recognized in one crop. Stops at the first registered
    /// candidate.
    pub fn evaluate(&self, lines: &[OcrLine]) -> CropOutcome {
        let mut outcome = CropOutcome::default();

        for candidate in select_candidates(lines) {
            if !is_plate_format(&candidate) {
                telemetry::metrics::PLATE_CANDIDATES
                    .with_label_values(&["malformed"])
                    .inc();
                continue;
            }

            tracing::info!(text = %candidate, "Detected plate text");
            if self.validate(&candidate) {
                telemetry::metrics::PLATE_CANDIDATES
                    .with_label_values(&["registered"])
                    .inc();
                outcome.registered = Some(candidate);
                outcome.unregistered.clear();
                break;
            }

            telemetry::metrics::PLATE_CANDIDATES
                .with_label_values(&["unregistered"])
                .inc();
            outcome.unregistered.push(candidate);
        }

        outcome
    }
}
