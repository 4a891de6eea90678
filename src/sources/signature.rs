//! Failure signature matching.
//!
//! # Design Decisions
//! - Plain substring containment, no regex
//! - Every matching signature counts on its own; one line may match several

use std::sync::Arc;

/// Python and CUDA failures that leave the workload wedged.
pub const DEFAULT_SIGNATURES: &[&str] = &[
    "torch.cuda.OutOfMemoryError",
    "TypeError: VanillaTemporalModule.forward()",
    "RuntimeError: Expected all tensors",
    "RuntimeError: The size of tensor a",
    "RuntimeError: CUDA error",
    "einops.EinopsError",
    "ZeroDivisionError",
    "ValueError: range",
];

/// Ordered, immutable set of substrings that mark a failed workload.
#[derive(Debug, Clone)]
pub struct FailureSignatures {
    patterns: Arc<[String]>,
}

impl FailureSignatures {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Signatures contained in `line`, in configured order.
    pub fn matching<'a>(&'a self, line: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.patterns
            .iter()
            .map(String::as_str)
            .filter(move |p| line.contains(p))
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.matching(line).next().is_some()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for FailureSignatures {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNATURES.iter().copied())
    }
}
