//! Relevance- and priority-weighted context pruning to a token budget.
//!
//! Optimization runs in up to five passes: relevance floor, score
//! ordering, per-type compression of large items, greedy selection into
//! the target budget, and (when still over) summarization. Critical
//! items are exempt from every destructive pass; the budget is soft for
//! them.

use std::sync::LazyLock;
use tracing::debug;

use super::types::{ContextItem, ContextItemType};
use crate::cache::normalize_code;
use crate::config::ContextConfig;

/// Items larger than this are eligible for compression.
const COMPRESSION_THRESHOLD: usize = 1024;
/// Items larger than this are eligible for summarization.
const SUMMARIZATION_THRESHOLD: usize = 2048;

static OUTCOME_KEYWORDS: LazyLock<Vec<&'static str>> =
    LazyLock::new(|| vec!["error", "warning", "completed", "failed"]);

/// Result of one optimization run.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub items: Vec<ContextItem>,
    pub original_size: usize,
    pub final_size: usize,
    /// `final_size / original_size`; 1.0 when nothing changed.
    pub compression_ratio: f64,
    pub removed: Vec<String>,
    pub compressed: Vec<String>,
}

/// Budget-aware context optimizer.
pub struct ContextOptimizer {
    config: ContextConfig,
}

impl ContextOptimizer {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Optimize the given items to the configured target size.
    pub fn optimize(&self, items: Vec<ContextItem>) -> OptimizationResult {
        let target = self.config.effective_target();
        let original_size: usize = items.iter().map(ContextItem::size).sum();
        let mut removed = Vec::new();
        let mut compressed = Vec::new();

        // Pass 1: relevance floor; critical items are exempt.
        let mut survivors: Vec<ContextItem> = Vec::with_capacity(items.len());
        for item in items {
            if !item.is_critical() && item.relevance_score < self.config.min_relevance {
                removed.push(item.id);
            } else {
                survivors.push(item);
            }
        }

        // Pass 2: order by selection score, best first.
        survivors.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Pass 3: compress large non-critical items.
        if self.config.enable_compression {
            for item in survivors.iter_mut() {
                if !item.is_critical() && item.size() > COMPRESSION_THRESHOLD {
                    let before = item.size();
                    let candidate = compress(&item.content, item.item_type);
                    if candidate.len() < before {
                        item.content = candidate;
                        compressed.push(item.id.clone());
                    }
                }
            }
        }

        // Pass 4: greedy selection under the target; critical always in.
        let mut selected: Vec<ContextItem> = Vec::new();
        let mut total = 0usize;
        for item in survivors {
            if item.is_critical() {
                total += item.size();
                selected.push(item);
            } else if total + item.size() <= target {
                total += item.size();
                selected.push(item);
            } else {
                removed.push(item.id);
            }
        }

        // Pass 5: summarize large non-critical items if still over.
        if self.config.enable_summarization && total > target {
            for item in selected.iter_mut() {
                if total <= target {
                    break;
                }
                if item.is_critical() || item.size() <= SUMMARIZATION_THRESHOLD {
                    continue;
                }
                let before = item.size();
                let summary = summarize(&item.content, item.item_type);
                if summary.len() < before {
                    total -= before - summary.len();
                    item.content = summary;
                    if !compressed.contains(&item.id) {
                        compressed.push(item.id.clone());
                    }
                }
            }
        }

        let final_size: usize = selected.iter().map(ContextItem::size).sum();
        debug!(
            "Context optimized: {} -> {} bytes ({} removed, {} compressed)",
            original_size,
            final_size,
            removed.len(),
            compressed.len()
        );

        OptimizationResult {
            items: selected,
            original_size,
            final_size,
            compression_ratio: if original_size == 0 {
                1.0
            } else {
                final_size as f64 / original_size as f64
            },
            removed,
            compressed,
        }
    }
}

/// Type-specific lossless-ish compression.
fn compress(content: &str, item_type: ContextItemType) -> String {
    match item_type {
        ContextItemType::Code | ContextItemType::Tests => normalize_code(content),
        ContextItemType::Documentation | ContextItemType::Design | ContextItemType::Requirements => {
            strip_markdown_chrome(content)
        }
        ContextItemType::SessionHistory => retain_outcome_lines(content),
        _ => collapse_blank_lines(content),
    }
}

/// Markdown chrome removal: heading markers, emphasis, code fences.
fn strip_markdown_chrome(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            continue;
        }
        let stripped = trimmed
            .trim_start_matches('#')
            .trim_start_matches('>')
            .trim_start();
        let stripped = stripped.replace("**", "").replace('`', "");
        if stripped.is_empty() {
            continue;
        }
        out.push_str(&stripped);
        out.push('\n');
    }
    out
}

/// Keep only lines that report an outcome.
fn retain_outcome_lines(content: &str) -> String {
    content
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            OUTCOME_KEYWORDS.iter().any(|kw| lower.contains(kw))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_blank_lines(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last_blank = false;
    for line in content.lines() {
        let blank = line.trim().is_empty();
        if blank && last_blank {
            continue;
        }
        out.push_str(line.trim_end());
        out.push('\n');
        last_blank = blank;
    }
    out
}

/// Type-specific lossy summarization.
fn summarize(content: &str, item_type: ContextItemType) -> String {
    match item_type {
        ContextItemType::Documentation | ContextItemType::Design | ContextItemType::Requirements => {
            summarize_docs(content)
        }
        ContextItemType::Code | ContextItemType::Tests => summarize_code(content),
        _ => head_tail(content),
    }
}

/// Retain headings and bullets.
fn summarize_docs(content: &str) -> String {
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with('#')
                || trimmed.starts_with('-')
                || trimmed.starts_with('*')
                || trimmed.starts_with("1.")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Retain signatures and import lines.
fn summarize_code(content: &str) -> String {
    const SIGNATURE_STARTS: &[&str] = &[
        "fn ", "pub ", "struct ", "enum ", "trait ", "impl ", "mod ", "use ", "import ", "from ",
        "def ", "class ", "function ", "const ", "static ", "type ",
    ];
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            SIGNATURE_STARTS.iter().any(|s| trimmed.starts_with(s))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep the head and tail with an ellipsis between.
fn head_tail(content: &str) -> String {
    const KEEP: usize = 512;
    if content.len() <= KEEP * 2 {
        return content.to_string();
    }
    let head_end = content
        .char_indices()
        .take_while(|(i, _)| *i < KEEP)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let tail_start = content
        .char_indices()
        .find(|(i, _)| *i >= content.len() - KEEP)
        .map(|(i, _)| i)
        .unwrap_or(content.len());
    format!("{}\n…\n{}", &content[..head_end], &content[tail_start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::types::ContextPriority;
    use pretty_assertions::assert_eq;

    fn config(max_size: usize) -> ContextConfig {
        ContextConfig {
            max_size,
            target_size: 0,
            min_relevance: 0.1,
            enable_compression: true,
            enable_summarization: true,
        }
    }

    fn item(id: &str, size: usize, priority: ContextPriority, relevance: f64) -> ContextItem {
        ContextItem::new(id, "y".repeat(size), ContextItemType::Metadata, priority)
            .with_relevance(relevance)
    }

    #[test]
    fn test_low_relevance_items_dropped() {
        let optimizer = ContextOptimizer::new(config(100_000));
        let result = optimizer.optimize(vec![
            item("keep", 100, ContextPriority::Medium, 0.8),
            item("drop", 100, ContextPriority::Medium, 0.05),
        ]);

        assert_eq!(result.items.len(), 1);
        assert_eq!(result.removed, vec!["drop".to_string()]);
    }

    #[test]
    fn test_critical_exempt_from_relevance_floor() {
        let optimizer = ContextOptimizer::new(config(100_000));
        let result = optimizer.optimize(vec![item("c", 100, ContextPriority::Critical, 0.0)]);
        assert_eq!(result.items.len(), 1);
    }

    #[test]
    fn test_critical_never_removed_even_over_budget() {
        // Target is 80% of 1000 = 800; the critical item alone is 2000.
        let optimizer = ContextOptimizer::new(ContextConfig {
            enable_compression: false,
            enable_summarization: false,
            ..config(1_000)
        });
        let result = optimizer.optimize(vec![
            item("big-critical", 2_000, ContextPriority::Critical, 0.9),
            item("other", 300, ContextPriority::High, 0.9),
        ]);

        assert!(result.items.iter().any(|i| i.id == "big-critical"));
    }

    #[test]
    fn test_noncritical_respect_target_budget() {
        let optimizer = ContextOptimizer::new(ContextConfig {
            enable_compression: false,
            enable_summarization: false,
            ..config(1_000)
        });
        let result = optimizer.optimize(vec![
            item("a", 400, ContextPriority::High, 0.9),
            item("b", 400, ContextPriority::Medium, 0.9),
            item("c", 400, ContextPriority::Low, 0.9),
        ]);

        let non_critical: usize = result
            .items
            .iter()
            .filter(|i| !i.is_critical())
            .map(ContextItem::size)
            .sum();
        assert!(non_critical <= 800);
        assert!(!result.removed.is_empty());
    }

    #[test]
    fn test_code_compression_strips_comments() {
        let optimizer = ContextOptimizer::new(config(100_000));
        let code = format!(
            "fn main() {{\n    // {}\n    println!(\"hi\");\n}}\n",
            "padding ".repeat(200)
        );
        let result = optimizer.optimize(vec![ContextItem::new(
            "code",
            code,
            ContextItemType::Code,
            ContextPriority::Medium,
        )
        .with_relevance(0.9)]);

        assert_eq!(result.compressed, vec!["code".to_string()]);
        assert!(!result.items[0].content.contains("padding"));
        assert!(result.compression_ratio < 1.0);
    }

    #[test]
    fn test_session_history_keeps_outcome_lines() {
        let mut lines: Vec<String> = (0..100).map(|i| format!("step {i} running")).collect();
        lines.push("step 100 completed".to_string());
        lines.push("step 101 failed: io error".to_string());

        let optimizer = ContextOptimizer::new(config(100_000));
        let result = optimizer.optimize(vec![ContextItem::new(
            "history",
            lines.join("\n"),
            ContextItemType::SessionHistory,
            ContextPriority::Low,
        )
        .with_relevance(0.9)]);

        let content = &result.items[0].content;
        assert!(content.contains("completed"));
        assert!(content.contains("failed"));
        assert!(!content.contains("step 5 running"));
    }

    #[test]
    fn test_result_accounting() {
        let optimizer = ContextOptimizer::new(config(100_000));
        let result = optimizer.optimize(vec![
            item("a", 500, ContextPriority::Medium, 0.9),
            item("b", 500, ContextPriority::Medium, 0.05),
        ]);

        assert_eq!(result.original_size, 1_000);
        assert_eq!(result.final_size, 500);
        assert!((result.compression_ratio - 0.5).abs() < f64::EPSILON);
    }
}
