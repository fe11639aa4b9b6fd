//! Priority-ranked assembly of a bounded prompt context under a byte
//! budget, plus the `smart_thin_log` log compaction strategy nodes use
//! before handing a log to the LM.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

const ERROR_KEYWORDS: &[&str] = &[
    "error", "Error", "ERROR", "fail", "Fail", "FAIL", "exception", "Exception", "panic",
    "Traceback", "fatal", "Fatal",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Text,
    Code,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemType,
    pub priority: Priority,
    pub content: String,
}

impl ContextItem {
    pub fn new(
        id: impl Into<String>,
        kind: ItemType,
        priority: Priority,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            priority,
            content: content.into(),
        }
    }
}

/// How full a `ContextManager`'s byte budget is, and at what point that
/// should start worrying a caller.
#[derive(Debug, Clone)]
pub struct ContextUsage {
    pub used: usize,
    pub available: usize,
    pub total: usize,
    pub percentage: f64,
    pub warning_level: WarningLevel,
}

impl ContextUsage {
    pub fn new(used: usize, total: usize) -> Self {
        let available = total.saturating_sub(used);
        let percentage = if total == 0 {
            100.0
        } else {
            (used as f64 / total as f64) * 100.0
        };

        let warning_level = if percentage >= 95.0 {
            WarningLevel::Critical
        } else if percentage >= 85.0 {
            WarningLevel::High
        } else if percentage >= 70.0 {
            WarningLevel::Medium
        } else if percentage >= 50.0 {
            WarningLevel::Low
        } else {
            WarningLevel::None
        };

        Self {
            used,
            available,
            total,
            percentage,
            warning_level,
        }
    }

    pub fn is_approaching_limit(&self) -> bool {
        self.percentage >= 70.0
    }

    pub fn is_critical(&self) -> bool {
        matches!(self.warning_level, WarningLevel::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// A byte-budgeted assembly buffer. Items are added in any order;
/// `compile()` is the only place priority and the budget matter.
#[derive(Debug, Default)]
pub struct ContextManager {
    items: Vec<ContextItem>,
    byte_budget: usize,
}

impl ContextManager {
    pub fn new(byte_budget: usize) -> Self {
        Self {
            items: Vec::new(),
            byte_budget,
        }
    }

    pub fn add(&mut self, item: ContextItem) {
        self.items.push(item);
    }

    pub fn byte_budget(&self) -> usize {
        self.byte_budget
    }

    /// Concatenates items in descending priority order (ties broken by
    /// insertion order) until the budget is exhausted. Items that don't
    /// fit at all are dropped, lowest priority first; the item that
    /// straddles the remaining budget is truncated tail-first rather than
    /// dropped whole, so the assembled context always uses its full
    /// budget when there's more content than room.
    pub fn compile(&self) -> String {
        let mut ordered: Vec<&ContextItem> = self.items.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut out = String::new();
        let mut remaining = self.byte_budget;

        for item in ordered {
            if remaining == 0 {
                break;
            }
            let bytes = item.content.as_bytes();
            if bytes.len() <= remaining {
                if !out.is_empty() {
                    out.push('\n');
                    remaining = remaining.saturating_sub(1);
                }
                out.push_str(&item.content);
                remaining = remaining.saturating_sub(bytes.len());
            } else {
                if !out.is_empty() {
                    out.push('\n');
                    remaining = remaining.saturating_sub(1);
                }
                let truncated = truncate_to_byte_len(&item.content, remaining);
                out.push_str(truncated);
                remaining = 0;
            }
        }
        out
    }

    /// Usage against `byte_budget`, summing every item's raw content
    /// length regardless of whether `compile()` would drop or truncate it.
    /// Logs at warn when usage reaches `WarningLevel::Critical`.
    pub fn get_usage(&self) -> ContextUsage {
        let used: usize = self.items.iter().map(|item| item.content.len()).sum();
        let usage = ContextUsage::new(used, self.byte_budget);
        if usage.is_critical() {
            warn!(
                used = usage.used,
                total = usage.total,
                percentage = usage.percentage,
                "context usage critical"
            );
        }
        usage
    }

    pub fn is_approaching_limit(&self) -> bool {
        self.get_usage().is_approaching_limit()
    }

    pub fn is_critical(&self) -> bool {
        self.get_usage().is_critical()
    }

    /// Truncates long strings and large arrays in a tool response JSON
    /// value so it fits `max_bytes`, preserving structure over content.
    pub fn summarize_tool_response(&self, response: &Value, max_bytes: usize) -> Value {
        if response.to_string().len() <= max_bytes {
            return response.clone();
        }

        match response {
            Value::Object(map) => {
                let mut summarized = serde_json::Map::new();
                let bytes_per_field = max_bytes / map.len().max(1);

                for (key, value) in map {
                    let summarized_value = match value {
                        Value::String(s) if s.len() > 200 => {
                            let preview_len = bytes_per_field.min(200);
                            Value::String(format!(
                                "{}... [truncated {} chars]",
                                &s.chars().take(preview_len).collect::<String>(),
                                s.len()
                            ))
                        }
                        Value::Array(arr) if arr.len() > 10 => {
                            Value::String(format!("[Array with {} items - truncated]", arr.len()))
                        }
                        other => other.clone(),
                    };
                    summarized.insert(key.clone(), summarized_value);
                }
                Value::Object(summarized)
            }
            Value::Array(arr) if arr.len() > 10 => {
                let keep_count = (max_bytes / 10).min(5);
                let mut preview: Vec<Value> = arr.iter().take(keep_count).cloned().collect();
                preview.push(Value::String(format!(
                    "... {} more items truncated",
                    arr.len() - keep_count
                )));
                Value::Array(preview)
            }
            Value::String(s) if s.len() > 500 => {
                let preview_len = max_bytes.min(500);
                Value::String(format!(
                    "{}... [truncated {} chars]",
                    &s.chars().take(preview_len).collect::<String>(),
                    s.len()
                ))
            }
            other => other.clone(),
        }
    }
}

/// Truncates `s` to at most `max_bytes`, landing on a char boundary.
fn truncate_to_byte_len(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Reduces `log` to at most `max_lines` lines by keeping `±window_size`
/// lines around every line matching an error keyword, merging overlapping
/// windows, and replacing the gaps with
/// `"Smart Context: Skipped N lines"` markers. If no keyword matches at
/// all, falls back to the head and tail halves of the log joined by
/// `"Context Thinned"`.
pub fn smart_thin_log(log: &str, max_lines: usize) -> String {
    smart_thin_log_with_window(log, max_lines, 5)
}

pub fn smart_thin_log_with_window(log: &str, max_lines: usize, window_size: usize) -> String {
    let lines: Vec<&str> = log.lines().collect();
    if lines.len() <= max_lines {
        return log.to_string();
    }

    let hit_lines: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| ERROR_KEYWORDS.iter().any(|kw| line.contains(kw)))
        .map(|(i, _)| i)
        .collect();

    if hit_lines.is_empty() {
        let half = max_lines / 2;
        let head = &lines[..half.min(lines.len())];
        let tail_start = lines.len().saturating_sub(max_lines - half);
        let tail = &lines[tail_start..];
        let mut out = head.join("\n");
        out.push_str("\nContext Thinned\n");
        out.push_str(&tail.join("\n"));
        return out;
    }

    let mut windows: Vec<(usize, usize)> = hit_lines
        .iter()
        .map(|&i| {
            (
                i.saturating_sub(window_size),
                (i + window_size).min(lines.len().saturating_sub(1)),
            )
        })
        .collect();
    windows.sort_by_key(|w| w.0);

    let mut merged: Vec<(usize, usize)> = Vec::new();
    for window in windows {
        if let Some(last) = merged.last_mut() {
            if window.0 <= last.1 + 1 {
                last.1 = last.1.max(window.1);
                continue;
            }
        }
        merged.push(window);
    }

    let mut out = String::new();
    let mut cursor = 0usize;
    for (start, end) in merged {
        if start > cursor {
            let skipped = start - cursor;
            out.push_str(&format!("Smart Context: Skipped {skipped} lines\n"));
        }
        out.push_str(&lines[start..=end].join("\n"));
        out.push('\n');
        cursor = end + 1;
    }
    if cursor < lines.len() {
        let skipped = lines.len() - cursor;
        out.push_str(&format!("Smart Context: Skipped {skipped} lines"));
    }
    out.trim_end().to_string()
}
