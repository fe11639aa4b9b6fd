//! Stage 1 (Filter) and Stage 6 (Path cleaning) of the Diagnosis Pipeline.

const FAULT_KEYWORDS: &[&str] = &["error", "fail", "exception"];
const CONTEXT_WINDOW: usize = 5;
const TAIL_LINES: usize = 10;
const FALLBACK_LINES: usize = 50;
const SKIP_SENTINEL: &str = "... [Skipped content] ...";

/// Keeps lines matching a fault keyword plus a `±CONTEXT_WINDOW` window
/// around each, always keeping the unconditional last `TAIL_LINES` lines.
/// If no keyword is found anywhere, the law `filterLogs(log) ==
/// last-50-lines(log)` applies instead.
pub fn filter_logs(log: &str) -> String {
    let lines: Vec<&str> = log.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    let hits: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            let lower = line.to_lowercase();
            FAULT_KEYWORDS.iter().any(|kw| lower.contains(kw))
        })
        .map(|(i, _)| i)
        .collect();

    if hits.is_empty() {
        let start = lines.len().saturating_sub(FALLBACK_LINES);
        return lines[start..].join("\n");
    }

    let mut keep = vec![false; lines.len()];
    for &hit in &hits {
        let start = hit.saturating_sub(CONTEXT_WINDOW);
        let end = (hit + CONTEXT_WINDOW).min(lines.len() - 1);
        for flag in &mut keep[start..=end] {
            *flag = true;
        }
    }
    let tail_start = lines.len().saturating_sub(TAIL_LINES);
    for flag in &mut keep[tail_start..] {
        *flag = true;
    }

    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if keep[i] {
            out.push(lines[i].to_string());
            i += 1;
        } else {
            let gap_start = i;
            while i < lines.len() && !keep[i] {
                i += 1;
            }
            if i > gap_start {
                out.push(SKIP_SENTINEL.to_string());
            }
        }
    }
    out.join("\n")
}

/// Strips leading `./` and `/` from a diagnosed file path. An empty result
/// signals the caller should fall back to a code-search strategy.
pub fn clean_file_path(path: &str) -> String {
    let mut p = path.trim();
    while let Some(stripped) = p.strip_prefix("./") {
        p = stripped;
    }
    p.trim_start_matches('/').to_string()
}
