//! Stage 5 of the Diagnosis Pipeline: sanitizing a raw `suggestedCommand`
//! the LM returned, which frequently arrives wrapped in markdown, a label
//! prefix, or prose.

const LABEL_PREFIXES: &[&str] = &["action:", "command:", "run:", "cmd:", "execute:", "shell:"];

const SHELL_KEYWORDS: &[&str] = &[
    "npm", "pnpm", "yarn", "git", "docker", "pip", "python", "node", "sh", "bash", "pytest",
    "jest", "vitest", "rm", "cp", "mv", "ls", "echo", "grep", "cat",
];

const MAX_PASSES: usize = 8;

/// Applying this function to its own output is the identity.
pub fn clean_suggested_command(raw: &str) -> String {
    let mut s = raw.trim().to_string();
    s = strip_markdown_fences(&s);
    s = s.trim().to_string();

    // A label can be hidden inside a matched quote pair (`"Command: npm
    // test"`) and a quote pair can be hidden behind a label in turn, so a
    // single pass over label/quote/description stripping isn't enough to
    // reach a fixed point. Loop until a pass changes nothing.
    for _ in 0..MAX_PASSES {
        let before = s.clone();
        s = strip_label_prefix(&s);
        s = s.trim().to_string();
        s = reduce_to_command_line(&s);
        s = strip_description_prefix(&s);
        s = strip_matched_quotes(&s);
        s = s.trim().to_string();
        if s == before {
            break;
        }
    }

    s
}

fn strip_markdown_fences(s: &str) -> String {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_alphabetic());
        let rest = rest.trim_start_matches('\n');
        if let Some(end) = rest.rfind("```") {
            return rest[..end].to_string();
        }
        return rest.to_string();
    }
    trimmed.to_string()
}

fn strip_label_prefix(s: &str) -> String {
    let lower = s.to_lowercase();
    for label in LABEL_PREFIXES {
        if lower.starts_with(label) {
            return s[label.len()..].trim_start().to_string();
        }
    }
    s.to_string()
}

/// Multiline blobs are reduced to the single line that starts with a
/// shell keyword, falling back to the last non-empty line.
fn reduce_to_command_line(s: &str) -> String {
    let lines: Vec<&str> = s.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() <= 1 {
        return s.to_string();
    }
    for line in &lines {
        if starts_with_shell_keyword(line) {
            return line.to_string();
        }
    }
    lines.last().copied().unwrap_or(s).to_string()
}

fn starts_with_shell_keyword(line: &str) -> bool {
    let first_word = line.split_whitespace().next().unwrap_or("");
    SHELL_KEYWORDS.contains(&first_word)
}

/// Strips a leading `"Description: "` prefix where the description is
/// plainly prose — multi-word, and its first word is not itself a shell
/// keyword. This must NOT fire on `echo "Value: 123"`, where the colon is
/// inside the quoted payload rather than a label separator.
fn strip_description_prefix(s: &str) -> String {
    if starts_with_shell_keyword(s) {
        return s.to_string();
    }
    let Some(colon_pos) = find_unquoted_colon(s) else {
        return s.to_string();
    };
    let description = s[..colon_pos].trim();
    let rest = s[colon_pos + 1..].trim();
    if description.split_whitespace().count() >= 2 && !rest.is_empty() {
        rest.to_string()
    } else {
        s.to_string()
    }
}

fn find_unquoted_colon(s: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut quote_char = '"';
    for (i, c) in s.char_indices() {
        match c {
            '"' | '\'' => {
                if in_quotes && c == quote_char {
                    in_quotes = false;
                } else if !in_quotes {
                    in_quotes = true;
                    quote_char = c;
                }
            }
            ':' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

fn strip_matched_quotes(s: &str) -> String {
    let trimmed = s.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}
