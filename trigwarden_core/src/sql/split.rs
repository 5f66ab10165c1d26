/// Splits a SQL script into statements on `;`, ignoring semicolons inside
/// single-quoted strings, double-quoted identifiers and dollar-quoted bodies.
/// `--` line comments outside quotes are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    let chars: Vec<char> = script.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut dollar_tag: Option<String> = None;
    let mut in_single = false;
    let mut in_double = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(tag) = &dollar_tag {
            if c == '$' && matches_at(&chars, i, tag) {
                current.push_str(tag);
                i += tag.chars().count();
                dollar_tag = None;
            } else {
                current.push(c);
                i += 1;
            }
            continue;
        }

        if in_single {
            current.push(c);
            if c == '\'' {
                in_single = false;
            }
            i += 1;
            continue;
        }

        if in_double {
            current.push(c);
            if c == '"' {
                in_double = false;
            }
            i += 1;
            continue;
        }

        match c {
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '\'' => {
                in_single = true;
                current.push(c);
                i += 1;
            }
            '"' => {
                in_double = true;
                current.push(c);
                i += 1;
            }
            '$' => match read_dollar_tag(&chars, i) {
                Some(tag) => {
                    current.push_str(&tag);
                    i += tag.chars().count();
                    dollar_tag = Some(tag);
                }
                None => {
                    current.push(c);
                    i += 1;
                }
            },
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
                i += 1;
            }
            _ => {
                current.push(c);
                i += 1;
            }
        }
    }
    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}

/// Reads `$tag$` (tag may be empty) starting at `start`.
fn read_dollar_tag(chars: &[char], start: usize) -> Option<String> {
    let mut end = start + 1;
    while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
        end += 1;
    }
    if chars.get(end) == Some(&'$') {
        Some(chars[start..=end].iter().collect())
    } else {
        None
    }
}

fn matches_at(chars: &[char], start: usize, tag: &str) -> bool {
    tag.chars()
        .enumerate()
        .all(|(offset, c)| chars.get(start + offset) == Some(&c))
}
