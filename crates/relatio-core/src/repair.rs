//! Best-effort repair of truncated or malformed generated JSON.
//!
//! Model output is frequently cut off mid-object or prefixed with prose.
//! The repair pass finds the payload start, balances brackets with a
//! string-aware depth scan, trims trailing fragments, and closes whatever
//! remains open. The result may still fail to parse; callers must treat a
//! second parse failure as an empty result, not a fatal error.

/// Repair `text` into something that is more likely to parse as JSON.
/// Text containing no `[` or `{` is returned unchanged.
pub fn repair_json(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let start = match (text.find('['), text.find('{')) {
        (Some(bracket), Some(brace)) => Some(bracket.min(brace)),
        (Some(bracket), None) => Some(bracket),
        (None, Some(brace)) => Some(brace),
        (None, None) => None,
    };
    let Some(start) = start else {
        return text.to_string();
    };

    // Depth scan, ignoring structural characters inside string literals.
    let target = text[start..].trim();
    let mut braces: i32 = 0;
    let mut brackets: i32 = 0;
    let mut in_string = false;
    let mut escape = false;
    for ch in target.chars() {
        if ch == '"' && !escape {
            in_string = !in_string;
        }
        if !in_string {
            match ch {
                '{' => braces += 1,
                '}' => braces -= 1,
                '[' => brackets += 1,
                ']' => brackets -= 1,
                _ => {}
            }
        }
        escape = ch == '\\' && !escape;
    }

    // Trim trailing commas, dangling colons, open quotes, and partial
    // property names left by mid-token truncation.
    let mut repaired = target.to_string();
    while let Some(last) = repaired.chars().last() {
        if last == '}' || last == ']' {
            break;
        }
        if last == ',' || last == ':' || last == '"' || last.is_alphanumeric() {
            repaired.pop();
            repaired.truncate(repaired.trim_end().len());
        } else {
            break;
        }
    }

    for _ in 0..braces.max(0) {
        repaired.push('}');
    }
    for _ in 0..brackets.max(0) {
        repaired.push(']');
    }
    repaired
}
