//! Removal of `<think>` / `<thinking>` reasoning blocks from model replies

/// Shown instead of an empty reply
pub const NO_RESPONSE: &str = "⚠️ (no response)";

const BLOCKS: [(&str, &str); 2] = [("<think>", "</think>"), ("<thinking>", "</thinking>")];

/// Strip every well-formed reasoning block (and the whitespace after it),
/// then trim. Unterminated blocks are left in place.
///
/// Removal repeats until nothing changes, so `strip_reasoning` is idempotent
/// even when removing one block splices the pieces of another together.
pub fn strip_reasoning(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = strip_blocks_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current.trim().to_string()
}

/// [`strip_reasoning`] plus the empty-reply placeholder
pub fn clean_reply(raw: &str) -> String {
    let cleaned = strip_reasoning(raw);
    if cleaned.is_empty() {
        NO_RESPONSE.to_string()
    } else {
        cleaned
    }
}

fn strip_blocks_once(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    loop {
        // Earliest opening tag that has a closing tag after it
        let block = BLOCKS
            .iter()
            .filter_map(|(open, close)| {
                let start = rest.find(open)?;
                let body = start + open.len();
                let end = body + rest[body..].find(close)? + close.len();
                Some((start, end))
            })
            .min_by_key(|(start, _)| *start);

        match block {
            Some((start, end)) => {
                out.push_str(&rest[..start]);
                rest = rest[end..].trim_start();
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}
