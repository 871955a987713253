//! HTML rendering of the recent-interactions panel

use crate::storage::Interaction;

/// Responses longer than this are cut and followed by `...`
pub const RESPONSE_PREVIEW_CHARS: usize = 300;

/// Escape text for use inside HTML element content or attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// First `max_chars` characters, with `...` appended when anything was cut
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Render interactions as the HTML block shown beside the chat
pub fn render_interactions(interactions: &[Interaction]) -> String {
    if interactions.is_empty() {
        return "<div class=\"interactions empty\"><p>No interactions yet.</p></div>".to_string();
    }

    let mut html = String::from("<div class=\"interactions\">\n");
    for item in interactions {
        let class = if item.is_fetch_error() {
            "interaction error"
        } else {
            "interaction"
        };
        html.push_str(&format!(
            "<div class=\"{}\">\
             <div class=\"meta\"><span class=\"timestamp\">{}</span> \
             <span class=\"elapsed\">{:.2}s</span></div>\
             <div class=\"prompt\"><strong>Prompt:</strong> {}</div>\
             <div class=\"response\"><strong>Response:</strong> {}</div>\
             </div>\n",
            class,
            escape_html(&item.timestamp),
            item.time_taken_sec,
            escape_html(&item.prompt),
            escape_html(&truncate_preview(&item.response, RESPONSE_PREVIEW_CHARS)),
        ));
    }
    html.push_str("</div>");
    html
}
