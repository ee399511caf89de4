//! Mermaid flowchart export for a workflow graph (§4.5 "Export").

/// Sanitizes a node id for use as a Mermaid node identifier: whitespace and
/// `; : ,` become `_`; every other non-alphanumeric/underscore/hyphen
/// character is dropped.
pub fn sanitize_node_id(id: &str) -> String {
    id.chars()
        .filter_map(|c| {
            if c.is_whitespace() || matches!(c, ';' | ':' | ',') {
                Some('_')
            } else if c.is_alphanumeric() || c == '_' || c == '-' {
                Some(c)
            } else {
                None
            }
        })
        .collect()
}

/// Escapes a label for Mermaid's quoted-string node label syntax: `"` becomes
/// `#quot;`, `\` becomes `\\`.
pub fn escape_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '"' => out.push_str("#quot;"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}
