//! Markdown code-fence removal for model replies.
//!
//! Only boundary fences are touched: a leading ```` ```lang ```` line and a
//! trailing ```` ``` ````. Fences inside the body are left alone. The tag is
//! the rest of the opening line when that line has no whitespace (`c++`,
//! `python-repl`); otherwise only a leading word is taken as the tag.

const FENCE: &str = "```";

/// Strip boundary fences and surrounding whitespace. Idempotent.
pub fn strip_code_fences(text: &str) -> String {
    let mut current = text.trim();
    loop {
        let next = strip_once(current);
        if next.len() == current.len() {
            return current.to_string();
        }
        current = next;
    }
}

fn strip_once(text: &str) -> &str {
    let mut body = text;

    if let Some(rest) = body.strip_prefix(FENCE) {
        let line_len = rest.find('\n').unwrap_or(rest.len());
        let tag_len = if rest[..line_len].contains(char::is_whitespace) {
            rest.find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len())
        } else {
            line_len
        };
        body = &rest[tag_len..];
    }

    if let Some(rest) = body.strip_suffix(FENCE) {
        body = rest;
    }

    body.trim()
}
