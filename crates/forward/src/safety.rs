//! Redaction helpers for anything that ends up in logs or tool results.
//!
//! Backend URLs are often sandbox links with tokens in the query string, so they are never
//! logged or echoed verbatim.

use url::Url;

/// Longest prompt prefix written to logs.
pub const PROMPT_PREVIEW_CHARS: usize = 100;

/// Longest backend error body echoed back to the caller.
pub const ERROR_DETAIL_CHARS: usize = 500;

#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    // Best-effort: drop credentials + query + fragment.
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

/// Redact a URL given as a string; unparseable input is replaced wholesale.
#[must_use]
pub fn redact_url_str(raw: &str) -> String {
    Url::parse(raw).map_or_else(|_| "<invalid url>".to_string(), |u| redact_url(&u))
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

/// First `max_chars` characters of `s`, with a trailing `...` when something was cut.
#[must_use]
pub fn preview(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::{preview, redact_url, redact_url_str};
    use url::Url;

    #[test]
    fn redact_url_drops_credentials_query_and_fragment() {
        let u = Url::parse("https://user:pw@api.example.com/v1/chat?token=abc#frag").expect("url");
        assert_eq!(redact_url(&u), "https://api.example.com/v1/chat");
    }

    #[test]
    fn redact_url_str_handles_garbage() {
        assert_eq!(redact_url_str("not a url"), "<invalid url>");
    }

    #[test]
    fn preview_counts_chars_not_bytes() {
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("", 3), "");
    }
}
