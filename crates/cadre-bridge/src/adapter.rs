//! `ChatAdapter` (§6): `postToChannel`/`onMessage` over whatever chat
//! platform is actually wired up. The trait is the seam; `StdoutChatAdapter`
//! is the local stand-in, the same shape as `cadre_intelligence::tool_resolver`'s
//! `Null*` providers.

use async_trait::async_trait;

/// Posts split on this many bytes (§6) so a single reply never exceeds the
/// chat platform's message-size limit.
pub const DEFAULT_POST_SPLIT_BYTES: usize = 1900;

#[async_trait]
pub trait ChatAdapter: Send + Sync {
    async fn post_to_channel(&self, channel: &str, text: &str);
}

/// Local stand-in: logs each chunk instead of calling out to a real chat
/// platform. Still performs the boundary split so callers exercise the same
/// code path they would against a real adapter.
pub struct StdoutChatAdapter {
    pub split_bytes: usize,
}

impl StdoutChatAdapter {
    pub fn new() -> Self {
        Self { split_bytes: DEFAULT_POST_SPLIT_BYTES }
    }
}

impl Default for StdoutChatAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatAdapter for StdoutChatAdapter {
    async fn post_to_channel(&self, channel: &str, text: &str) {
        for chunk in split_on_boundary(text, self.split_bytes) {
            tracing::info!(channel, "{chunk}");
        }
    }
}

/// Splits `text` into chunks no longer than `max_bytes`, preferring to break
/// on a newline boundary so a post never cuts a line in half when it doesn't
/// have to.
pub fn split_on_boundary(text: &str, max_bytes: usize) -> Vec<String> {
    if text.len() <= max_bytes {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max_bytes {
        let mut cut = max_bytes;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let break_at = rest[..cut].rfind('\n').map(|i| i + 1).unwrap_or(cut);
        let break_at = if break_at == 0 { cut } else { break_at };
        chunks.push(rest[..break_at].to_string());
        rest = &rest[break_at..];
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_on_boundary("hello", 1900);
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn long_text_splits_on_newline_boundary() {
        let line = "a".repeat(50);
        let text = format!("{line}\n{line}\n{line}\n{line}");
        let chunks = split_on_boundary(&text, 110);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 110);
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn falls_back_to_a_hard_cut_with_no_newline() {
        let text = "a".repeat(500);
        let chunks = split_on_boundary(&text, 200);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|c| c.len() <= 200));
    }

    #[tokio::test]
    async fn stdout_adapter_does_not_panic() {
        let adapter = StdoutChatAdapter::new();
        adapter.post_to_channel("#alerts", "all good").await;
    }
}
