//! Splitting reasoning from answer in a `<think>…</think>` content stream.
//!
//! The thinking model embeds its deliberation inline in the content, with
//! a quirk: the opening `<think>` is usually omitted — the stream simply
//! begins in reasoning mode and the first `</think>` marks the switch to
//! the answer. Tokens arrive in arbitrary-sized chunks, so the closing tag
//! can be split across up to eight deltas; the parser holds back any
//! trailing partial tag until the next chunk decides what it was.

const CLOSE_TAG: &str = "</think>";

/// Incremental splitter. Starts in reasoning mode.
///
/// Concatenating every emitted segment reproduces the input exactly, with
/// each literal `</think>` removed; the reasoning flag is true precisely
/// for text before the first tag.
pub struct ThinkingTagParser {
    inside_thinking: bool,
    buffer: String,
}

impl Default for ThinkingTagParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkingTagParser {
    pub fn new() -> Self {
        Self {
            inside_thinking: true,
            buffer: String::new(),
        }
    }

    /// Feed one delta; returns `(segment, is_reasoning)` pairs in order.
    /// Every returned segment is non-empty.
    pub fn process_chunk(&mut self, delta: &str) -> Vec<(String, bool)> {
        self.buffer.push_str(delta);
        let mut segments = Vec::new();

        loop {
            if let Some(pos) = self.buffer.find(CLOSE_TAG) {
                if pos > 0 {
                    segments.push((self.buffer[..pos].to_owned(), self.inside_thinking));
                }
                self.buffer.drain(..pos + CLOSE_TAG.len());
                self.inside_thinking = false;
                continue;
            }

            // No full tag. Hold back a trailing partial `</think>` prefix;
            // everything before it is safe to emit.
            let held = partial_tag_suffix(&self.buffer);
            let emit_len = self.buffer.len() - held;
            if emit_len > 0 {
                let text: String = self.buffer.drain(..emit_len).collect();
                segments.push((text, self.inside_thinking));
            }
            break;
        }

        segments
    }

    /// End of stream: whatever is still held back was literal text after
    /// all, not a tag.
    pub fn flush(&mut self) -> Option<(String, bool)> {
        if self.buffer.is_empty() {
            return None;
        }
        Some((std::mem::take(&mut self.buffer), self.inside_thinking))
    }
}

/// Length of the longest proper prefix of `</think>` that ends `buffer`.
fn partial_tag_suffix(buffer: &str) -> usize {
    let max = (CLOSE_TAG.len() - 1).min(buffer.len());
    for len in (1..=max).rev() {
        if buffer.ends_with(&CLOSE_TAG[..len]) {
            return len;
        }
    }
    0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Non-streaming variant
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Split a complete content string into `(reasoning, answer)`.
///
/// Used on the blocking path, where the opening tag is typically present:
/// a full `<think>…</think>` block is extracted when one exists; otherwise
/// everything before the first bare `</think>` counts as reasoning; with
/// no tag at all the content is entirely answer.
pub fn split_reasoning(content: &str) -> (Option<String>, String) {
    let block = regex::Regex::new(r"(?s)<think>(.*?)</think>").expect("static pattern");
    if let Some(caps) = block.captures(content) {
        let whole = caps.get(0).expect("match");
        let reasoning = caps.get(1).map(|m| m.as_str().to_owned());
        let mut answer = String::with_capacity(content.len() - whole.len());
        answer.push_str(&content[..whole.start()]);
        answer.push_str(&content[whole.end()..]);
        return (reasoning.filter(|r| !r.is_empty()), answer);
    }

    if let Some(pos) = content.find(CLOSE_TAG) {
        let reasoning = &content[..pos];
        let answer = &content[pos + CLOSE_TAG.len()..];
        return (
            Some(reasoning.to_owned()).filter(|r| !r.is_empty()),
            answer.to_owned(),
        );
    }

    (None, content.to_owned())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
