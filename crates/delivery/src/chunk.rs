// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Payload chunking for size-limited targets.

/// Split text into chunks of at most `limit` characters.
///
/// Prefers breaking at the last newline inside the window, falling back to
/// a hard split. Chunk indexes are the caller's concern; this function only
/// guarantees stable, deterministic output.
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    if limit == 0 || text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest: &str = text;
    while !rest.is_empty() {
        let chars: Vec<(usize, char)> = rest.char_indices().take(limit + 1).collect();
        if chars.len() <= limit {
            chunks.push(rest.to_string());
            break;
        }
        let window_end = chars[limit].0;
        let window = &rest[..window_end];
        let cut = match window.rfind('\n') {
            // A newline close to the end keeps paragraphs intact.
            Some(pos) if pos >= limit / 2 => pos + 1,
            _ => window_end,
        };
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    chunks.retain(|c| !c.is_empty());
    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}

#[cfg(test)]
#[path = "chunk_tests.rs"]
mod tests;
