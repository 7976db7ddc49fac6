// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frontmatter splitting and rendering.

use crate::front::TicketFront;
use thiserror::Error;

/// Errors from ticket parsing.
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("missing frontmatter delimiter in {0}")]
    MissingFrontmatter(String),
    #[error("unterminated frontmatter in {0}")]
    UnterminatedFrontmatter(String),
    #[error("frontmatter parse failed in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Split a ticket file into frontmatter and body.
///
/// The file must start with a `---` line; the frontmatter runs to the next
/// `---` line. The body keeps its leading newline trimmed.
pub fn parse_ticket(content: &str, path: &str) -> Result<(TicketFront, String), TicketError> {
    let rest = content
        .strip_prefix("---")
        .ok_or_else(|| TicketError::MissingFrontmatter(path.to_string()))?;
    let rest = rest.strip_prefix('\n').unwrap_or(rest);

    // Empty frontmatter: the closing delimiter immediately follows.
    let (yaml, tail) = if let Some(tail) = rest.strip_prefix("---") {
        ("", tail)
    } else {
        let end = rest
            .find("\n---")
            .ok_or_else(|| TicketError::UnterminatedFrontmatter(path.to_string()))?;
        (&rest[..end + 1], &rest[end + 4..])
    };
    let body = tail.trim_start_matches('\n').to_string();

    let front: TicketFront = if yaml.trim().is_empty() {
        TicketFront::default()
    } else {
        serde_yaml::from_str(yaml).map_err(|source| TicketError::Yaml {
            path: path.to_string(),
            source,
        })?
    };

    Ok((front, body))
}

/// Render a ticket back to its file form.
pub fn render_ticket(front: &TicketFront, body: &str) -> Result<String, TicketError> {
    let yaml = serde_yaml::to_string(front).map_err(|source| TicketError::Yaml {
        path: String::new(),
        source,
    })?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 16);
    out.push_str("---\n");
    out.push_str(&yaml);
    out.push_str("---\n");
    if !body.is_empty() {
        out.push('\n');
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
