// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket discovery, ordering, and mutation.

use crate::front::TicketFront;
use crate::parse::{parse_ticket, render_ticket, TicketError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One parsed ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    /// Numeric index from the filename (`TICKET-007.md` → 7).
    pub index: u64,
    pub path: PathBuf,
    pub front: TicketFront,
    pub body: String,
}

impl Ticket {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// The ticket set of one repo, sorted by index (ties by filename).
#[derive(Debug, Default)]
pub struct TicketSet {
    pub tickets: Vec<Ticket>,
    /// Files that looked like tickets but failed to parse. The run records
    /// these as errors without halting.
    pub malformed: Vec<(PathBuf, String)>,
}

impl TicketSet {
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty() && self.malformed.is_empty()
    }

    /// Lowest-index ticket that is not done and not excluded.
    ///
    /// `excluded` holds indexes skipped for the rest of the run (terminal
    /// error markers).
    pub fn next_open(&self, excluded: &dyn Fn(u64) -> bool) -> Option<&Ticket> {
        self.tickets
            .iter()
            .find(|t| !t.front.done && !excluded(t.index))
    }
}

/// Parse the numeric index out of a `TICKET-NNN.md` filename.
fn ticket_index(name: &str) -> Option<u64> {
    let digits = name.strip_prefix("TICKET-")?.strip_suffix(".md")?;
    let numeric: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
    if numeric.is_empty() {
        return None;
    }
    numeric.parse().ok()
}

/// Read every ticket under `tickets_dir`, sorted by index then filename.
///
/// A missing directory yields an empty set. Malformed tickets are collected,
/// not fatal.
pub fn discover_tickets(tickets_dir: &Path) -> Result<TicketSet, TicketError> {
    let mut set = TicketSet::default();
    let entries = match fs::read_dir(tickets_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(set),
        Err(source) => {
            return Err(TicketError::Io {
                path: tickets_dir.display().to_string(),
                source,
            })
        }
    };

    for entry in entries {
        let entry = entry.map_err(|source| TicketError::Io {
            path: tickets_dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(index) = ticket_index(&name) else {
            continue;
        };

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable ticket");
                set.malformed.push((path, e.to_string()));
                continue;
            }
        };
        match parse_ticket(&content, &name) {
            Ok((front, body)) => set.tickets.push(Ticket {
                index,
                path,
                front,
                body,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed ticket");
                set.malformed.push((path, e.to_string()));
            }
        }
    }

    set.tickets
        .sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.path.cmp(&b.path)));
    Ok(set)
}

/// Rewrite a ticket with `done: true`, preserving body and unknown keys.
pub fn mark_ticket_done(path: &Path) -> Result<(), TicketError> {
    let name = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| TicketError::Io {
        path: name.clone(),
        source,
    })?;
    let (mut front, body) = parse_ticket(&content, &name)?;
    front.done = true;
    let rendered = render_ticket(&front, &body)?;
    fs::write(path, rendered).map_err(|source| TicketError::Io { path: name, source })?;
    Ok(())
}

#[cfg(test)]
#[path = "set_tests.rs"]
mod tests;
