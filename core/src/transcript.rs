//! Captured channel history.

use crate::ids::{CommunityId, TicketId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::Write as _;

/// One normalized message of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// When the message was posted
    pub timestamp: DateTime<Utc>,
    /// Who posted it
    pub author: UserId,
    /// Message text, or a placeholder for attachment-only messages
    pub text: String,
    /// Attachment file names. Most messages carry none or one.
    pub attachments: SmallVec<[String; 2]>,
}

/// Immutable transcript of a ticket channel, written once at close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    /// Owning community
    pub community: CommunityId,
    /// Ticket the transcript belongs to
    pub ticket: TicketId,
    /// Entries, oldest first
    pub entries: Vec<TranscriptEntry>,
    /// When the history was read
    pub captured_at: DateTime<Utc>,
}

impl TranscriptRecord {
    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no human message was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as plain text, one line per entry.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "Transcript of ticket #{} (captured {})\n",
            self.ticket,
            self.captured_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        for entry in &self.entries {
            let _ = write!(
                out,
                "[{}] {}: {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.author,
                entry.text
            );
            if !entry.attachments.is_empty() {
                let _ = write!(out, " [attachments: {}]", entry.attachments.join(", "));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_render_text_lists_entries_in_order() {
        let at = DateTime::parse_from_rfc3339("2025-01-01T10:00:00Z")
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default();
        let record = TranscriptRecord {
            community: CommunityId::new(1),
            ticket: TicketId::new(4),
            entries: vec![
                TranscriptEntry {
                    timestamp: at,
                    author: UserId::new(10),
                    text: "hello".to_string(),
                    attachments: SmallVec::new(),
                },
                TranscriptEntry {
                    timestamp: at,
                    author: UserId::new(11),
                    text: "see log".to_string(),
                    attachments: smallvec!["crash.log".to_string()],
                },
            ],
            captured_at: at,
        };

        let text = record.render_text();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Transcript of ticket #4"));
        assert_eq!(lines[1], "[2025-01-01 10:00:00] 10: hello");
        assert_eq!(lines[2], "[2025-01-01 10:00:00] 11: see log [attachments: crash.log]");
    }
}
