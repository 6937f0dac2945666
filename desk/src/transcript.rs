//! Transcript capture.

use crate::environment::TicketEnvironment;
use ticketdesk_core::environment::HistoryMessage;
use ticketdesk_core::error::{TicketError, TransportError};
use ticketdesk_core::ids::{ChannelId, CommunityId, TicketId};
use ticketdesk_core::transcript::{TranscriptEntry, TranscriptRecord};

/// Text stored for a message that only carried attachments.
pub const ATTACHMENT_PLACEHOLDER: &str = "[attachment]";

/// Text stored for a human message with neither text nor attachments.
pub const EMPTY_PLACEHOLDER: &str = "[no text content]";

/// Reads a ticket channel's history into a [`TranscriptRecord`].
///
/// Capture does not persist anything; the record is written by the
/// closing transition together with the status change.
#[derive(Debug, Clone)]
pub struct TranscriptRecorder {
    env: TicketEnvironment,
}

impl TranscriptRecorder {
    /// Create a recorder.
    #[must_use]
    pub const fn new(env: TicketEnvironment) -> Self {
        Self { env }
    }

    /// Capture the full history of `channel`, oldest first.
    ///
    /// An empty channel yields an empty, valid transcript.
    ///
    /// # Errors
    ///
    /// - [`TicketError::ChannelGone`] if the channel no longer exists
    /// - [`TicketError::Transport`] for any other transport failure
    #[tracing::instrument(skip(self))]
    pub async fn capture(
        &self,
        community: CommunityId,
        ticket: TicketId,
        channel: ChannelId,
    ) -> Result<TranscriptRecord, TicketError> {
        let history = self
            .env
            .transport
            .fetch_history(channel)
            .await
            .map_err(|e| match e {
                TransportError::ChannelGone(gone) => TicketError::ChannelGone(gone),
                other => TicketError::Transport(other),
            })?;

        let entries = normalize(history);
        tracing::debug!(entries = entries.len(), "Transcript captured");

        Ok(TranscriptRecord {
            community,
            ticket,
            entries,
            captured_at: self.env.clock.now(),
        })
    }

    /// Render a transcript as plain text for export.
    #[must_use]
    pub fn render(record: &TranscriptRecord) -> String {
        record.render_text()
    }
}

/// Drop contentless automated messages and normalize the rest.
#[must_use]
pub fn normalize(history: Vec<HistoryMessage>) -> Vec<TranscriptEntry> {
    history
        .into_iter()
        .filter(|m| !(m.author_is_bot && m.content.trim().is_empty() && m.attachments.is_empty()))
        .map(|m| {
            let text = if !m.content.trim().is_empty() {
                m.content
            } else if m.attachments.is_empty() {
                EMPTY_PLACEHOLDER.to_string()
            } else {
                ATTACHMENT_PLACEHOLDER.to_string()
            };
            TranscriptEntry {
                timestamp: m.timestamp,
                author: m.author,
                text,
                attachments: m.attachments.into_iter().collect(),
            }
        })
        .collect()
}
