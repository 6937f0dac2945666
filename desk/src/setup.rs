//! Community onboarding.

use crate::environment::TicketEnvironment;
use std::fmt::Write as _;
use ticketdesk_core::config::CommunityTicketConfig;
use ticketdesk_core::error::TicketError;
use ticketdesk_core::ids::{ChannelId, CommunityId, MessageId};

/// Name of the category holding ticket channels.
pub const CATEGORY_NAME: &str = "tickets";

/// Name of the channel where users request tickets.
pub const CREATION_CHANNEL_NAME: &str = "create-ticket";

/// Result of a setup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// The community is now configured.
    Configured {
        /// New ticket category
        category: ChannelId,
        /// New creation channel
        creation_channel: ChannelId,
        /// Prompt posted in the creation channel
        creation_message: MessageId,
    },
    /// A category was already bound. Nothing changed.
    AlreadyConfigured,
}

fn creation_prompt(config: &CommunityTicketConfig) -> String {
    let mut prompt = String::from("Need help? Request a ticket and a moderator will join you.\n");
    for ticket_type in config.ticket_types.iter() {
        let _ = write!(prompt, "\n- `{}`: {}", ticket_type.name, ticket_type.label);
    }
    prompt
}

/// Create the ticket category and the creation channel, post the creation
/// prompt and bind all three in the community configuration.
///
/// # Errors
///
/// - [`TicketError::ChannelCreation`] if the category or channel cannot be created
/// - [`TicketError::Transport`] if the prompt cannot be posted
/// - [`TicketError::Repository`] on store failure
#[tracing::instrument(skip(env))]
pub async fn setup(
    env: &TicketEnvironment,
    community: CommunityId,
) -> Result<SetupOutcome, TicketError> {
    let mut config = env.repository.load_config(community).await?;
    if config.is_configured() {
        tracing::info!("Community already configured");
        return Ok(SetupOutcome::AlreadyConfigured);
    }

    let category = env
        .transport
        .create_category(community, CATEGORY_NAME.to_string())
        .await
        .map_err(TicketError::ChannelCreation)?;
    let creation_channel = env
        .transport
        .create_channel(
            community,
            CREATION_CHANNEL_NAME.to_string(),
            Some(category),
            Vec::new(),
        )
        .await
        .map_err(TicketError::ChannelCreation)?;
    let creation_message = env
        .transport
        .send_message(creation_channel, creation_prompt(&config))
        .await?;

    config.category = Some(category);
    config.creation_channel = Some(creation_channel);
    config.creation_message = Some(creation_message);
    env.repository.save_config(config).await?;

    tracing::info!(%category, %creation_channel, "Community configured for tickets");
    Ok(SetupOutcome::Configured {
        category,
        creation_channel,
        creation_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketdesk_core::config::{TicketType, TicketTypeCatalog};

    #[test]
    fn test_prompt_lists_catalog() {
        let mut config = CommunityTicketConfig::with_defaults(CommunityId::new(1));
        config.ticket_types = TicketTypeCatalog::new([
            TicketType::new("general", "General support"),
            TicketType::new("appeal", "Ban appeal"),
        ]);

        let prompt = creation_prompt(&config);

        assert!(prompt.contains("`general`: General support"));
        assert!(prompt.contains("`appeal`: Ban appeal"));
    }
}
