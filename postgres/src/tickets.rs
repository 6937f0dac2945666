//! `PostgreSQL` implementation of [`TicketRepository`].

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::{Connection, Row};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow, Postgres};
use std::time::Duration;
use ticketdesk_core::config::{CommunityTicketConfig, TicketTypeCatalog};
use ticketdesk_core::error::RepositoryError;
use ticketdesk_core::ids::{ChannelId, CommunityId, MessageId, RoleId, TicketId, UserId};
use ticketdesk_core::repository::{ConditionalUpdate, QuotaInsert, Result, TicketRepository};
use ticketdesk_core::ticket::{Closer, Closure, NewTicket, Ticket, TicketStats, TicketStatus};
use ticketdesk_core::transcript::{TranscriptEntry, TranscriptRecord};

// Platform snowflakes fit in 63 bits; the cast is lossless for real ids.
#[allow(clippy::cast_possible_wrap)]
const fn to_db(raw: u64) -> i64 {
    raw as i64
}

#[allow(clippy::cast_sign_loss)]
const fn from_db(raw: i64) -> u64 {
    raw as u64
}

fn database(context: &'static str) -> impl FnOnce(sqlx::Error) -> RepositoryError {
    move |e| RepositoryError::Database(format!("{context}: {e}"))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| RepositoryError::Serialization(format!("Column {name}: {e}")))
}

fn closer_columns(closer: Closer) -> (&'static str, Option<i64>) {
    match closer {
        Closer::Moderator(user) => ("moderator", Some(to_db(user.get()))),
        Closer::System => ("system", None),
    }
}

fn row_to_ticket(row: &PgRow) -> Result<Ticket> {
    let status: String = column(row, "status")?;
    let kind: Option<String> = column(row, "closed_by_kind")?;
    let closed_by_user: Option<i64> = column(row, "closed_by_user")?;
    let closed_by = match kind.as_deref() {
        None => None,
        Some("system") => Some(Closer::System),
        Some("moderator") => {
            let user = closed_by_user.ok_or_else(|| {
                RepositoryError::Serialization("Moderator closure without user".to_string())
            })?;
            Some(Closer::Moderator(UserId::new(from_db(user))))
        }
        Some(other) => {
            return Err(RepositoryError::Serialization(format!(
                "Invalid closer kind: {other}"
            )));
        }
    };
    let participants: Vec<i64> = column(row, "participants")?;

    Ok(Ticket {
        community: CommunityId::new(from_db(column(row, "community_id")?)),
        id: TicketId::new(from_db(column(row, "id")?)),
        author: UserId::new(from_db(column(row, "author_id")?)),
        moderator: column::<Option<i64>>(row, "moderator_id")?.map(|m| UserId::new(from_db(m))),
        ticket_type: column(row, "ticket_type")?,
        status: TicketStatus::parse(&status)?,
        channel: ChannelId::new(from_db(column(row, "channel_id")?)),
        created_at: column(row, "created_at")?,
        closed_at: column(row, "closed_at")?,
        close_reason: column(row, "close_reason")?,
        closed_by,
        transcript_complete: column(row, "transcript_complete")?,
        participants: participants
            .into_iter()
            .map(|p| UserId::new(from_db(p)))
            .collect(),
    })
}

fn row_to_config(row: &PgRow) -> Result<CommunityTicketConfig> {
    let optional_id = |name: &str| -> Result<Option<u64>> {
        Ok(column::<Option<i64>>(row, name)?.map(from_db))
    };
    let ticket_types: serde_json::Value = column(row, "ticket_types")?;
    let ticket_types: TicketTypeCatalog = serde_json::from_value(ticket_types)
        .map_err(|e| RepositoryError::Serialization(format!("ticket_types: {e}")))?;
    let numeric = |e: std::num::TryFromIntError| RepositoryError::Serialization(e.to_string());

    Ok(CommunityTicketConfig {
        community: CommunityId::new(from_db(column(row, "community_id")?)),
        category: optional_id("category_id")?.map(ChannelId::new),
        creation_channel: optional_id("creation_channel_id")?.map(ChannelId::new),
        creation_message: optional_id("creation_message_id")?.map(MessageId::new),
        log_channel: optional_id("log_channel_id")?.map(ChannelId::new),
        support_role: optional_id("support_role_id")?.map(RoleId::new),
        max_open_tickets: u32::try_from(column::<i32>(row, "max_open_tickets")?).map_err(numeric)?,
        cooldown_secs: u64::try_from(column::<i64>(row, "cooldown_secs")?).map_err(numeric)?,
        auto_close_hours: u32::try_from(column::<i32>(row, "auto_close_hours")?).map_err(numeric)?,
        welcome_text: column(row, "welcome_text")?,
        ticket_types,
    })
}

/// `PostgreSQL` ticket repository.
///
/// Every guarded transition is a single `UPDATE ... WHERE <guard>
/// RETURNING *`. When no row comes back the current row is re-read and
/// reported as [`ConditionalUpdate::Rejected`].
#[derive(Clone, Debug)]
pub struct PostgresTicketRepository {
    pool: PgPool,
}

impl PostgresTicketRepository {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the pool cannot connect.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .map_err(database("Failed to connect"))?;

        Ok(Self::new(pool))
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_ticket(&self, community: CommunityId, id: TicketId) -> Result<Option<Ticket>> {
        let row = sqlx::query("SELECT * FROM tickets WHERE community_id = $1 AND id = $2")
            .bind(to_db(community.get()))
            .bind(to_db(id.get()))
            .fetch_optional(&self.pool)
            .await
            .map_err(database("Failed to load ticket"))?;

        row.as_ref().map(row_to_ticket).transpose()
    }

    /// Resolve a conditional update whose guard may have failed.
    async fn resolve(
        &self,
        op: &'static str,
        community: CommunityId,
        id: TicketId,
        updated: Option<PgRow>,
    ) -> Result<ConditionalUpdate> {
        if let Some(row) = updated {
            return Ok(ConditionalUpdate::Applied(row_to_ticket(&row)?));
        }
        match self.fetch_ticket(community, id).await? {
            Some(current) => {
                tracing::debug!(op, %community, ticket = %id, "Conditional update rejected");
                metrics::counter!("ticket_repository_conflicts_total", "op" => op).increment(1);
                Ok(ConditionalUpdate::Rejected(current))
            }
            None => Ok(ConditionalUpdate::NotFound),
        }
    }
}

impl TicketRepository for PostgresTicketRepository {
    fn load_config(&self, community: CommunityId) -> BoxFuture<'_, Result<CommunityTicketConfig>> {
        Box::pin(async move {
            let select = "SELECT * FROM ticket_configs WHERE community_id = $1";
            let existing = sqlx::query(select)
                .bind(to_db(community.get()))
                .fetch_optional(&self.pool)
                .await
                .map_err(database("Failed to load config"))?;
            if let Some(row) = existing {
                return row_to_config(&row);
            }

            // Lazily create; a concurrent creator may win, hence DO NOTHING and re-read.
            let defaults = CommunityTicketConfig::with_defaults(community);
            insert_config(&self.pool, &defaults, false).await?;
            let row = sqlx::query(select)
                .bind(to_db(community.get()))
                .fetch_one(&self.pool)
                .await
                .map_err(database("Failed to load config"))?;
            row_to_config(&row)
        })
    }

    fn save_config(&self, config: CommunityTicketConfig) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { insert_config(&self.pool, &config, true).await })
    }

    fn insert_ticket(&self, ticket: NewTicket) -> BoxFuture<'_, Result<Ticket>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(database("Failed to start transaction"))?;

            let row = insert_row(&mut *tx, &ticket).await?;

            tx.commit()
                .await
                .map_err(database("Failed to commit transaction"))?;

            row_to_ticket(&row)
        })
    }

    fn insert_within_quota(
        &self,
        ticket: NewTicket,
        max_open: u32,
    ) -> BoxFuture<'_, Result<QuotaInsert>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(database("Failed to start transaction"))?;

            // Serializes inserts of one author until commit; the count below
            // then sees every ticket a previous holder committed.
            sqlx::query(
                r"
                SELECT pg_advisory_xact_lock(
                    hashtextextended(format('ticket-quota:%s:%s', $1::bigint, $2::bigint), 0)
                )
                ",
            )
                .bind(to_db(ticket.community.get()))
                .bind(to_db(ticket.author.get()))
                .execute(&mut *tx)
                .await
                .map_err(database("Failed to lock author quota"))?;

            let (count,): (i64,) = sqlx::query_as(
                r"
                SELECT COUNT(*)
                FROM tickets
                WHERE community_id = $1 AND author_id = $2 AND status = 'open'
                ",
            )
            .bind(to_db(ticket.community.get()))
            .bind(to_db(ticket.author.get()))
            .fetch_one(&mut *tx)
            .await
            .map_err(database("Failed to count open tickets"))?;
            let current =
                u32::try_from(count).map_err(|e| RepositoryError::Serialization(e.to_string()))?;

            if current >= max_open {
                tx.rollback()
                    .await
                    .map_err(database("Failed to roll back transaction"))?;
                metrics::counter!("ticket_repository_conflicts_total", "op" => "quota").increment(1);
                return Ok(QuotaInsert::QuotaExceeded { current });
            }

            let row = insert_row(&mut *tx, &ticket).await?;

            tx.commit()
                .await
                .map_err(database("Failed to commit transaction"))?;

            Ok(QuotaInsert::Inserted(row_to_ticket(&row)?))
        })
    }

    fn get_ticket(
        &self,
        community: CommunityId,
        id: TicketId,
    ) -> BoxFuture<'_, Result<Option<Ticket>>> {
        Box::pin(self.fetch_ticket(community, id))
    }

    fn find_by_channel(&self, channel: ChannelId) -> BoxFuture<'_, Result<Option<Ticket>>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT * FROM tickets WHERE channel_id = $1")
                .bind(to_db(channel.get()))
                .fetch_optional(&self.pool)
                .await
                .map_err(database("Failed to load ticket by channel"))?;

            row.as_ref().map(row_to_ticket).transpose()
        })
    }

    fn count_open(&self, community: CommunityId, author: UserId) -> BoxFuture<'_, Result<u32>> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as(
                r"
                SELECT COUNT(*)
                FROM tickets
                WHERE community_id = $1 AND author_id = $2 AND status = 'open'
                ",
            )
            .bind(to_db(community.get()))
            .bind(to_db(author.get()))
            .fetch_one(&self.pool)
            .await
            .map_err(database("Failed to count open tickets"))?;

            u32::try_from(count).map_err(|e| RepositoryError::Serialization(e.to_string()))
        })
    }

    fn latest_created_at(
        &self,
        community: CommunityId,
        author: UserId,
    ) -> BoxFuture<'_, Result<Option<DateTime<Utc>>>> {
        Box::pin(async move {
            let (latest,): (Option<DateTime<Utc>>,) = sqlx::query_as(
                "SELECT MAX(created_at) FROM tickets WHERE community_id = $1 AND author_id = $2",
            )
            .bind(to_db(community.get()))
            .bind(to_db(author.get()))
            .fetch_one(&self.pool)
            .await
            .map_err(database("Failed to load latest ticket"))?;

            Ok(latest)
        })
    }

    fn list_open(&self) -> BoxFuture<'_, Result<Vec<Ticket>>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT * FROM tickets WHERE status = 'open' ORDER BY created_at, community_id, id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(database("Failed to list open tickets"))?;

            rows.iter().map(row_to_ticket).collect()
        })
    }

    fn assign_if_unassigned(
        &self,
        community: CommunityId,
        id: TicketId,
        moderator: UserId,
    ) -> BoxFuture<'_, Result<ConditionalUpdate>> {
        Box::pin(async move {
            let updated = sqlx::query(
                r"
                UPDATE tickets
                SET moderator_id = $3
                WHERE community_id = $1 AND id = $2
                  AND moderator_id IS NULL AND status = 'open'
                RETURNING *
                ",
            )
            .bind(to_db(community.get()))
            .bind(to_db(id.get()))
            .bind(to_db(moderator.get()))
            .fetch_optional(&self.pool)
            .await
            .map_err(database("Failed to assign ticket"))?;

            self.resolve("assign", community, id, updated).await
        })
    }

    fn close_if_open(
        &self,
        community: CommunityId,
        id: TicketId,
        closure: Closure,
        transcript: Option<TranscriptRecord>,
    ) -> BoxFuture<'_, Result<ConditionalUpdate>> {
        Box::pin(async move {
            let (transcript, encodable) = match transcript {
                None => (None, true),
                Some(record) => match serde_json::to_value(&record.entries) {
                    Ok(entries) => (Some((record.captured_at, entries)), true),
                    Err(e) => {
                        tracing::warn!(%community, ticket = %id, error = %e, "Transcript not encodable, closing without it");
                        (None, false)
                    }
                },
            };
            let (kind, closer_user) = closer_columns(closure.closed_by);

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(database("Failed to start transaction"))?;

            let updated = sqlx::query(
                r"
                UPDATE tickets
                SET status = 'closed',
                    closed_at = GREATEST($3, created_at),
                    close_reason = $4,
                    closed_by_kind = $5,
                    closed_by_user = $6,
                    transcript_complete = $7
                WHERE community_id = $1 AND id = $2 AND status = 'open'
                RETURNING *
                ",
            )
            .bind(to_db(community.get()))
            .bind(to_db(id.get()))
            .bind(closure.closed_at)
            .bind(&closure.reason)
            .bind(kind)
            .bind(closer_user)
            .bind(closure.transcript_complete && encodable)
            .fetch_optional(&mut *tx)
            .await
            .map_err(database("Failed to close ticket"))?;

            let Some(mut closed) = updated else {
                tx.rollback()
                    .await
                    .map_err(database("Failed to roll back transaction"))?;
                return self.resolve("close", community, id, None).await;
            };

            if let Some((captured_at, entries)) = transcript {
                // The closure commits even when the store refuses the transcript.
                let mut savepoint = Connection::begin(&mut *tx)
                    .await
                    .map_err(database("Failed to open savepoint"))?;
                let stored = sqlx::query(
                    r"
                    INSERT INTO ticket_transcripts (community_id, ticket_id, entries, captured_at)
                    VALUES ($1, $2, $3, $4)
                    ",
                )
                .bind(to_db(community.get()))
                .bind(to_db(id.get()))
                .bind(entries)
                .bind(captured_at)
                .execute(&mut *savepoint)
                .await;

                match stored {
                    Ok(_) => savepoint
                        .commit()
                        .await
                        .map_err(database("Failed to release savepoint"))?,
                    Err(e) => {
                        savepoint
                            .rollback()
                            .await
                            .map_err(database("Failed to roll back savepoint"))?;
                        tracing::warn!(%community, ticket = %id, error = %e, "Transcript rejected by the store, closing without it");
                        metrics::counter!("ticket_transcripts_rejected_total").increment(1);
                        closed = sqlx::query(
                            r"
                            UPDATE tickets
                            SET transcript_complete = FALSE
                            WHERE community_id = $1 AND id = $2
                            RETURNING *
                            ",
                        )
                        .bind(to_db(community.get()))
                        .bind(to_db(id.get()))
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(database("Failed to flag transcript incomplete"))?;
                    }
                }
            }

            tx.commit()
                .await
                .map_err(database("Failed to commit transaction"))?;

            self.resolve("close", community, id, Some(closed)).await
        })
    }

    fn set_participant(
        &self,
        community: CommunityId,
        id: TicketId,
        user: UserId,
        present: bool,
    ) -> BoxFuture<'_, Result<ConditionalUpdate>> {
        Box::pin(async move {
            let updated = sqlx::query(
                r"
                UPDATE tickets
                SET participants = CASE
                    WHEN NOT $4 THEN array_remove(participants, $3)
                    WHEN $3 = ANY(participants) THEN participants
                    ELSE array_append(participants, $3)
                END
                WHERE community_id = $1 AND id = $2 AND status = 'open'
                RETURNING *
                ",
            )
            .bind(to_db(community.get()))
            .bind(to_db(id.get()))
            .bind(to_db(user.get()))
            .bind(present)
            .fetch_optional(&self.pool)
            .await
            .map_err(database("Failed to update participants"))?;

            self.resolve("participant", community, id, updated).await
        })
    }

    fn get_transcript(
        &self,
        community: CommunityId,
        id: TicketId,
    ) -> BoxFuture<'_, Result<Option<TranscriptRecord>>> {
        Box::pin(async move {
            let row: Option<(serde_json::Value, DateTime<Utc>)> = sqlx::query_as(
                r"
                SELECT entries, captured_at
                FROM ticket_transcripts
                WHERE community_id = $1 AND ticket_id = $2
                ",
            )
            .bind(to_db(community.get()))
            .bind(to_db(id.get()))
            .fetch_optional(&self.pool)
            .await
            .map_err(database("Failed to load transcript"))?;

            row.map(|(entries, captured_at)| {
                let entries: Vec<TranscriptEntry> = serde_json::from_value(entries)
                    .map_err(|e| RepositoryError::Serialization(format!("transcript: {e}")))?;
                Ok(TranscriptRecord {
                    community,
                    ticket: id,
                    entries,
                    captured_at,
                })
            })
            .transpose()
        })
    }

    fn stats(&self, community: CommunityId) -> BoxFuture<'_, Result<TicketStats>> {
        Box::pin(async move {
            let rows: Vec<(String, String, bool, bool, i64)> = sqlx::query_as(
                r"
                SELECT ticket_type,
                       status,
                       moderator_id IS NOT NULL,
                       COALESCE(transcript_complete, TRUE),
                       COUNT(*)
                FROM tickets
                WHERE community_id = $1
                GROUP BY 1, 2, 3, 4
                ",
            )
            .bind(to_db(community.get()))
            .fetch_all(&self.pool)
            .await
            .map_err(database("Failed to compute stats"))?;

            let mut stats = TicketStats::default();
            for (ticket_type, status, assigned, transcript_complete, count) in rows {
                let count =
                    u64::try_from(count).map_err(|e| RepositoryError::Serialization(e.to_string()))?;
                stats.total += count;
                match TicketStatus::parse(&status)? {
                    TicketStatus::Open => {
                        stats.open += count;
                        if assigned {
                            stats.assigned += count;
                        }
                    }
                    TicketStatus::Closed => {
                        stats.closed += count;
                        if !transcript_complete {
                            stats.incomplete_transcripts += count;
                        }
                    }
                }
                *stats.by_type.entry(ticket_type).or_default() += count;
            }
            Ok(stats)
        })
    }
}

/// Allocate the next id of the ticket's community and insert the row.
async fn insert_row(conn: &mut PgConnection, ticket: &NewTicket) -> Result<PgRow> {
    let (next_id,): (i64,) = sqlx::query_as(
        r"
        INSERT INTO ticket_counters (community_id, last_id)
        VALUES ($1, 1)
        ON CONFLICT (community_id) DO UPDATE SET last_id = ticket_counters.last_id + 1
        RETURNING last_id
        ",
    )
    .bind(to_db(ticket.community.get()))
    .fetch_one(&mut *conn)
    .await
    .map_err(database("Failed to allocate ticket id"))?;

    sqlx::query(
        r"
        INSERT INTO tickets (community_id, id, author_id, ticket_type, channel_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        ",
    )
    .bind(to_db(ticket.community.get()))
    .bind(next_id)
    .bind(to_db(ticket.author.get()))
    .bind(&ticket.ticket_type)
    .bind(to_db(ticket.channel.get()))
    .bind(ticket.created_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(database("Failed to insert ticket"))
}

async fn insert_config(pool: &PgPool, config: &CommunityTicketConfig, overwrite: bool) -> Result<()> {
    let numeric = |e: std::num::TryFromIntError| RepositoryError::Serialization(e.to_string());
    let ticket_types = serde_json::to_value(&config.ticket_types)
        .map_err(|e| RepositoryError::Serialization(format!("ticket_types: {e}")))?;
    let conflict = if overwrite {
        r"
        ON CONFLICT (community_id) DO UPDATE SET
            category_id = EXCLUDED.category_id,
            creation_channel_id = EXCLUDED.creation_channel_id,
            creation_message_id = EXCLUDED.creation_message_id,
            log_channel_id = EXCLUDED.log_channel_id,
            support_role_id = EXCLUDED.support_role_id,
            max_open_tickets = EXCLUDED.max_open_tickets,
            cooldown_secs = EXCLUDED.cooldown_secs,
            auto_close_hours = EXCLUDED.auto_close_hours,
            welcome_text = EXCLUDED.welcome_text,
            ticket_types = EXCLUDED.ticket_types,
            updated_at = now()
        "
    } else {
        "ON CONFLICT (community_id) DO NOTHING"
    };
    let sql = format!(
        r"
        INSERT INTO ticket_configs (
            community_id, category_id, creation_channel_id, creation_message_id,
            log_channel_id, support_role_id, max_open_tickets, cooldown_secs,
            auto_close_hours, welcome_text, ticket_types
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        {conflict}
        "
    );

    sqlx::query(&sql)
        .bind(to_db(config.community.get()))
        .bind(config.category.map(|c| to_db(c.get())))
        .bind(config.creation_channel.map(|c| to_db(c.get())))
        .bind(config.creation_message.map(|m| to_db(m.get())))
        .bind(config.log_channel.map(|c| to_db(c.get())))
        .bind(config.support_role.map(|r| to_db(r.get())))
        .bind(i32::try_from(config.max_open_tickets).map_err(numeric)?)
        .bind(i64::try_from(config.cooldown_secs).map_err(numeric)?)
        .bind(i32::try_from(config.auto_close_hours).map_err(numeric)?)
        .bind(&config.welcome_text)
        .bind(ticket_types)
        .execute(pool)
        .await
        .map_err(database("Failed to save config"))?;

    Ok(())
}
