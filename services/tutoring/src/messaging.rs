//! Tutor/student conversations with per-participant unread counters.

use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use tutorlink_common::{Actor, AppError, ConversationState, UserRole};
use tutorlink_database::{queries, Conversation, Message};

use crate::models::{
    ConversationSummary, CreateConversationRequest, MessageFilter, PostMessageRequest,
};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Tutor,
    Student,
}

impl Participant {
    pub fn of(conversation: &Conversation, user_id: Uuid) -> Option<Participant> {
        if conversation.tutor_id == user_id {
            Some(Participant::Tutor)
        } else if conversation.student_id == user_id {
            Some(Participant::Student)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnreadCounters {
    pub tutor: i32,
    pub student: i32,
}

impl UnreadCounters {
    pub fn from_conversation(conversation: &Conversation) -> Self {
        Self {
            tutor: conversation.unread_tutor,
            student: conversation.unread_student,
        }
    }

    /// Bumps the counter of whoever did not send the message. A sender that is
    /// not the tutor (including a non-participant admin) bumps the tutor's.
    pub fn record_message(&mut self, sender: Option<Participant>) {
        match sender {
            Some(Participant::Tutor) => self.student += 1,
            _ => self.tutor += 1,
        }
    }

    pub fn mark_read(&mut self, reader: Option<Participant>) {
        match reader {
            Some(Participant::Tutor) => self.tutor = 0,
            Some(Participant::Student) => self.student = 0,
            None => {}
        }
    }

    pub fn unread_for(&self, participant: Option<Participant>) -> i32 {
        match participant {
            Some(Participant::Tutor) => self.tutor,
            Some(Participant::Student) => self.student,
            None => 0,
        }
    }
}

/// Participants and admins may open a conversation.
pub fn ensure_can_access(
    actor: &Actor,
    conversation: &Conversation,
) -> Result<Option<Participant>, AppError> {
    let participant = Participant::of(conversation, actor.user_id);
    if participant.is_none() && !actor.is_admin() {
        return Err(AppError::Authorization(
            "You are not part of this conversation".to_string(),
        ));
    }
    Ok(participant)
}

/// Works out `(tutor_id, student_id)` for a new conversation from the caller's role.
pub fn resolve_pair(
    actor: &Actor,
    request: &CreateConversationRequest,
) -> Result<(Uuid, Uuid), AppError> {
    let (tutor_id, student_id) = match actor.role {
        UserRole::Student => (request.tutor_id, Some(actor.user_id)),
        UserRole::Tutor => (Some(actor.user_id), request.student_id),
        UserRole::Admin => (request.tutor_id, request.student_id),
    };

    match (tutor_id, student_id) {
        (Some(tutor), Some(student)) if tutor == student => Err(AppError::Validation(
            "A conversation needs two different participants".to_string(),
        )),
        (Some(tutor), Some(student)) => Ok((tutor, student)),
        (None, _) => Err(AppError::Validation("tutor_id is required".to_string())),
        (_, None) => Err(AppError::Validation("student_id is required".to_string())),
    }
}

/// The tutor side must be a tutor and the student side a student.
pub fn ensure_pair_roles(tutor_role: UserRole, student_role: UserRole) -> Result<(), AppError> {
    if tutor_role != UserRole::Tutor {
        return Err(AppError::Validation(
            "tutor_id must refer to a tutor".to_string(),
        ));
    }
    if student_role != UserRole::Student {
        return Err(AppError::Validation(
            "student_id must refer to a student".to_string(),
        ));
    }
    Ok(())
}

pub fn summarize(
    conversation: &Conversation,
    last_message: Option<String>,
    viewer_id: Uuid,
) -> Result<ConversationSummary, AppError> {
    let participant = Participant::of(conversation, viewer_id);
    let counterpart_id = match participant {
        Some(Participant::Tutor) => conversation.student_id,
        _ => conversation.tutor_id,
    };

    Ok(ConversationSummary {
        conversation_id: conversation.conversation_id,
        counterpart_id,
        course_id: conversation.course_id,
        state: conversation.state()?,
        unread: UnreadCounters::from_conversation(conversation).unread_for(participant),
        last_message,
        updated_at: conversation.updated_at,
    })
}

#[derive(Debug, FromRow)]
struct ConversationWithPreview {
    #[sqlx(flatten)]
    conversation: Conversation,
    last_message: Option<String>,
}

pub struct MessagingService {
    db_pool: PgPool,
}

impl MessagingService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db_pool: state.db_pool.clone(),
        }
    }

    pub async fn create(
        &self,
        actor_id: Uuid,
        request: CreateConversationRequest,
    ) -> Result<Conversation, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        let (tutor_id, student_id) = resolve_pair(&actor, &request)?;

        let tutor = queries::find_user(&self.db_pool, tutor_id).await?;
        let student = queries::find_user(&self.db_pool, student_id).await?;
        ensure_pair_roles(tutor.role()?, student.role()?)?;
        if let Some(course_id) = request.course_id {
            queries::find_course_ref(&self.db_pool, course_id).await?;
        }

        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (conversation_id, tutor_id, student_id, course_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tutor_id)
        .bind(student_id)
        .bind(request.course_id)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(
            conversation_id = %conversation.conversation_id,
            tutor_id = %tutor_id,
            student_id = %student_id,
            "Conversation created"
        );
        Ok(conversation)
    }

    /// Most recently updated first; admins see every conversation.
    pub async fn list(&self, actor_id: Uuid) -> Result<Vec<Conversation>, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        let scope = if actor.is_admin() { None } else { Some(actor.user_id) };

        let conversations = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT * FROM conversations
            WHERE $1::uuid IS NULL OR tutor_id = $1 OR student_id = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(scope)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(conversations)
    }

    /// The caller's own inbox, admins included.
    pub async fn summary(&self, actor_id: Uuid) -> Result<Vec<ConversationSummary>, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;

        let rows = sqlx::query_as::<_, ConversationWithPreview>(
            r#"
            SELECT c.*,
                (
                    SELECT m.content FROM messages m
                    WHERE m.conversation_id = c.conversation_id
                    ORDER BY m.created_at DESC
                    LIMIT 1
                ) AS last_message
            FROM conversations c
            WHERE c.tutor_id = $1 OR c.student_id = $1
            ORDER BY c.updated_at DESC
            "#,
        )
        .bind(actor.user_id)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter()
            .map(|row| summarize(&row.conversation, row.last_message, actor.user_id))
            .collect()
    }

    pub async fn get(&self, actor_id: Uuid, conversation_id: Uuid) -> Result<Conversation, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        let conversation = self.fetch(conversation_id).await?;
        ensure_can_access(&actor, &conversation)?;
        Ok(conversation)
    }

    /// Accept and reject are the tutor's call; either participant may archive.
    pub async fn set_state(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
        state: ConversationState,
    ) -> Result<Conversation, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        let conversation = self.fetch(conversation_id).await?;
        let participant = ensure_can_access(&actor, &conversation)?;

        let tutor_only = matches!(state, ConversationState::Accepted | ConversationState::Rejected);
        if tutor_only && participant == Some(Participant::Student) {
            return Err(AppError::Authorization(
                "Only the tutor can accept or reject a conversation".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations SET state = $2, updated_at = NOW()
            WHERE conversation_id = $1
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(state.as_str())
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(conversation_id = %conversation_id, state = state.as_str(), "Conversation state changed");
        Ok(updated)
    }

    pub async fn mark_read(&self, actor_id: Uuid, conversation_id: Uuid) -> Result<Conversation, AppError> {
        let mut tx = self.db_pool.begin().await?;
        let actor = queries::find_actor(&mut *tx, actor_id).await?;
        let conversation = lock_conversation(&mut tx, conversation_id).await?;
        let reader = ensure_can_access(&actor, &conversation)?;

        if reader.is_none() {
            tx.commit().await?;
            return Ok(conversation);
        }

        let mut counters = UnreadCounters::from_conversation(&conversation);
        counters.mark_read(reader);

        // Reading is not activity: updated_at stays put.
        let updated = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations SET unread_tutor = $2, unread_student = $3
            WHERE conversation_id = $1
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(counters.tutor)
        .bind(counters.student)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE messages SET is_read = TRUE
            WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(actor.user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    pub async fn post_message(
        &self,
        actor_id: Uuid,
        request: PostMessageRequest,
    ) -> Result<Message, AppError> {
        request.validate()?;
        if request.content.trim().is_empty() {
            return Err(AppError::Validation("Message content cannot be blank".to_string()));
        }

        let mut tx = self.db_pool.begin().await?;
        let actor = queries::find_actor(&mut *tx, actor_id).await?;
        let conversation = lock_conversation(&mut tx, request.conversation).await?;
        let sender = ensure_can_access(&actor, &conversation)?;

        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (message_id, conversation_id, sender_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation.conversation_id)
        .bind(actor.user_id)
        .bind(&request.content)
        .fetch_one(&mut *tx)
        .await?;

        let mut counters = UnreadCounters::from_conversation(&conversation);
        counters.record_message(sender);
        write_counters(&mut tx, conversation.conversation_id, counters).await?;

        tx.commit().await?;

        tracing::debug!(
            conversation_id = %conversation.conversation_id,
            message_id = %message.message_id,
            "Message posted"
        );
        Ok(message)
    }

    /// Oldest first, limited to conversations the caller can open.
    pub async fn list_messages(
        &self,
        actor_id: Uuid,
        filter: MessageFilter,
    ) -> Result<Vec<Message>, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;

        if let Some(conversation_id) = filter.conversation {
            let conversation = self.fetch(conversation_id).await?;
            ensure_can_access(&actor, &conversation)?;

            return Ok(sqlx::query_as::<_, Message>(
                "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at",
            )
            .bind(conversation_id)
            .fetch_all(&self.db_pool)
            .await?);
        }

        let scope = if actor.is_admin() { None } else { Some(actor.user_id) };
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT m.* FROM messages m
            JOIN conversations c ON c.conversation_id = m.conversation_id
            WHERE $1::uuid IS NULL OR c.tutor_id = $1 OR c.student_id = $1
            ORDER BY m.created_at
            "#,
        )
        .bind(scope)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(messages)
    }

    async fn fetch(&self, conversation_id: Uuid) -> Result<Conversation, AppError> {
        sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE conversation_id = $1")
            .bind(conversation_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))
    }
}

async fn lock_conversation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    conversation_id: Uuid,
) -> Result<Conversation, AppError> {
    sqlx::query_as::<_, Conversation>(
        "SELECT * FROM conversations WHERE conversation_id = $1 FOR UPDATE",
    )
    .bind(conversation_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))
}

/// Stores counters after a new message and marks the conversation active.
async fn write_counters(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    conversation_id: Uuid,
    counters: UnreadCounters,
) -> Result<Conversation, AppError> {
    let conversation = sqlx::query_as::<_, Conversation>(
        r#"
        UPDATE conversations
        SET unread_tutor = $2, unread_student = $3, updated_at = NOW()
        WHERE conversation_id = $1
        RETURNING *
        "#,
    )
    .bind(conversation_id)
    .bind(counters.tutor)
    .bind(counters.student)
    .fetch_one(&mut **tx)
    .await?;

    Ok(conversation)
}
