use async_trait::async_trait;
use chrono::NaiveDateTime;
use sea_orm::{prelude::*, QueryOrder, Set, TransactionTrait};
use uuid::Uuid;

use crate::models::internal::{Chat, ChatRole, ChatSummary, Message, NewChat};
use crate::storage::entities::{chats, messages};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Conversation store gateway. Each operation is a single atomic write
/// keyed by chat id (and owner where applicable); there are no
/// cross-operation transactions. A crash between the optimistic user
/// append and the assistant append leaves a dangling user message, which
/// is accepted.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn insert_new(&self, chat: NewChat) -> Result<Uuid, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Chat>, RepositoryError>;

    async fn find_by_id_for_owner(
        &self,
        id: Uuid,
        owner_id: &str,
    ) -> Result<Option<Chat>, RepositoryError>;

    /// Appends a message at the next sequence position and bumps the
    /// chat's `updated_at`. Optionally records the model the chat is
    /// currently pinned to.
    async fn append_message(
        &self,
        chat_id: Uuid,
        owner_id: &str,
        message: Message,
        set_model: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// In-place content replace (regeneration); refreshes the message
    /// timestamp and bumps the chat's `updated_at`.
    async fn replace_message_content(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        content: &str,
        think: bool,
    ) -> Result<(), RepositoryError>;

    /// Rollback of an optimistic write.
    async fn remove_message(
        &self,
        chat_id: Uuid,
        owner_id: &str,
        message_id: Uuid,
    ) -> Result<(), RepositoryError>;

    /// Replaces the full message list (edit truncation and best-effort
    /// restore). Sequence numbers are reassigned from list order.
    async fn replace_messages(
        &self,
        chat_id: Uuid,
        messages: Vec<Message>,
    ) -> Result<(), RepositoryError>;

    /// Idempotent shared flip.
    async fn set_shared(
        &self,
        chat_id: Uuid,
        owner_id: &str,
        shared: bool,
    ) -> Result<(), RepositoryError>;

    async fn count_by_owner(&self, owner_id: &str) -> Result<u64, RepositoryError>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ChatSummary>, RepositoryError>;

    async fn delete(&self, chat_id: Uuid, owner_id: &str) -> Result<(), RepositoryError>;
}

pub struct SeaOrmChatRepository {
    db: DatabaseConnection,
}

impl SeaOrmChatRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn chat_row_for_owner(
        &self,
        id: Uuid,
        owner_id: &str,
    ) -> Result<chats::Model, RepositoryError> {
        chats::Entity::find_by_id(id.to_string())
            .filter(chats::Column::OwnerId.eq(owner_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Chat {}", id)))
    }

    async fn message_rows(&self, chat_id: Uuid) -> Result<Vec<messages::Model>, RepositoryError> {
        Ok(messages::Entity::find()
            .filter(messages::Column::ChatId.eq(chat_id.to_string()))
            .order_by_asc(messages::Column::Seq)
            .all(&self.db)
            .await?)
    }

    async fn build_chat(&self, row: chats::Model) -> Result<Chat, RepositoryError> {
        let chat_id = Uuid::parse_str(&row.id).unwrap();
        let msgs = self.message_rows(chat_id).await?;
        Ok(Chat {
            id: chat_id,
            owner_id: row.owner_id,
            name: row.name,
            model: row.model,
            shared: row.shared,
            created_at: parse_ts(&row.created_at),
            updated_at: parse_ts(&row.updated_at),
            messages: msgs.into_iter().map(Message::from).collect(),
        })
    }

    async fn bump_updated_at(
        &self,
        row: chats::Model,
        set_model: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut active: chats::ActiveModel = row.into();
        if let Some(model) = set_model {
            active.model = Set(model.to_string());
        }
        active.updated_at = Set(chrono::Utc::now().naive_utc().to_string());
        active.update(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatRepository for SeaOrmChatRepository {
    async fn insert_new(&self, chat: NewChat) -> Result<Uuid, RepositoryError> {
        let now = chrono::Utc::now().naive_utc();

        let active = chats::ActiveModel {
            id: Set(chat.id.to_string()),
            owner_id: Set(chat.owner_id),
            name: Set(chat.name),
            model: Set(chat.model),
            shared: Set(false),
            created_at: Set(now.to_string()),
            updated_at: Set(now.to_string()),
        };

        let result = active.insert(&self.db).await?;
        tracing::info!("Created chat: {}", result.id);
        Ok(Uuid::parse_str(&result.id).unwrap())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Chat>, RepositoryError> {
        let row = chats::Entity::find_by_id(id.to_string()).one(&self.db).await?;
        match row {
            Some(row) => Ok(Some(self.build_chat(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_id_for_owner(
        &self,
        id: Uuid,
        owner_id: &str,
    ) -> Result<Option<Chat>, RepositoryError> {
        let row = chats::Entity::find_by_id(id.to_string())
            .filter(chats::Column::OwnerId.eq(owner_id))
            .one(&self.db)
            .await?;
        match row {
            Some(row) => Ok(Some(self.build_chat(row).await?)),
            None => Ok(None),
        }
    }

    async fn append_message(
        &self,
        chat_id: Uuid,
        owner_id: &str,
        message: Message,
        set_model: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let chat_row = self.chat_row_for_owner(chat_id, owner_id).await?;

        let last = messages::Entity::find()
            .filter(messages::Column::ChatId.eq(chat_id.to_string()))
            .order_by_desc(messages::Column::Seq)
            .one(&self.db)
            .await?;
        let next_seq = last.map_or(0, |m| m.seq + 1);

        let active = messages::ActiveModel {
            id: Set(message.id.to_string()),
            chat_id: Set(chat_id.to_string()),
            seq: Set(next_seq),
            role: Set(message.role.as_str().to_string()),
            content: Set(message.content),
            think: Set(message.think),
            created_at: Set(message.created_at.to_string()),
            edited_at: Set(message.edited_at.map(|t| t.to_string())),
        };
        active.insert(&self.db).await?;
        tracing::debug!("Appended message {} to chat {}", message.id, chat_id);

        self.bump_updated_at(chat_row, set_model).await
    }

    async fn replace_message_content(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        content: &str,
        think: bool,
    ) -> Result<(), RepositoryError> {
        let row = messages::Entity::find_by_id(message_id.to_string())
            .filter(messages::Column::ChatId.eq(chat_id.to_string()))
            .one(&self.db)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Message {}", message_id)))?;

        let mut active: messages::ActiveModel = row.into();
        active.content = Set(content.to_string());
        active.think = Set(think);
        active.created_at = Set(chrono::Utc::now().naive_utc().to_string());
        active.update(&self.db).await?;

        let chat_row = chats::Entity::find_by_id(chat_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Chat {}", chat_id)))?;
        self.bump_updated_at(chat_row, None).await
    }

    async fn remove_message(
        &self,
        chat_id: Uuid,
        owner_id: &str,
        message_id: Uuid,
    ) -> Result<(), RepositoryError> {
        self.chat_row_for_owner(chat_id, owner_id).await?;

        messages::Entity::delete_by_id(message_id.to_string())
            .exec(&self.db)
            .await?;
        tracing::debug!("Removed message {} from chat {}", message_id, chat_id);
        Ok(())
    }

    async fn replace_messages(
        &self,
        chat_id: Uuid,
        new_messages: Vec<Message>,
    ) -> Result<(), RepositoryError> {
        let txn = self.db.begin().await?;

        messages::Entity::delete_many()
            .filter(messages::Column::ChatId.eq(chat_id.to_string()))
            .exec(&txn)
            .await?;

        for (seq, message) in new_messages.into_iter().enumerate() {
            let active = messages::ActiveModel {
                id: Set(message.id.to_string()),
                chat_id: Set(chat_id.to_string()),
                seq: Set(seq as i64),
                role: Set(message.role.as_str().to_string()),
                content: Set(message.content),
                think: Set(message.think),
                created_at: Set(message.created_at.to_string()),
                edited_at: Set(message.edited_at.map(|t| t.to_string())),
            };
            active.insert(&txn).await?;
        }

        txn.commit().await?;

        let chat_row = chats::Entity::find_by_id(chat_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Chat {}", chat_id)))?;
        self.bump_updated_at(chat_row, None).await
    }

    async fn set_shared(
        &self,
        chat_id: Uuid,
        owner_id: &str,
        shared: bool,
    ) -> Result<(), RepositoryError> {
        let row = self.chat_row_for_owner(chat_id, owner_id).await?;
        let mut active: chats::ActiveModel = row.into();
        active.shared = Set(shared);
        active.updated_at = Set(chrono::Utc::now().naive_utc().to_string());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn count_by_owner(&self, owner_id: &str) -> Result<u64, RepositoryError> {
        let count = chats::Entity::find()
            .filter(chats::Column::OwnerId.eq(owner_id))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ChatSummary>, RepositoryError> {
        let rows = chats::Entity::find()
            .filter(chats::Column::OwnerId.eq(owner_id))
            .order_by_desc(chats::Column::UpdatedAt)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ChatSummary {
                id: Uuid::parse_str(&row.id).unwrap(),
                name: row.name,
                updated_at: parse_ts(&row.updated_at),
            })
            .collect())
    }

    async fn delete(&self, chat_id: Uuid, owner_id: &str) -> Result<(), RepositoryError> {
        self.chat_row_for_owner(chat_id, owner_id).await?;

        messages::Entity::delete_many()
            .filter(messages::Column::ChatId.eq(chat_id.to_string()))
            .exec(&self.db)
            .await?;

        chats::Entity::delete_by_id(chat_id.to_string())
            .exec(&self.db)
            .await?;
        tracing::info!("Deleted chat: {}", chat_id);
        Ok(())
    }
}

fn parse_ts(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT).unwrap()
}

impl From<messages::Model> for Message {
    fn from(model: messages::Model) -> Self {
        Self {
            id: Uuid::parse_str(&model.id).unwrap(),
            role: ChatRole::parse(&model.role).unwrap(),
            content: model.content,
            created_at: parse_ts(&model.created_at),
            edited_at: model.edited_at.as_deref().map(parse_ts),
            think: model.think,
        }
    }
}
