use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{DateTime, Document, doc};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};

use crate::error::{AppError, Result};
use crate::models::{Booking, BookingStatus, Expert, Message, Project, User};

#[derive(Clone)]
pub struct Database {
    db: mongodb::Database,
}

impl Database {
    pub async fn connect(uri: &str, name: &str) -> mongodb::error::Result<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some("squadup".to_string());
        options.connect_timeout = Some(Duration::from_secs(5));
        options.server_selection_timeout = Some(Duration::from_secs(5));

        let client = Client::with_options(options)?;
        let db = client.database(name);
        db.run_command(doc! { "ping": 1 }).await?;

        Ok(Self { db })
    }

    pub fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    pub fn experts(&self) -> Collection<Expert> {
        self.db.collection("experts")
    }

    pub fn bookings(&self) -> Collection<Booking> {
        self.db.collection("bookings")
    }

    pub fn messages(&self) -> Collection<Message> {
        self.db.collection("messages")
    }

    pub fn projects(&self) -> Collection<Project> {
        self.db.collection("projects")
    }

    pub async fn ensure_indexes(&self) -> mongodb::error::Result<()> {
        create_indexes(
            &self.users(),
            vec![unique(doc! { "uid": 1 }), unique(doc! { "email": 1 }), plain(doc! { "role": 1 })],
        )
        .await?;
        create_indexes(
            &self.experts(),
            vec![
                unique(doc! { "userId": 1 }),
                plain(doc! { "expertise": 1 }),
                plain(doc! { "rating": -1 }),
            ],
        )
        .await?;
        create_indexes(
            &self.bookings(),
            vec![
                plain(doc! { "userId": 1, "createdAt": -1 }),
                active_slot_unique(),
                plain(doc! { "status": 1 }),
            ],
        )
        .await?;
        create_indexes(
            &self.messages(),
            vec![
                plain(doc! { "senderId": 1, "receiverId": 1, "timestamp": -1 }),
                plain(doc! { "receiverId": 1, "read": 1 }),
            ],
        )
        .await?;

        log::info!("Database indexes ready");
        Ok(())
    }
}

async fn create_indexes<T: Send + Sync>(
    collection: &Collection<T>,
    indexes: Vec<IndexModel>,
) -> mongodb::error::Result<()> {
    collection.create_indexes(indexes).await?;
    log::debug!("Indexes ensured on {}", collection.name());
    Ok(())
}

fn plain(keys: Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

/// One pending or confirmed booking per expert/date/slot. Needs MongoDB 6.0+ for `$in`.
fn active_slot_unique() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "expertId": 1, "date": 1, "timeSlot": 1 })
        .options(
            IndexOptions::builder()
                .name("active_slot_unique".to_string())
                .unique(true)
                .partial_filter_expression(doc! {
                    "status": {
                        "$in": [BookingStatus::Pending.as_str(), BookingStatus::Confirmed.as_str()]
                    }
                })
                .build(),
        )
        .build()
}

fn unique(keys: Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

/// Persistence used by the real-time relay.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Stores `message` and returns it with its id assigned.
    async fn insert(&self, message: Message) -> Result<Message>;

    /// Marks every unread message from `sender_id` to `receiver_id` as read.
    async fn mark_read(&self, sender_id: &str, receiver_id: &str) -> Result<u64>;
}

#[async_trait]
impl MessageStore for Database {
    async fn insert(&self, mut message: Message) -> Result<Message> {
        let result = self.messages().insert_one(&message).await?;
        message.id = Some(result.inserted_id.as_object_id().ok_or_else(|| {
            AppError::Internal("Inserted message has no ObjectId".to_string())
        })?);
        Ok(message)
    }

    async fn mark_read(&self, sender_id: &str, receiver_id: &str) -> Result<u64> {
        let result = self
            .messages()
            .update_many(
                doc! { "senderId": sender_id, "receiverId": receiver_id, "read": false },
                doc! { "$set": { "read": true, "updatedAt": DateTime::now() } },
            )
            .await?;
        Ok(result.modified_count)
    }
}
