pub mod db;
pub mod entities;
pub mod repository;

pub use db::init_db;
pub use entities::{chats, messages};
pub use repository::{ChatRepository, RepositoryError, SeaOrmChatRepository};
