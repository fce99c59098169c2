pub mod auth;
pub mod comments;
pub mod health;
pub mod users;
pub mod videos;
