pub use super::comments::Entity as Comments;
pub use super::users::Entity as Users;
pub use super::video_posts::Entity as VideoPosts;
pub use super::video_tags::Entity as VideoTags;
