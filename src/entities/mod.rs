pub mod prelude;

pub mod comments;
pub mod users;
pub mod video_posts;
pub mod video_tags;
