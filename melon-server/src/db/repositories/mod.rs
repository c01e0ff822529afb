mod follow_repository;
mod notification_repository;
mod post_repository;
mod profile_repository;
mod reaction_repository;
mod user_repository;

pub use follow_repository::FollowRepository;
pub use notification_repository::NotificationRepository;
pub use post_repository::PostRepository;
pub use profile_repository::ProfileRepository;
pub use reaction_repository::ReactionRepository;
pub use user_repository::{AuthUser, UserRepository};
