pub mod attachments;
pub mod backup;
pub mod core;
pub mod courses;
pub mod messages;
pub mod plans;
pub mod profile;
pub mod programmes;
pub mod setup;
pub mod users;
