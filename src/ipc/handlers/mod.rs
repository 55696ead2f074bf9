pub mod core;
pub mod courses;
pub mod dashboard;
pub mod grades;
pub mod notices;
pub mod session;
pub mod users;
