pub mod announcements;
pub mod attendance;
pub mod backup;
pub mod classes;
pub mod core;
pub mod grades;
pub mod homework;
pub mod messages;
pub mod relationships;
pub mod subjects;
pub mod users;
