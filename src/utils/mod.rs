pub mod grades;
pub mod schedule;
pub mod session;
