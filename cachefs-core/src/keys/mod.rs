pub mod salt;
pub mod schedule;
