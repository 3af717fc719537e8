pub mod event;
pub mod item;
pub mod person;
