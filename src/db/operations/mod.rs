pub mod activity;
pub mod balance;
pub mod catalog;
pub mod events;
pub mod progress;

pub use activity::ActivitySubmission;
pub use balance::XpBalance;
pub use catalog::{Course, CourseGamificationConfig, LearningUnit, Module, UnitContext};
pub use events::{NewXpEvent, XpEvent};
pub use progress::UserUnitProgress;
