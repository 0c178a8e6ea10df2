pub mod config;
pub mod learn;

pub use config::QuizSettings;
