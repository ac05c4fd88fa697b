pub mod artifacts;
pub mod build;
pub mod compose;
pub mod heroku;
pub mod hook;
pub mod push;
