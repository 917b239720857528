pub mod config;
pub mod dispatcher;
pub mod effector;
pub mod errors;
pub mod events;
pub mod grounding;
pub mod models;
pub mod providers;
pub mod translate;
