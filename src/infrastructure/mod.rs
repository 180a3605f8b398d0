//! Infrastructure layer: database, LLM client, configuration, logging.

pub mod config;
pub mod database;
pub mod llm;
pub mod logging;
