pub mod app;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod logger;
pub mod matcher;
pub mod output;
pub mod runner;
pub mod template;

#[cfg(test)]
mod tests;
