pub mod capture;
pub mod cli;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod events;
pub mod llm;
pub mod logging;
pub mod prompts;
pub mod screenshots;
pub mod session;
pub mod solution;
pub mod state;
