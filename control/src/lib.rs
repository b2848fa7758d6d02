//! Media stack control server
//!
//! Runs docker commands for the local media stack behind a bounded process
//! runner and deploys the stack to remote hosts over SSH.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod remote;
pub mod runner;
pub mod server;
pub mod stack;
pub mod storage;
pub mod utils;
