//! Command line tasks

pub mod commands;
