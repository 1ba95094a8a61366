//! CLI module for the SFA workflow service
//!
//! - `serve`: run the HTTP API
//! - `templates`: print the registered return workflow templates

pub mod serve;
pub mod templates;

use clap::{Parser, Subcommand};

/// SFA Workflow Service - return and approval workflows
#[derive(Parser)]
#[command(name = "sfa-workflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve(serve::ServeArgs),

    /// List the built-in workflow templates
    Templates(templates::TemplatesArgs),
}
