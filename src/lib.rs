//! kaede, a small IRC server that speaks the RFC 1459 dialect and links with its peers.
//!
//! # Usage
//!
//! You need a configuration file, and pass its name as an argument.  The git repository
//! contains an example `doc/kaede.yaml`, with comments describing the different options.
//!
//! During development: `cargo run -- doc/kaede.yaml`
//!
//! For an optimized build:
//!
//! ```console
//! cargo install --path .
//! kaede kaede.yaml
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, rust_2018_idioms)]
#![allow(clippy::shadow_unrelated, clippy::use_self)]

pub use crate::config::Config;
pub use crate::state::State;
use std::{env, process};

pub mod auth;
mod channel;
pub mod client;
pub mod config;
mod control;
mod lines;
pub mod message;
pub mod modes;
mod net;
pub mod state;
mod util;

/// The beginning of everything
pub fn start() {
    if cfg!(debug_assertions) {
        env::set_var("RUST_BACKTRACE", "1");
    }

    let log_settings = env_logger::Env::new()
        .filter_or("KAEDE_LOG", "kaede=debug")
        .write_style("KAEDE_LOG_STYLE");
    env_logger::Builder::from_env(log_settings)
        .format(|buf, r| {
            use std::io::Write;
            writeln!(buf, "[{:<5} {}] {}", r.level(), r.target(), r.args())
        })
        .init();

    let config_path = parse_args();
    control::load_config_and_run(config_path);
}

fn parse_args() -> String {
    let mut args = env::args();

    let program = args.next().unwrap_or_else(|| String::from("kaede"));

    let config_path = args.next().unwrap_or_else(|| {
        eprintln!("Usage: {} CONFIG_FILE", program);
        process::exit(1);
    });

    if config_path == "-h" || config_path == "--help" {
        eprintln!("kaede {}", env!("CARGO_PKG_VERSION"));
        eprintln!("Usage: {} CONFIG_FILE", program);
        process::exit(1);
    } else if config_path == "-v" || config_path == "--version" {
        eprintln!("kaede {}", env!("CARGO_PKG_VERSION"));
        process::exit(1);
    }

    config_path
}
