use std::process::ExitCode;

use crate::cli::run;

mod art;
mod audio;
pub mod cli;
mod config;
pub mod domain;
mod http;
mod interrupt;
pub mod storage;

fn main() -> ExitCode {
    run()
}
