use std::{error::Error, process::ExitCode};
use clap::Parser;
use tracing::error;

mod config;
mod demo;
mod error;
mod harness;
mod misc;
mod parse;
mod sync_queue;
mod trace;

pub use config::*;

fn main() -> ExitCode {

    trace::init_tracing();
    let opts = Exec::parse();
    let res = match opts{
        Exec::Demo(opts) => demo::execute_demo(opts),
        Exec::Stress(opts) => demo::execute_stress(opts),
        Exec::DefaultSettings => demo::print_default_settings()
    };

    match res{
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let mut msg = err.to_string();
            let mut source = err.source();
            while let Some(cause) = source{
                msg.push_str(&format!(": {cause}"));
                source = cause.source();
            }
            error!("{msg}");
            ExitCode::FAILURE
        }
    }
}
