mod alias;
mod builtins;
mod error;
mod exec;
mod jobs;
mod parser;
mod pipeline;
mod redirect;
mod shell;
mod signals;
mod sysinfo;
mod utils;

use std::env;
use std::process;

fn main() {
    // Parse command-line arguments.
    let args: Vec<String> = env::args().collect();
    let mut emit_prompt = true;
    let mut verbose = false;
    for arg in &args[1..] {
        match arg.as_str() {
            "-h" => utils::print_usage(),
            "-v" => verbose = true,
            "-p" => emit_prompt = false,
            _ => {}
        }
    }

    utils::init_logging(verbose);

    let foreground = signals::ForegroundSlot::new();
    if let Err(err) = signals::install_signal_handlers(foreground.clone()) {
        eprintln!("{}", err);
        process::exit(1);
    }

    let mut shell = shell::Shell::with_foreground(foreground);
    if let Err(err) = shell::run_shell(&mut shell, emit_prompt) {
        eprintln!("{}", err);
        process::exit(1);
    }
}
