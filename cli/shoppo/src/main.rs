use std::process::ExitCode;

use anyhow::Result;
use bpaf::Args;
use commands::{ShoppoArgs, ShoppoCli};
use tracing::debug;
use utils::init::init_logger;
use utils::message;

mod commands;
mod config;
mod utils;

async fn run(args: ShoppoArgs) -> Result<()> {
    let config = config::Config::parse()?;
    args.handle(config).await
}

fn main() -> ExitCode {
    // Run the argument parser
    //
    // Pass through Stdout failure; This represents `--help`
    let args = match commands::shoppo_cli().run_inner(Args::current_args()) {
        Ok(ShoppoCli(args)) => args,
        Err(bpaf::ParseFailure::Stdout(m, _)) => {
            print!("{m:80}");
            return ExitCode::from(0);
        },
        Err(bpaf::ParseFailure::Stderr(m)) => {
            message::error(format!("{m:80}"));
            return ExitCode::from(1);
        },
        Err(bpaf::ParseFailure::Completion(c)) => {
            print!("{c}");
            return ExitCode::from(0);
        },
    };

    init_logger(args.verbosity);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            message::error(format!("could not start async runtime: {e}"));
            return ExitCode::from(1);
        },
    };

    // Print errors and exit with status 1 on failure
    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            debug!("{:#}", e);

            let err_str = e
                .chain()
                .skip(1)
                .fold(e.to_string(), |acc, cause| format!("{acc}: {cause}"));
            message::error(err_str);

            ExitCode::from(1)
        },
    }
}
