// Entry point for regtoken.
//
// Parses the command line, resolves settings, runs the exchange chain once,
// and writes the registration token to stdout. Logs go to stderr.

use clap::Parser;
use regtoken_common::constants::return_code;
use regtoken_common::{logging, SecretMasker};
use regtoken_sdk::{Package, Source};

use regtoken::command_settings::Args;
use regtoken::TokenPipeline;

fn main() {
    let args = Args::parse();

    // Single-threaded: the chain is strictly sequential.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime");

    let exit_code = runtime.block_on(run(args));

    std::process::exit(exit_code);
}

async fn run(args: Args) -> i32 {
    logging::init(args.log_format);

    tracing::info!(
        "{} {} (commit {}) starting",
        Package::NAME,
        Package::VERSION,
        Source::COMMIT_HASH
    );

    let settings = match args.resolve_settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}", e);
            return return_code::FAILED;
        }
    };

    let masker = SecretMasker::new();
    let pipeline = match TokenPipeline::from_settings(settings, masker.clone()) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!("{:#}", e);
            return return_code::FAILED;
        }
    };

    match pipeline.run().await {
        Ok(token) => match args.output.render(&token) {
            Ok(rendered) => {
                println!("{rendered}");
                tracing::info!("Runner registration token written to stdout");
                return_code::SUCCESS
            }
            Err(e) => {
                tracing::error!("{:#}", e);
                return_code::FAILED
            }
        },
        Err(e) => {
            let kind = e.kind();
            let message = format!("{:#}", anyhow::Error::from(e));
            tracing::error!(kind, "{}", masker.mask_secrets(&message));
            return_code::FAILED
        }
    }
}
