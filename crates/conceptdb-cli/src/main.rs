use clap::Parser;
use conceptdb_cli::{CliArgs, ConceptDbCli};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = CliArgs::parse();
    let result = match ConceptDbCli::from_args(&args) {
        Ok(cli) => cli.run(args).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
