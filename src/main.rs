// PortLog - Serial device auto-attach logger
use clap::Parser;
use portlog::cli::{execute_command, Args, ConsoleWriter, OutputWriter};
use portlog::PortLogError;

#[tokio::main]
async fn main() -> Result<(), PortLogError> {
    let args = Args::parse();
    let format = args.output;

    if let Err(e) = execute_command(args).await {
        let mut writer = ConsoleWriter::new(format, false);
        if writer.write_error(&e.to_string()).is_err() {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }

    Ok(())
}
