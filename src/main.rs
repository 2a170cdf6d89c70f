use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use wawico::{
    Args, OutputFormat, ShellLauncher, fake_shell_launcher, real_shell_launcher,
    run_with_log_level,
};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let run_result = async {
        let log_level = args.log_level();
        let output_format = args.output_format().unwrap_or(if stdout.is_terminal() {
            OutputFormat::Pretty
        } else {
            OutputFormat::Json
        });
        let config = args.session_config()?;
        let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
        let launcher: Arc<dyn ShellLauncher> = match maybe_fake_args {
            Some(fake_args) => Arc::new(fake_shell_launcher(fake_args)),
            None => real_shell_launcher(),
        };

        run_with_log_level(
            command,
            config,
            &mut stdout,
            launcher,
            log_level,
            output_format,
        )
        .await
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
