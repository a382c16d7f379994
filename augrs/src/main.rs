use std::io::Read;
use std::process::ExitCode;

use tracing::debug;
use tracing_subscriber::EnvFilter;

use augrs::cli::{self, CliArgs};
use augrs::{ErrorReporter, Handle};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "AUGSH_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("augsh: {e}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::FAILURE;
        }
    };
    if args.help {
        println!("{}", cli::USAGE);
        return ExitCode::SUCCESS;
    }

    let commands = match collect_commands(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("augsh: {e}");
            return ExitCode::FAILURE;
        }
    };

    let options = args.tree_options(std::env::var(cli::ROOT_ENV).ok());
    let handle = match Handle::create(options).await {
        Ok(h) => h,
        Err(e) => {
            eprintln!("augsh: cannot initialise tree: {e}");
            return ExitCode::FAILURE;
        }
    };
    let reporter = ErrorReporter::new(handle.clone());

    let code = match handle.srun(commands).await {
        Ok(outcome) => {
            for line in &outcome.output {
                println!("{line}");
            }
            if outcome.output.iter().any(|l| l.starts_with("Saving failed")) {
                if let Ok(lines) = reporter.dump_file_errors().await {
                    for line in lines {
                        eprintln!("{line}");
                    }
                }
            }
            match (outcome.failed_at, &outcome.message) {
                (Some(index), Some(message)) => {
                    eprintln!("augsh: command {} failed: {message}", index + 1);
                    ExitCode::FAILURE
                }
                _ => ExitCode::SUCCESS,
            }
        }
        Err(e) => {
            eprintln!("augsh: {e}");
            ExitCode::FAILURE
        }
    };

    if let Err(e) = handle.close().await {
        debug!(error = %e, "close after run");
    }
    code
}

/// Start-up script, then `-f` file, then `-e`/positional commands; stdin
/// when neither of the latter was given.
fn collect_commands(args: &CliArgs) -> std::io::Result<Vec<String>> {
    let mut commands = Vec::new();
    if let Some(rc) = cli::find_user_config() {
        debug!(path = %rc.display(), "reading start-up script");
        commands.extend(cli::script_lines(&std::fs::read_to_string(rc)?));
    }
    if let Some(file) = &args.file {
        commands.extend(cli::script_lines(&std::fs::read_to_string(file)?));
    }
    if args.wants_stdin() {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        commands.extend(cli::script_lines(&text));
    } else {
        commands.extend(args.commands.iter().cloned());
    }
    Ok(commands)
}
