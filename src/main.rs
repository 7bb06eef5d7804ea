use clap::Parser;
use pkg_update::ci::CircleCiClient;
use pkg_update::cli::Cli;
use pkg_update::constants::EXIT_FAILURE;
use pkg_update::forge::GitHubClient;
use pkg_update::orchestrator::Orchestrator;
use pkg_update::output::{self, ConsoleCallbacks};
use pkg_update::shell::SystemShell;
use pkg_update::{logging, wait};

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version are not errors
            if !err.use_stderr() {
                err.exit();
            }
            let _ = err.print();
            std::process::exit(EXIT_FAILURE);
        }
    };

    if let Err(err) = run(cli) {
        eprintln!("error: {:#}", err);
        std::process::exit(EXIT_FAILURE);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Held until the run ends so buffered log lines reach the file.
    let log = logging::init(&cli.log_file, cli.verbosity())?;

    let config = cli
        .into_config(|key| std::env::var(key).ok())
        .inspect_err(|e| tracing::error!("{e}"))?;

    output::print_working_dir(&config.repo_dir(), &config);

    let shell = SystemShell::new(config.command_timeout);
    let ci = CircleCiClient::new(&config.ci_api_url)?;
    let forge = GitHubClient::new(&config.forge_api_url)?;
    let wait = wait::from_policy(config.wait);
    let callbacks = ConsoleCallbacks::new(&config);
    if let Some(spinner) = callbacks.spinner() {
        log.console.attach(spinner.clone());
    }

    let orchestrator = Orchestrator {
        config: &config,
        shell: &shell,
        ci: &ci,
        forge: &forge,
        wait: wait.as_ref(),
        callbacks: &callbacks,
    };

    match orchestrator.run() {
        Ok(report) => {
            output::print_summary(&report, &config);
            Ok(())
        }
        Err(e) => {
            output::print_failure(&e, &config);
            anyhow::bail!("package update aborted at: {}", e.step)
        }
    }
}
