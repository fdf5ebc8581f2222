use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use chat_api::{CancellationSignal, ChatApiConfig, ChatClient};
use chatctl::{logging, ChatSession, Cli, EnvConfig, Flow, ShutdownCoordinator};
use clap::Parser;
use service_bootstrap::{DockerCli, HttpProbe, ServiceBootstrapper};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const PROMPT: &str = "> ";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let env = EnvConfig::from_env();
    logging::init(env.log_filter.as_deref(), cli.verbose);

    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    let context = cli.session_context();

    if !cli.no_bootstrap {
        let probe = Arc::new(HttpProbe::new().context("failed to build health probe")?);
        let runtime = Arc::new(DockerCli::default());
        let mut bootstrapper =
            ServiceBootstrapper::new(cli.bootstrap_config(&env, &cwd), probe, runtime);
        let state = bootstrapper.ensure_available(&context.base_url).await?;
        info!(?state, base_url = %context.base_url, "server available");
    }

    let api_config = ChatApiConfig::new().with_working_directory(&cwd);
    let client = ChatClient::new(api_config.clone()).context("failed to build HTTP client")?;
    let cancellation: CancellationSignal = Arc::new(AtomicBool::new(false));
    let coordinator = Arc::new(ShutdownCoordinator::new(
        api_config,
        &context,
        Arc::clone(&cancellation),
    ));
    #[cfg(unix)]
    let _signals = coordinator
        .install()
        .context("failed to install signal handlers")?;

    let mut session = ChatSession::new(client, context, cancellation);
    let outcome = match &cli.message {
        Some(message) => session
            .turn(message, &mut std::io::stdout())
            .await
            .map(|_| ())
            .map_err(anyhow::Error::from),
        None => repl(&mut session).await,
    };

    coordinator.teardown().await;
    outcome
}

async fn repl(session: &mut ChatSession) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    loop {
        let _ = write!(stdout, "{PROMPT}").and_then(|()| stdout.flush());
        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            let _ = writeln!(stdout);
            return Ok(());
        };

        match session.handle_input(&line, &mut stdout).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => return Ok(()),
            Err(err) => eprintln!("error: {err}"),
        }
    }
}
