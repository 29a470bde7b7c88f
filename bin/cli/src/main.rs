//! `switchyard`: run the routing and orchestration patterns from a terminal.

mod config;
mod demo;
mod error;

use clap::{Parser, Subcommand};
use crate::config::AppConfig;
use crate::error::CliError;
use rootcause::Report;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use switchyard_ai::chain::spec_extraction_chain;
use switchyard_ai::coordinate::booking_coordinator;
use switchyard_ai::fanout::research_fanout;
use switchyard_ai::{
    LlmBackend, PromptVariables, ReflectionConfig, ReflectionLoop, Request, RequestContext,
};
use switchyard_conversation::{Conversation, ToolCallingAgent, ToolRegistry};
use tokio_util::sync::CancellationToken;

/// Requests used by `coordinate` when none are given.
const SAMPLE_REQUESTS: &[&str] = &[
    "Book me a flight to London.",
    "What is the capital of Italy?",
    "Tell me about quantum physics.",
];

#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(version)]
#[command(about = "Classify, route and orchestrate LLM requests", long_about = None)]
struct Cli {
    /// TOML configuration file. `SWITCHYARD__*` variables override it.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Answer with a local keyword-matching model instead of calling a
    /// provider.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify each request and delegate it to the booking, info or
    /// fallback handler.
    Coordinate {
        /// Requests to route; a sample set is used when empty.
        requests: Vec<String>,
    },
    /// Look up a location, falling back to city-level data when the precise
    /// lookup fails.
    Locate {
        query: String,
        /// Make the precise lookup fail.
        #[arg(long)]
        fail_primary: bool,
    },
    /// Generate code for a task and refine it against a critic.
    Reflect { task: String },
    /// Extract technical specifications from text as JSON.
    Chain { text: String },
    /// Summarize, question and extract key terms in parallel, then
    /// synthesize.
    Fanout { topic: String },
    /// Answer questions with the search tool.
    Agent { queries: Vec<String> },
    /// Hold a conversation, one turn per argument.
    Chat { lines: Vec<String> },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Coordinate { .. } => "coordinate",
            Self::Locate { .. } => "locate",
            Self::Reflect { .. } => "reflect",
            Self::Chain { .. } => "chain",
            Self::Fanout { .. } => "fanout",
            Self::Agent { .. } => "agent",
            Self::Chat { .. } => "chat",
        }
    }
}

/// Shared state for one CLI invocation.
struct App {
    config: AppConfig,
    backend: Arc<dyn LlmBackend>,
    shutdown: CancellationToken,
}

impl App {
    /// A fresh context per request: its own id, the shared shutdown token
    /// and the configured deadline.
    fn request_context(&self) -> RequestContext {
        RequestContext::new()
            .with_cancellation(self.shutdown.child_token())
            .with_timeout(self.config.pipeline.request_timeout())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("error: {report}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Report<CliError>> {
    let config = AppConfig::load(cli.config.as_deref()).map_err(|e| {
        Report::new(CliError::Config {
            reason: e.to_string(),
        })
    })?;
    tracing::info!(
        command = cli.command.name(),
        provider = config.llm.provider.as_str(),
        offline = cli.offline,
        "Loaded configuration"
    );

    let backend: Arc<dyn LlmBackend> = if cli.offline {
        Arc::new(demo::offline_backend())
    } else {
        let backend_config = config
            .llm
            .backend_config(std::env::var(crate::config::GOOGLE_API_KEY_VAR).ok())
            .map_err(Report::new)?;
        switchyard_ai::connect(backend_config)
            .map_err(|e| Report::new(e).context(CliError::Backend))?
    };

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling in-flight requests");
            on_signal.cancel();
        }
    });

    let app = App {
        config,
        backend,
        shutdown,
    };
    let result = run_command(&app, cli.command).await;
    app.shutdown.cancel();
    result
}

fn failed(command: &'static str) -> CliError {
    CliError::Command { command }
}

/// Runs one subcommand, printing results to stdout.
async fn run_command(app: &App, command: Command) -> Result<(), Report<CliError>> {
    match command {
        Command::Coordinate { requests } => {
            let coordinator = booking_coordinator(app.backend.clone());
            let requests = if requests.is_empty() {
                SAMPLE_REQUESTS.iter().map(|r| (*r).to_string()).collect()
            } else {
                requests
            };
            for text in requests {
                let delegation = coordinator
                    .handle(&Request::new(text), &app.request_context())
                    .await
                    .map_err(|r| r.context(failed("coordinate")))?;
                println!(
                    "[{}] {}",
                    delegation.classification.label, delegation.result.output
                );
            }
        }
        Command::Locate {
            query,
            fail_primary,
        } => {
            let pipeline = demo::location_pipeline(
                app.backend.clone(),
                app.config.pipeline.agent_max_steps,
                !fail_primary,
            );
            let outcome = pipeline
                .run(&Request::new(query), &app.request_context())
                .await
                .map_err(|r| r.context(failed("locate")))?;
            tracing::info!(
                primary_failed = outcome.state.primary_failed,
                apologized = outcome.apologized,
                "Location lookup finished"
            );
            println!("{}", outcome.output);
        }
        Command::Reflect { task } => {
            let outcome = ReflectionLoop::new(app.backend.clone())
                .with_config(
                    ReflectionConfig::default()
                        .with_max_iterations(app.config.pipeline.reflection_max_iterations),
                )
                .run(&task, &app.request_context())
                .await
                .map_err(|r| r.context(failed("reflect")))?;
            tracing::info!(
                iterations = outcome.iterations.len(),
                converged = outcome.converged,
                "Reflection finished"
            );
            println!("{}", outcome.final_draft);
        }
        Command::Chain { text } => {
            let inputs = PromptVariables::from([("text_input".to_string(), text)]);
            let outcome = spec_extraction_chain(app.backend.clone())
                .run(inputs, &app.request_context())
                .await
                .map_err(|r| r.context(failed("chain")))?;
            println!("{}", outcome.final_output);
        }
        Command::Fanout { topic } => {
            let outcome = research_fanout(app.backend.clone())
                .run(&topic, &app.request_context())
                .await
                .map_err(|r| r.context(failed("fanout")))?;
            for (branch, output) in &outcome.branches {
                tracing::debug!(branch = %branch, output = %output, "Branch output");
            }
            println!("{}", outcome.answer);
        }
        Command::Agent { queries } => {
            let registry = Arc::new(ToolRegistry::new().with_tool(demo::search_information_tool()));
            let mut agent = ToolCallingAgent::new(app.backend.clone(), registry)
                .with_system_prompt("You are a helpful assistant.")
                .with_max_steps(app.config.pipeline.agent_max_steps);
            if let Some(temperature) = app.config.llm.temperature {
                agent = agent.with_temperature(temperature);
            }
            for query in queries {
                let run = agent
                    .run(&query, &app.request_context())
                    .await
                    .map_err(|r| r.context(failed("agent")))?;
                println!("{}", run.answer);
            }
        }
        Command::Chat { lines } => {
            let mut conversation = Conversation::new(app.backend.clone());
            for line in lines {
                let reply = conversation
                    .predict(&line, &app.request_context())
                    .await
                    .map_err(|r| r.context(failed("chat")))?;
                println!("> {line}\n{reply}");
            }
        }
    }
    Ok(())
}
