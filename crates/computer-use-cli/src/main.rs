mod desktop;
mod transcript;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cliclack::{input, spinner};
use console::style;
use tracing_subscriber::EnvFilter;

use computer_use::config::{AgentConfig, CoordinateSpace, GroundingPolicy};
use computer_use::dispatcher::ActionDispatcher;
use computer_use::effector::ScreenshotSource;
use computer_use::events::{EventSink, Tone};
use computer_use::grounding::osatlas::OsAtlasBackend;
use computer_use::grounding::GroundingResolver;
use computer_use::models::action::action_definitions;
use computer_use::providers::base::Provider;
use computer_use::providers::configs::ProviderKind;
use computer_use::providers::factory::get_provider;
use computer_use::translate::translate;

use desktop::{DesktopEffector, PrimaryMonitor};
use transcript::Transcript;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Treat each line as a natural-language instruction and let the model pick the action
    #[arg(long)]
    prompt: bool,

    /// Provider preset used with --prompt (openai, openrouter, groq, fireworks, ollama, anthropic)
    #[arg(short, long)]
    provider: Option<ProviderKind>,

    /// Model id or alias
    #[arg(short, long)]
    model: Option<String>,

    /// What to do when an element cannot be located: fail, fallback or retry:<n>
    #[arg(long)]
    grounding_policy: Option<GroundingPolicy>,

    /// Coordinate system of the grounding backend: pixels or normalized:<n>
    #[arg(long)]
    coordinates: Option<CoordinateSpace>,

    /// Write an HTML transcript of the session to this file
    #[arg(long)]
    transcript: Option<PathBuf>,
}

type DesktopDispatcher = ActionDispatcher<DesktopEffector, PrimaryMonitor, Transcript>;

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AgentConfig::from_env(cli.provider, cli.model.clone())?;
    if let Some(policy) = cli.grounding_policy {
        config.grounding_policy = policy;
    }
    if let Some(coordinates) = cli.coordinates {
        config.coordinates = coordinates;
    }

    let backend = OsAtlasBackend::new(config.grounding.clone()).context("Failed to set up grounding")?;
    let resolver = GroundingResolver::new(Box::new(backend), config.coordinates);
    let grounding_backend = resolver.backend_name().to_string();
    let provider = if cli.prompt {
        Some(get_provider(config.provider_config()?)?)
    } else {
        None
    };

    let mut dispatcher = ActionDispatcher::new(
        resolver,
        config.grounding_policy,
        DesktopEffector::new()?,
        PrimaryMonitor,
        Transcript::new(cli.transcript.clone()),
    );

    print_intro(&cli, &config, &grounding_backend, provider.as_deref());
    dispatcher.sink_mut().log("Session started", Tone::Success);

    loop {
        let line: String = match input("Action:").placeholder("").interact() {
            Ok(line) => line,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("stop") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let keep_going = match provider.as_deref() {
            Some(provider) => run_instruction(&mut dispatcher, provider, line),
            None => dispatcher.dispatch(line),
        };
        if !keep_going {
            break;
        }
    }

    dispatcher.sink_mut().log("Session ended", Tone::Detail);
    Ok(())
}

fn print_intro(cli: &Cli, config: &AgentConfig, grounding_backend: &str, provider: Option<&dyn Provider>) {
    println!(
        "computer-use {}",
        style("- type \"stop\" or press Ctrl+C to end the session").dim()
    );
    println!("Available actions:");
    for definition in action_definitions() {
        println!("- {}", definition.signature());
    }
    if let Some(provider) = provider {
        println!(
            "{}",
            style(format!("Instructions are translated by {} ({})", provider.name(), provider.model())).dim()
        );
    } else {
        println!("{}", style("Enter one action per line, e.g. click {\"query\": \"Submit button\"}").dim());
    }
    println!(
        "{}",
        style(format!(
            "Grounding: {} at {} ({}, {})",
            grounding_backend, config.grounding.host, config.grounding_policy, config.coordinates
        ))
        .dim()
    );
    if let Some(path) = &cli.transcript {
        println!("{}", style(format!("Transcript: {}", path.display())).dim());
    }
    println!();
}

/// Ask the model for the next action and dispatch it.
fn run_instruction(dispatcher: &mut DesktopDispatcher, provider: &dyn Provider, instruction: &str) -> bool {
    let screenshot = match dispatcher.screenshots_mut().capture() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            dispatcher
                .sink_mut()
                .log(&format!("Continuing without a screenshot: {}", e), Tone::Warning);
            None
        }
    };

    let spin = spinner();
    spin.start("awaiting suggestion");
    let suggestion = translate(provider, instruction, screenshot.as_deref());
    spin.stop("");

    match suggestion {
        Ok(Some(call)) => {
            let command = call.to_command();
            dispatcher
                .sink_mut()
                .log(&format!("Suggested: {}", command), Tone::Detail);
            dispatcher.dispatch(&command)
        }
        Ok(None) => {
            dispatcher
                .sink_mut()
                .log("The model did not suggest an action", Tone::Warning);
            true
        }
        Err(e) => {
            dispatcher
                .sink_mut()
                .log(&format!("{} failed: {}", e.stage(), e), Tone::Error);
            true
        }
    }
}
