use clap::{Arg, ArgAction, ArgMatches, Command};
use futures::StreamExt;
use std::io::{self, BufRead, Write};
use tracing::info;

use promptsmith::config::{ConfigManager, ProviderConfig};
use promptsmith::generator::Generator;
use promptsmith::materializer::Materialized;
use promptsmith::providers::{self, GenerationOptions, Message};
use promptsmith::session;

const KNOWN_PROVIDERS: [&str; 3] = ["openai", "anthropic", "gemini"];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let matches = build_cli().get_matches();

    // The only place exit codes are decided; the library returns typed
    // errors all the way up to here.
    if let Err(error) = run(matches).await {
        eprintln!("✗ {error}");
        std::process::exit(1);
    }
}

fn build_cli() -> Command {
    Command::new("promptsmith")
        .about("Terminal-based AI development assistant")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("init")
                .about("Initialize promptsmith and configure LLM providers")
                .arg(
                    Arg::new("provider")
                        .short('p')
                        .long("provider")
                        .value_name("PROVIDER")
                        .help("Specify provider (openai, anthropic, gemini)"),
                ),
        )
        .subcommand(
            Command::new("change")
                .about("Switch active LLM provider")
                .arg(Arg::new("provider").required(true)),
        )
        .subcommand(
            Command::new("run")
                .about("Generate code or project based on prompt")
                .arg(Arg::new("prompt").required(true))
                .arg(
                    Arg::new("model")
                        .short('m')
                        .long("model")
                        .value_name("MODEL")
                        .help("Specify model to use"),
                ),
        )
        .subcommand(
            Command::new("start")
                .about("Start interactive AI shell")
                .arg(
                    Arg::new("continue")
                        .short('c')
                        .long("continue")
                        .action(ArgAction::SetTrue)
                        .help("Continue previous session"),
                ),
        )
}

async fn run(matches: ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("init", sub)) => init_command(sub),
        Some(("change", sub)) => change_command(sub),
        Some(("run", sub)) => run_command(sub).await,
        Some(("start", sub)) => start_command(sub).await,
        _ => unreachable!("subcommand is required"),
    }
}

fn init_command(matches: &ArgMatches) -> anyhow::Result<()> {
    let manager = ConfigManager::new()?;
    manager.init()?;

    let provider = match matches.get_one::<String>("provider") {
        Some(provider) => provider.clone(),
        None => choose_provider()?,
    };

    print!("Enter {provider} API key: ");
    io::stdout().flush()?;
    let mut api_key = String::new();
    io::stdin().lock().read_line(&mut api_key)?;
    let api_key = api_key.trim().to_string();

    manager.set_provider(
        &provider,
        ProviderConfig {
            api_key,
            model: None,
        },
    )?;
    manager.set_active(&provider)?;

    println!("✓ Configured {provider} as active provider");
    Ok(())
}

fn choose_provider() -> anyhow::Result<String> {
    println!("Select LLM provider:");
    for (i, provider) in KNOWN_PROVIDERS.iter().enumerate() {
        println!("  {}. {provider}", i + 1);
    }
    print!("> ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let choice: usize = line.trim().parse().unwrap_or(1);
    Ok(KNOWN_PROVIDERS
        .get(choice.saturating_sub(1))
        .unwrap_or(&KNOWN_PROVIDERS[0])
        .to_string())
}

fn change_command(matches: &ArgMatches) -> anyhow::Result<()> {
    let provider = matches
        .get_one::<String>("provider")
        .expect("required by clap");
    ConfigManager::new()?.set_active(provider)?;
    println!("✓ Switched to {provider}");
    Ok(())
}

async fn run_command(matches: &ArgMatches) -> anyhow::Result<()> {
    let prompt = matches
        .get_one::<String>("prompt")
        .expect("required by clap");
    let model = matches.get_one::<String>("model").cloned();

    let config = ConfigManager::new()?.load()?;
    let provider = providers::create_provider(&config, model)?;
    let generator = Generator::new(provider);

    println!("Generating...");
    let outcome = generator.generate(prompt, &std::env::current_dir()?).await?;

    match outcome {
        Materialized::Files(paths) => {
            for path in &paths {
                println!("Created: {path}");
            }
            println!("✓ Code generation complete ({} files)", paths.len());
        }
        Materialized::Message(text) => {
            println!("\nResponse:\n{text}");
        }
    }
    Ok(())
}

async fn start_command(matches: &ArgMatches) -> anyhow::Result<()> {
    let manager = ConfigManager::new()?;
    let config = manager.load()?;
    let provider = providers::create_provider(&config, None)?;
    let session_dir = manager.global_dir();

    let mut messages: Vec<Message> = if matches.get_flag("continue") {
        match &session_dir {
            Some(dir) => session::load(dir)?,
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    println!("Promptsmith Interactive Shell");
    println!("Type your message and press Enter. Type \"exit\" to quit.\n");
    if !messages.is_empty() {
        println!("(resumed {} previous messages)\n", messages.len());
    }

    let stdin = io::stdin();
    loop {
        print!("you> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let input = line.trim();
        if input == "exit" {
            break;
        }
        if input.is_empty() {
            continue;
        }

        messages.push(Message::user(input));
        print!("assistant> ");
        io::stdout().flush()?;

        match provider
            .stream_generate(&messages, GenerationOptions::default())
            .await
        {
            Ok(mut stream) => {
                let mut response = String::new();
                while let Some(fragment) = stream.next().await {
                    match fragment {
                        Ok(text) => {
                            print!("{text}");
                            io::stdout().flush()?;
                            response.push_str(&text);
                        }
                        Err(error) => {
                            eprintln!("\nError: {error}\n");
                            break;
                        }
                    }
                }
                println!("\n");
                messages.push(Message::assistant(response));

                if config.history {
                    if let Some(dir) = &session_dir {
                        session::save(dir, &messages)?;
                    }
                }
            }
            Err(error) => {
                // Drop the turn that failed so history stays consistent.
                messages.pop();
                eprintln!("\nError: {error}\n");
            }
        }
    }

    info!("Shell session ended");
    println!("Goodbye!");
    Ok(())
}
