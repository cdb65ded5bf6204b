//! Interactive CLI for Retouch - AI-assisted image editing sessions.

use clap::{Parser, ValueEnum};
use retouch::{
    ApplyOutcome, ArtifactKind, EnvKeyGate, GeminiImageModel, GeminiImageService, ImageArtifact,
    PromptMode, Session, TerminalAuthGate, Tool, VeoVideoService,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "retouch")]
#[command(about = "Edit images and generate media via AI APIs (Gemini, Veo)")]
#[command(version)]
struct Cli {
    /// Image to load at startup
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Gemini image model to use
    #[arg(long, value_enum, default_value = "flash")]
    model: ImageModelArg,

    /// Skip the interactive billing confirmation for video generation
    #[arg(long)]
    yes: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ImageModelArg {
    Flash,
    Pro,
}

impl From<ImageModelArg> for GeminiImageModel {
    fn from(arg: ImageModelArg) -> Self {
        match arg {
            ImageModelArg::Flash => GeminiImageModel::Flash,
            ImageModelArg::Pro => GeminiImageModel::Pro,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let image_service = GeminiImageService::builder().model(cli.model.into()).build()?;
    let video_service = VeoVideoService::builder().build()?;

    let mut session = if cli.yes {
        Session::new(
            Arc::new(image_service),
            Arc::new(video_service),
            Arc::new(EnvKeyGate::new()),
        )
    } else {
        Session::new(
            Arc::new(image_service),
            Arc::new(video_service),
            Arc::new(TerminalAuthGate::new()),
        )
    };

    if let Some(ref path) = cli.image {
        session.upload(ImageArtifact::from_path(path)?);
        println!("Loaded {}", path.display());
    }

    println!("retouch interactive session. Type 'help' for commands.");
    let mut active_tool = Tool::Prompt;
    let stdin = std::io::stdin();

    loop {
        print!("retouch> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };

        match command {
            "help" => print_help(),
            "tools" => print_tools(active_tool),
            "status" => print_status(&session, active_tool),
            "load" => match ImageArtifact::from_path(rest) {
                Ok(image) => {
                    session.upload(image);
                    println!("Loaded {rest}");
                }
                Err(e) => eprintln!("{}", e.user_message()),
            },
            "tool" => match rest.parse::<Tool>() {
                Ok(tool) => {
                    active_tool = tool;
                    println!("Active tool: {}", tool.config().label);
                }
                Err(e) => eprintln!("{e}"),
            },
            "apply" => run_apply(&mut session, active_tool, rest).await,
            "undo" => {
                if !session.undo() {
                    println!("Nothing to undo.");
                }
            }
            "redo" => {
                if !session.redo() {
                    println!("Nothing to redo.");
                }
            }
            "reset" => {
                if !session.reset() {
                    println!("Already at the original.");
                }
            }
            "save" => match session.current() {
                Some(artifact) => {
                    let path = if rest.is_empty() {
                        session
                            .download_file_name()
                            .unwrap_or_else(|| "generated-content.png".into())
                    } else {
                        rest.to_string()
                    };
                    match artifact.save(&path) {
                        Ok(()) => println!("Saved {path}"),
                        Err(e) => eprintln!("{}", e.user_message()),
                    }
                }
                None => println!("Nothing to save."),
            },
            "quit" | "exit" => break,
            other => eprintln!("Unknown command: {other}. Type 'help' for commands."),
        }
    }

    Ok(())
}

async fn run_apply(session: &mut Session, tool: Tool, prompt: &str) {
    println!("{}", progress_message(tool));
    match session.apply(tool, prompt).await {
        Ok(ApplyOutcome::AwaitingAuthorization) => {
            match session.authorize_and_resume().await {
                Ok(outcome) => print_outcome(session, outcome),
                Err(e) => eprintln!("{}", e.user_message()),
            }
        }
        Ok(outcome) => print_outcome(session, outcome),
        Err(e) => eprintln!("{}", e.user_message()),
    }
}

fn progress_message(tool: Tool) -> &'static str {
    match tool {
        Tool::GenerateImage => "Generating new image...",
        Tool::GenerateVideo => {
            "Initializing video generation... This can take several minutes."
        }
        _ => "Applying edit...",
    }
}

fn print_outcome(session: &Session, outcome: ApplyOutcome) {
    match outcome {
        ApplyOutcome::ImageEdited => {
            println!(
                "Edit applied ({} of {} in history).",
                session.history().cursor() + 1,
                session.history().len()
            );
        }
        ApplyOutcome::ImageGenerated => println!("New image generated; history restarted."),
        ApplyOutcome::VideoGenerated => println!("Video generated. Use 'save' to export it."),
        ApplyOutcome::AwaitingAuthorization => {}
    }
}

fn print_help() {
    println!(
        "Commands:\n\
         \x20 load <path>      load an image as the new original\n\
         \x20 tool <name>      select the active tool\n\
         \x20 tools            list tools\n\
         \x20 apply [text]     run the active tool (text for free-text tools)\n\
         \x20 undo / redo      move through the edit history\n\
         \x20 reset            return to the original image\n\
         \x20 save [path]      write the current content to disk\n\
         \x20 status           show session state\n\
         \x20 quit             leave the session"
    );
}

fn print_tools(active: Tool) {
    for tool in Tool::ALL {
        let config = tool.config();
        let marker = if tool == active { "*" } else { " " };
        match config.prompt_mode {
            PromptMode::FreeText { placeholder } => {
                println!("{marker} {:<16} {} ({placeholder})", tool.name(), config.label);
            }
            PromptMode::Fixed { .. } => {
                println!("{marker} {:<16} {}", tool.name(), config.label);
            }
        }
    }
}

fn print_status(session: &Session, active: Tool) {
    match session.current() {
        Some(artifact) => {
            let kind = match artifact.kind() {
                ArtifactKind::Image => "image",
                ArtifactKind::Video => "video",
            };
            println!("Current content: {kind} (.{})", artifact.extension());
        }
        None => println!("No content loaded."),
    }
    println!(
        "History: {} entries, cursor at {}",
        session.history().len(),
        session.history().cursor()
    );
    println!("Active tool: {}", active.config().label);
    if session.has_pending() {
        println!("A video request is suspended awaiting authorization.");
    }
}
