mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{AssembleArgs, BooksArgs, CaptureArgs, Cli, Commands};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use unkindle::{
    AppleScriptWindow, BookLibrary, CaptureConfig, CaptureController, CaptureResult,
    DocumentAssembler, Result, SessionHandle, SessionStatus, UnkindleError,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Capture(args) => handle_capture_command(args).await,
        Commands::Assemble(args) => handle_assemble_command(args).await,
        Commands::Books(args) => handle_books_command(args).await,
    };

    if let Err(e) = result {
        error!("Operation failed: {}", e);
        std::process::exit(1);
    }

    // The stdin reader thread cannot be interrupted, so leave without waiting on it.
    std::process::exit(0);
}

async fn handle_capture_command(args: &CaptureArgs) -> Result<()> {
    let output_dir = resolve_output_dir(args)?;

    let start_page = if args.resume {
        let page = BookLibrary::resume_page(&output_dir)?;
        info!("Resuming {} at page {}", output_dir.display(), page);
        page
    } else {
        args.start_page
    };

    if cfg!(not(target_os = "macos")) {
        warn!("Window automation uses osascript and screencapture, which need macOS");
    }

    let config = CaptureConfig {
        output_dir,
        capture_delay_ms: args.delay,
        start_page,
        max_pages: args.max_pages,
        title_bar_inset: args.title_bar_inset,
        ..CaptureConfig::new(PathBuf::new())
    };

    info!(
        "Starting capture of {} into {} ({})",
        args.app,
        config.output_dir.display(),
        config
            .max_pages
            .map(|n| format!("up to {} pages", n))
            .unwrap_or_else(|| "until the book ends".to_string())
    );

    let window = Arc::new(AppleScriptWindow::new(args.app.as_str(), args.key_code));
    let (controller, handle) = CaptureController::new(window, config);

    println!("Type 'c' + Enter to stop and build the PDF, 'q' + Enter or Ctrl+C to cancel.");

    let controls = tokio::spawn(watch_controls(handle));
    let result = tokio::spawn(controller.run())
        .await
        .context("capture session task failed")?;
    controls.abort();

    report_capture(&result, args.json)
}

fn resolve_output_dir(args: &CaptureArgs) -> Result<PathBuf> {
    if let Some(output) = &args.output {
        return Ok(output.clone());
    }

    match &args.book {
        Some(title) => BookLibrary::new(&args.library).book_dir(title),
        None => Err(UnkindleError::InvalidOptions {
            reason: "either --book or --output is required".to_string(),
        }),
    }
}

/// Maps keyboard input to session signals until the session ends.
async fn watch_controls(handle: SessionHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Received interrupt signal");
                handle.cancel();
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim().to_lowercase().as_str() {
                    "c" => handle.stop(),
                    "q" => {
                        handle.cancel();
                        break;
                    }
                    _ => {}
                },
                _ => stdin_open = false,
            },
        }
    }
}

fn report_capture(result: &CaptureResult, json: bool) -> Result<()> {
    if json {
        let content =
            serde_json::to_string_pretty(result).context("Failed to serialize capture result")?;
        println!("{}", content);
    } else {
        println!("\n=== Capture Summary ===");
        println!("Status: {}", result.status);
        println!("Pages captured: {}", result.pages_captured);
        if let Some(path) = &result.document_path {
            println!("Document: {}", path.display());
        }
        if let Some(message) = &result.error {
            println!("Error: {}", message);
        }
    }

    if result.success || result.status == SessionStatus::Cancelled {
        Ok(())
    } else {
        Err(anyhow::anyhow!(result
            .error
            .clone()
            .unwrap_or_else(|| "capture failed".to_string()))
        .into())
    }
}

async fn handle_assemble_command(args: &AssembleArgs) -> Result<()> {
    let pages = DocumentAssembler::scan_pages(&args.directory)?;
    info!(
        "Found {} page captures in {}",
        pages.len(),
        args.directory.display()
    );

    let document = DocumentAssembler::assemble(&args.directory).await?;
    println!("Document written to {}", document.display());
    Ok(())
}

async fn handle_books_command(args: &BooksArgs) -> Result<()> {
    let library = BookLibrary::new(&args.library);
    let books = library.list_books().await?;

    println!("\n=== Books in {} ===", library.root().display());
    if books.is_empty() {
        println!("No books yet. Start one with: unkindle capture --book \"<title>\"");
        return Ok(());
    }

    for (idx, book) in books.iter().enumerate() {
        if book.last_page == 0 {
            println!("{}. {} (no pages yet)", idx + 1, book.name);
            continue;
        }

        match book.last_page.checked_add(1) {
            Some(next) => println!(
                "{}. {} ({} pages, resume at page {})",
                idx + 1,
                book.name,
                book.last_page,
                next
            ),
            None => println!("{}. {} ({} pages, cannot resume)", idx + 1, book.name, book.last_page),
        }
    }

    Ok(())
}
