use clap::{value_parser, Args, Parser, Subcommand};
use std::path::PathBuf;
use unkindle::services::library::DEFAULT_LIBRARY_DIR;
use unkindle::services::window::{DEFAULT_ADVANCE_KEY_CODE, DEFAULT_APP_NAME};
use unkindle::types::{DEFAULT_CAPTURE_DELAY_MS, DEFAULT_TITLE_BAR_INSET};

#[derive(Parser)]
#[command(name = "unkindle")]
#[command(about = "Screenshot every page of an open e-reader book and bind the pages into a PDF")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture pages from the reader window and build book.pdf
    Capture(CaptureArgs),

    /// Build book.pdf from the page captures already in a directory
    Assemble(AssembleArgs),

    /// List books in the library and where each would resume
    Books(BooksArgs),
}

#[derive(Args)]
pub struct CaptureArgs {
    /// Book title; pages go to <library>/<sanitized title>
    #[arg(long, value_name = "TITLE", required_unless_present = "output", conflicts_with = "output")]
    pub book: Option<String>,

    /// Explicit output directory for page captures
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Library root used with --book
    #[arg(long, value_name = "DIR", default_value = DEFAULT_LIBRARY_DIR)]
    pub library: PathBuf,

    /// Delay before each screenshot, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_CAPTURE_DELAY_MS)]
    pub delay: u64,

    /// Page number assigned to the first capture
    #[arg(long, value_name = "N", default_value_t = 1, value_parser = value_parser!(u32).range(1..))]
    pub start_page: u32,

    /// Continue numbering after the last page already in the output directory
    #[arg(long, conflicts_with = "start_page")]
    pub resume: bool,

    /// Stop after this many pages (unlimited when omitted)
    #[arg(long, value_name = "N", value_parser = value_parser!(u32).range(1..))]
    pub max_pages: Option<u32>,

    /// Pixels trimmed from the top of the window to skip the title bar
    #[arg(long, value_name = "PX", default_value_t = DEFAULT_TITLE_BAR_INSET)]
    pub title_bar_inset: i32,

    /// Name of the reader application to automate
    #[arg(long, value_name = "NAME", default_value = DEFAULT_APP_NAME)]
    pub app: String,

    /// Virtual key code that turns the page
    #[arg(long, value_name = "CODE", default_value_t = DEFAULT_ADVANCE_KEY_CODE)]
    pub key_code: u16,

    /// Print the session result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct AssembleArgs {
    /// Directory holding page_<n>_<timestamp>.png captures
    #[arg(value_name = "DIR")]
    pub directory: PathBuf,
}

#[derive(Args)]
pub struct BooksArgs {
    /// Library root
    #[arg(long, value_name = "DIR", default_value = DEFAULT_LIBRARY_DIR)]
    pub library: PathBuf,
}
