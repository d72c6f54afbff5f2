mod app;
mod theme;
mod ui;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use qtop_core::Dialer;
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing_subscriber::EnvFilter;

const MIN_INTERVAL: f64 = 1.0;

#[derive(Parser, Debug)]
#[command(name = "qtop", version, about = "Monitor PBS jobs")]
struct Args {
    /// Update interval in seconds
    #[arg(short = 't', long = "interval", default_value_t = 5.0)]
    interval: f64,

    /// Path of the trqauthd UNIX socket
    #[arg(long, default_value = qtop_core::DEFAULT_AUTH_SOCK)]
    auth_sock: PathBuf,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { 64 } else { 0 });
        }
    };

    if args.interval < MIN_INTERVAL {
        eprintln!("option error: update interval is too short");
        std::process::exit(64);
    }

    init_logging();

    if let Err(err) = run(&args) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let dialer = Dialer::new(&args.auth_sock);
    let conn = dialer.dial().context("cannot connect to the PBS server")?;

    let mut terminal = setup_terminal()?;
    let mut app = app::App::new(conn, Duration::from_secs_f64(args.interval));
    let result = app.run(&mut terminal);
    restore_terminal(&mut terminal)?;
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
