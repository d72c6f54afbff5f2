//! The refresh loop: periodic queries, redraws, and input handling.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use qtop_core::{batch, summarize, Conn, Summary};
use ratatui::{backend::CrosstermBackend, Terminal};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::debug;

use crate::ui;

/// Messages posted to the main loop by the input pump and signal watcher.
enum AppEvent {
    Quit,
    Redraw,
}

pub struct App {
    conn: Box<dyn Conn>,
    interval: Duration,
    user: String,
    summary: Option<Summary>,
}

impl App {
    pub fn new(conn: impl Conn + 'static, interval: Duration) -> Self {
        let user = conn.user().to_string();
        Self {
            conn: Box::new(conn),
            interval,
            user,
            summary: None,
        }
    }

    /// Runs the main loop until quit or a refresh failure.
    ///
    /// The loop is the only consumer of the event channel and the only task
    /// touching the connection; the input pump and signal watcher just post
    /// messages.
    pub fn run(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        spawn_input_pump(tx.clone());
        spawn_signal_watcher(tx).context("cannot install signal handlers")?;

        self.refresh()?;
        self.redraw(terminal)?;

        let mut next_tick = Instant::now() + self.interval;
        loop {
            let timeout = next_tick.saturating_duration_since(Instant::now());
            match rx.recv_timeout(timeout) {
                Ok(AppEvent::Quit) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(AppEvent::Redraw) => self.redraw(terminal)?,
                Err(RecvTimeoutError::Timeout) => {
                    self.refresh()?;
                    self.redraw(terminal)?;
                    next_tick = Instant::now() + self.interval;
                }
            }
        }

        self.conn.close()?;
        Ok(())
    }

    /// Re-queries the scheduler and replaces the published summary whole.
    fn refresh(&mut self) -> Result<()> {
        let nodes = batch::query_nodes(self.conn.as_mut())?;
        let jobs = batch::query_jobs(self.conn.as_mut())?;
        debug!(nodes = nodes.len(), jobs = jobs.len(), "refreshed");
        self.summary = Some(summarize(&nodes, &jobs));
        Ok(())
    }

    fn redraw(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        terminal.clear()?;
        terminal.draw(|frame| ui::render(frame, self.summary.as_ref(), &self.user))?;
        Ok(())
    }
}

fn spawn_input_pump(tx: Sender<AppEvent>) {
    thread::spawn(move || loop {
        let message = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('q') | KeyCode::Char('Q') => Some(AppEvent::Quit),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    Some(AppEvent::Quit)
                }
                KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    Some(AppEvent::Redraw)
                }
                _ => None,
            },
            Ok(Event::Resize(_, _)) => Some(AppEvent::Redraw),
            Ok(_) => None,
            Err(_) => Some(AppEvent::Quit),
        };

        if let Some(message) = message {
            if tx.send(message).is_err() {
                break;
            }
        }
    });
}

fn spawn_signal_watcher(tx: Sender<AppEvent>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        for _ in signals.forever() {
            if tx.send(AppEvent::Quit).is_err() {
                break;
            }
        }
    });
    Ok(())
}
