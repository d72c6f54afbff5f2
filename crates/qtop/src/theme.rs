use ratatui::style::{Color, Style};

pub const HEADER_STYLE: Style = Style::new().fg(Color::Black).bg(Color::Green);
pub const NODE_NAME: Style = Style::new().fg(Color::Cyan);
pub const METER_USED: Style = Style::new().fg(Color::Green);
pub const METER_FREE: Style = Style::new().fg(Color::DarkGray);
pub const JOB_ID: Style = Style::new().fg(Color::Cyan);
pub const DIM: Style = Style::new().fg(Color::DarkGray);

pub fn state_style(state: &str) -> Style {
    match state {
        "R" => Style::new().fg(Color::Green),
        "C" | "E" => Style::new().fg(Color::Yellow),
        "H" | "Q" | "T" | "W" => Style::new().fg(Color::Cyan),
        _ => Style::new(),
    }
}
