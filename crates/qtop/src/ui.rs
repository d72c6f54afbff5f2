//! Dashboard rendering: cluster header, node meters, job-group table.

use chrono::Local;
use qtop_core::{ClusterSummary, JobSummary, NodeSummary, Summary};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Cell, Paragraph, Row, Table},
    Frame,
};

use crate::theme;

const X_MARGIN: usize = 2;
const UTIL_WIDTH: usize = 7; // "[nn/nn]"

pub fn render(frame: &mut Frame, summary: Option<&Summary>, user: &str) {
    let area = frame.size();

    let Some(summary) = summary else {
        frame.render_widget(Paragraph::new("Waiting for the first refresh..."), area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(summary.nodes.len() as u16),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .split(area);

    frame.render_widget(cluster_line(&summary.cluster, area.width), chunks[0]);
    frame.render_widget(node_panel(&summary.nodes, user), chunks[2]);
    render_jobs(frame, &summary.jobs, user, chunks[4]);
}

fn cluster_line(cluster: &ClusterSummary, width: u16) -> Paragraph<'static> {
    let stat = format!(
        "{:margin$}{} running, {} waiting / {} free",
        "",
        cluster.running_jobs,
        cluster.waiting_jobs,
        cluster.free_slots.max(0),
        margin = X_MARGIN,
    );
    let stamp = Local::now().format("%b %e %H:%M:%S").to_string();
    let pad = (width as usize).saturating_sub(stat.len() + stamp.len() + X_MARGIN);

    Paragraph::new(Line::from(vec![
        Span::raw(stat),
        Span::raw(" ".repeat(pad)),
        Span::raw(stamp),
    ]))
}

fn node_panel(nodes: &[NodeSummary], user: &str) -> Paragraph<'static> {
    let name_width = nodes.iter().map(|n| n.name.len()).max().unwrap_or(0);
    let meter_width = nodes
        .iter()
        .map(|n| n.avail_slots.max(n.used_slots) as usize)
        .max()
        .unwrap_or(0);
    let owners_x = name_width + 1 + UTIL_WIDTH + 1 + meter_width + X_MARGIN;

    let mut lines = Vec::with_capacity(nodes.len());
    for node in nodes {
        let mut spans = vec![Span::raw(" ".repeat(X_MARGIN))];

        let name_style = if node.active {
            theme::NODE_NAME
        } else {
            theme::DIM
        };
        spans.push(Span::styled(
            format!("{:<name_width$}", node.name),
            name_style,
        ));
        spans.push(Span::raw(" "));

        let util = if node.active {
            format!("[{:2}/{:2}]", node.used_slots, node.avail_slots)
        } else {
            "[--/--]".to_string()
        };
        spans.push(Span::styled(util, theme::DIM));
        spans.push(Span::raw(" "));

        let used = node.used_slots as usize;
        let free = node.avail_slots.saturating_sub(node.used_slots) as usize;
        spans.push(Span::styled("|".repeat(used), theme::METER_USED));
        spans.push(Span::styled(".".repeat(free), theme::METER_FREE));

        let drawn = name_width + 1 + UTIL_WIDTH + 1 + used + free;
        spans.push(Span::raw(" ".repeat(owners_x.saturating_sub(drawn))));

        for owner in &node.owners {
            let short = abbrev_owner(&owner.owner);
            let style = if short == user {
                Style::default()
            } else {
                theme::DIM
            };
            spans.push(Span::styled(format!("{}:{}", owner.occupancy, short), style));
            spans.push(Span::raw(" "));
        }

        lines.push(Line::from(spans));
    }

    Paragraph::new(lines)
}

fn render_jobs(frame: &mut Frame, jobs: &[JobSummary], user: &str, area: Rect) {
    let header = Row::new(vec![
        "USER", "JOB", "S", "NJOB", "NCPU", "  CPU%", " MAX TIME", "JID",
    ])
    .style(theme::HEADER_STYLE);

    let rows: Vec<Row> = jobs
        .iter()
        .map(|job| {
            let owner = abbrev_owner(&job.owner).to_string();
            let mine = owner == user;
            let owner_style = if mine { Style::default() } else { theme::DIM };
            let id_style = if mine { theme::JOB_ID } else { theme::DIM };

            Row::new(vec![
                Cell::from(Span::styled(owner, owner_style)),
                Cell::from(job.name.clone()),
                Cell::from(Span::styled(
                    job.state.clone(),
                    theme::state_style(&job.state),
                )),
                Cell::from(format!("{:4}", job.count)),
                Cell::from(format!("{:4}", job.occupancy)),
                Cell::from(format!("{:6.1}", job.cpu_usage * 100.0)),
                Cell::from(format!("{:>9}", format_clock(job.max_walltime))),
                Cell::from(Span::styled(compress_ids(&job.ids), id_style)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(10),
        Constraint::Length(job_name_width(area.width)),
        Constraint::Length(1),
        Constraint::Length(4),
        Constraint::Length(4),
        Constraint::Length(6),
        Constraint::Length(9),
        Constraint::Min(8),
    ];

    let table = Table::new(rows, widths).header(header).column_spacing(1);
    frame.render_widget(table, area);
}

fn job_name_width(total: u16) -> u16 {
    (total.saturating_sub(32) * 2 / 5).max(20)
}

/// Renders seconds as `h:mm:ss`.
pub fn format_clock(seconds: u64) -> String {
    let minutes = seconds / 60;
    format!("{}:{:02}:{:02}", minutes / 60, minutes % 60, seconds % 60)
}

fn abbrev_owner(owner: &str) -> &str {
    match owner.split_once('@') {
        Some((user, _)) => user,
        None => owner,
    }
}

fn abbrev_id(id: &str) -> &str {
    match id.split_once('.') {
        Some((head, _)) => head,
        None => id,
    }
}

/// Compact display form of a group's job IDs: server suffixes dropped, and
/// an array job collapsed to its shared `prefix[` as `prefix]`.
fn compress_ids(ids: &[String]) -> String {
    let prefix = common_prefix(ids);
    if prefix.ends_with('[') {
        return format!("{prefix}]");
    }

    ids.iter()
        .map(|id| abbrev_id(id))
        .collect::<Vec<_>>()
        .join(" ")
}

fn common_prefix(ids: &[String]) -> &str {
    let Some(first) = ids.first() else {
        return "";
    };

    let mut prefix = first.as_str();
    for id in &ids[1..] {
        let n = mismatch(prefix, id);
        prefix = &prefix[..n];
    }
    prefix
}

fn mismatch(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use qtop_core::batch::parse_clock;

    use super::*;

    #[test]
    fn format_clock_renders_fields() {
        assert_eq!(format_clock(0), "0:00:00");
        assert_eq!(format_clock(90), "0:01:30");
        assert_eq!(format_clock(45296), "12:34:56");
        assert_eq!(format_clock(360_000), "100:00:00");
    }

    #[test]
    fn format_clock_round_trips_through_parse_clock() {
        for n in [0, 1, 59, 60, 3599, 3600, 45296, 1_000_000] {
            assert_eq!(parse_clock(&format_clock(n)).unwrap(), n, "value {n}");
        }
    }

    #[test]
    fn abbreviates_owner_and_id() {
        assert_eq!(abbrev_owner("alice@example.com"), "alice");
        assert_eq!(abbrev_owner("alice"), "alice");
        assert_eq!(abbrev_id("123.torque.example.com"), "123");
        assert_eq!(abbrev_id("123"), "123");
    }

    #[test]
    fn compresses_plain_ids() {
        let ids = vec!["101.srv".to_string(), "102.srv".to_string()];
        assert_eq!(compress_ids(&ids), "101 102");
    }

    #[test]
    fn compresses_array_job_ids() {
        let ids = vec!["77[1].srv".to_string(), "77[2].srv".to_string()];
        assert_eq!(compress_ids(&ids), "77[]");
    }

    #[test]
    fn compresses_empty_id_list() {
        assert_eq!(compress_ids(&[]), "");
    }

    #[test]
    fn job_name_column_has_a_floor() {
        assert_eq!(job_name_width(10), 20);
        assert_eq!(job_name_width(132), 40);
    }
}
