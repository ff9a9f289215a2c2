use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::App;
use crate::logs::FeedState;
use crate::model::{Controller, ControllerActivity};
use crate::status::LoadingState;

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);

    if app.show_help() {
        render_help_modal(frame);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let view = app.view();
    let mut spans = vec![Span::styled(
        " chart-status ",
        Style::default()
            .fg(BG)
            .bg(ACCENT)
            .add_modifier(Modifier::BOLD),
    )];
    if let Some(release) = view.release() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            release.to_string(),
            Style::default().fg(Color::White),
        ));
        spans.push(Span::styled(
            format!("  {}", compact_text(&release.cluster_id, 32)),
            Style::default().fg(MUTED),
        ));
    }
    if let Some(refreshed) = view.last_refreshed() {
        spans.push(Span::styled(
            format!("  updated {}", refreshed.format("%H:%M:%S")),
            Style::default().fg(MUTED),
        ));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    match app.view().loading_state() {
        LoadingState::Idle => render_notice(frame, area, "Waiting for a release", MUTED),
        LoadingState::Loading => render_notice(frame, area, "Loading…", ACCENT),
        LoadingState::Empty { message } => render_notice(frame, area, message, WARN),
        LoadingState::Populated => render_populated(frame, area, app),
    }
}

fn render_notice(frame: &mut Frame, area: Rect, message: &str, color: Color) {
    let panel = Paragraph::new(Text::from(message.to_string()))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(MUTED))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(color));
    frame.render_widget(panel, area);
}

fn render_populated(frame: &mut Frame, area: Rect, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(4)])
        .split(area);
    render_controller_tabs(frame, rows[0], app);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(38), Constraint::Percentage(62)])
        .split(rows[1]);
    render_pods(frame, columns[0], app);
    render_logs(frame, columns[1], app);
}

fn render_controller_tabs(frame: &mut Frame, area: Rect, app: &App) {
    let controllers = app.view().controllers();
    let total = controllers.len();
    let mut spans = Vec::new();
    for (index, controller) in controllers.iter().enumerate() {
        if controller.is_first() {
            spans.push(Span::raw(" "));
        }
        let style = if index == app.active_controller_index() {
            Style::default()
                .fg(BG)
                .bg(ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::styled(controller_tab_label(controller), style));
        if !controller.is_last(total) {
            spans.push(Span::styled(" │ ", Style::default().fg(MUTED)));
        }
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn controller_tab_label(controller: &Controller) -> String {
    let mut label = format!(
        " {} {} ",
        controller.kind.to_ascii_lowercase(),
        compact_text(&controller.name, 24)
    );
    if controller.activity == ControllerActivity::Paused {
        label.push_str(&format!("({}) ", controller.activity.label()));
    }
    label
}

fn render_pods(frame: &mut Frame, area: Rect, app: &App) {
    let tracker = app
        .active_controller()
        .and_then(|controller| app.view().tracker(&controller.id));

    if let Some(error) = tracker.and_then(|tracker| tracker.error()) {
        let panel = Paragraph::new(Text::from(error.to_string()))
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .title("Pods Error")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(ERROR))
                    .style(Style::default().bg(PANEL)),
            )
            .style(Style::default().fg(ERROR));
        frame.render_widget(panel, area);
        return;
    }

    let selected_uid = app.view().cursor().pod_uid().map(str::to_string);
    let pods = app.active_pods();
    let header_row = Row::new(["NAME", "PHASE", "CONTAINERS"].map(|header| {
        Cell::from(header).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let rows = pods.iter().map(|pod| {
        let marker = if selected_uid.as_deref() == Some(pod.uid.as_str()) {
            "● "
        } else {
            "  "
        };
        Row::new([
            Cell::from(format!("{marker}{}", pod.name)),
            Cell::from(pod.phase.clone()).style(Style::default().fg(phase_color(&pod.phase))),
            Cell::from(pod.container_names.len().to_string()),
        ])
        .style(Style::default().fg(Color::White))
    });

    let refreshing = tracker.is_some_and(|tracker| tracker.is_refreshing());
    let title = match (tracker.and_then(|tracker| tracker.selector()), refreshing) {
        (None, _) => "Pods (no selector)".to_string(),
        (Some(_), true) => format!("Pods ({}) ⟳", pods.len()),
        (Some(_), false) => format!("Pods ({})", pods.len()),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(60),
            Constraint::Percentage(25),
            Constraint::Percentage(15),
        ],
    )
    .header(header_row)
    .block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(ACCENT))
            .style(Style::default().bg(PANEL)),
    )
    .column_spacing(1)
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(24, 36, 58))
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

    let mut state = TableState::default();
    if !pods.is_empty() {
        state.select(Some(app.highlighted_pod_index()));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_logs(frame: &mut Frame, area: Rect, app: &App) {
    let view = app.view();
    let selection = view.selection();
    let streamer = view.streamer();

    let title = match view.selected_pod() {
        Some(pod) => {
            let container = selection.container.as_deref().unwrap_or("-");
            let mut title = format!(
                "Logs {}:{} [{}]",
                compact_text(&pod.name, 40),
                container,
                feed_state_label(streamer.state())
            );
            let dropped = streamer.buffer().dropped();
            if dropped > 0 {
                title.push_str(&format!(" {dropped} older lines dropped"));
            }
            title
        }
        None => "Logs".to_string(),
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if selection.pod_error.is_empty() {
            Style::default().fg(MUTED)
        } else {
            Style::default().fg(ERROR)
        })
        .style(Style::default().bg(PANEL));

    if !selection.pod_error.is_empty() {
        let panel = Paragraph::new(Text::from(selection.pod_error.clone()))
            .wrap(Wrap { trim: false })
            .block(block)
            .style(Style::default().fg(ERROR));
        frame.render_widget(panel, area);
        return;
    }

    if selection.pod_uid.is_none() {
        let panel = Paragraph::new("Select a pod to stream its logs.")
            .block(block)
            .style(Style::default().fg(MUTED));
        frame.render_widget(panel, area);
        return;
    }

    let height = area.height.saturating_sub(2) as usize;
    let rendered = streamer
        .buffer()
        .lines()
        .map(|line| line.render())
        .collect::<Vec<_>>();
    let (start, end) = log_window(rendered.len(), height, app.log_scroll());
    let lines = rendered[start..end]
        .iter()
        .map(|line| Line::from(line.clone()))
        .collect::<Vec<_>>();

    frame.render_widget(
        Paragraph::new(lines)
            .block(block)
            .style(Style::default().fg(Color::White)),
        area,
    );
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let (text, color) = match app.last_error() {
        Some(error) => (error, ERROR),
        None => (app.status().to_string(), MUTED),
    };
    let hints = " ←/→ controller  ↑/↓ pod  ⏎ logs  c container  esc clear  r refresh  ? help  q quit";
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(spans_width(hints) as u16),
        ])
        .split(area);

    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            format!(" {}", compact_text(&text, chunks[0].width as usize)),
            Style::default().fg(color),
        )))
        .style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(hints).style(Style::default().bg(BG).fg(MUTED)),
        chunks[1],
    );
}

fn render_help_modal(frame: &mut Frame) {
    let area = centered_rect(60, 60, frame.area());
    frame.render_widget(Clear, area);

    let lines = [
        "←/→  h/l  tab   switch controller",
        "↑/↓  j/k        move between pods",
        "enter           stream logs of the highlighted pod",
        "c               next container of the selected pod",
        "esc             clear the selection and stop the log feed",
        "pgup/pgdn       scroll logs, G or end to follow",
        "r               refresh controllers and pods",
        "q  ctrl-c       quit",
    ]
    .into_iter()
    .map(Line::from)
    .collect::<Vec<_>>();

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(modal, area);
}

fn feed_state_label(state: FeedState) -> &'static str {
    match state {
        FeedState::Idle => "idle",
        FeedState::Opening => "opening",
        FeedState::Streaming => "live",
        FeedState::Ended => "ended",
        FeedState::Failed => "failed",
    }
}

fn phase_color(phase: &str) -> Color {
    match phase {
        "Running" | "Succeeded" => ACCENT,
        "Pending" => WARN,
        "Failed" | "Unknown" => ERROR,
        _ => MUTED,
    }
}

/// Visible slice of `total` lines for a viewport of `height`, `scroll`
/// lines up from the tail. `None` follows the tail.
fn log_window(total: usize, height: usize, scroll: Option<usize>) -> (usize, usize) {
    let end = total.saturating_sub(scroll.unwrap_or(0));
    let start = end.saturating_sub(height);
    (start, end)
}

fn spans_width(text: &str) -> usize {
    text.chars().count()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{compact_text, log_window};

    #[test]
    fn log_window_follows_tail_and_scrolls_up() {
        assert_eq!(log_window(100, 10, None), (90, 100));
        assert_eq!(log_window(100, 10, Some(20)), (70, 80));
        assert_eq!(log_window(5, 10, None), (0, 5));
        assert_eq!(log_window(5, 10, Some(50)), (0, 0));
    }

    #[test]
    fn compact_text_truncates_with_ellipsis() {
        assert_eq!(compact_text("abcdef", 4), "abc…");
        assert_eq!(compact_text("abc", 4), "abc");
    }
}
