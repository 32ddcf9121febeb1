//! TUI rendering: lays out and draws every pane.

pub mod backup_list;
pub mod query_table;
pub mod subscription_panel;

use chrono::Local;
use ratatui::{
  Frame,
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Paragraph},
};

use crate::app::{App, Focus, Screen};

// ─── Root draw ────────────────────────────────────────────────────────────────

/// Main draw function called each frame.
pub fn draw(f: &mut Frame, app: &App) {
  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // header
      Constraint::Min(0),    // body
      Constraint::Length(1), // status bar
    ])
    .split(f.area());

  draw_header(f, rows[0], app);
  match app.screen {
    Screen::Main => draw_main(f, rows[1], app),
    Screen::Backups => backup_list::draw(f, rows[1], app),
  }
  draw_status(f, rows[2], app);
}

// ─── Header ───────────────────────────────────────────────────────────────────

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
  let date = Local::now().format("%Y-%m-%d %H:%M").to_string();

  let left = Span::styled(
    " submon  [r] fetch  [b] backup  [B] backups  [/] search  [q] quit",
    Style::default()
      .fg(Color::White)
      .add_modifier(Modifier::BOLD),
  );
  let right = Span::styled(
    format!(
      "{} queries, {} active  {date} ",
      app.data.total_queries(),
      app.data.total_active_queries()
    ),
    Style::default().fg(Color::Gray),
  );

  let left_width = left.content.chars().count() as u16;
  let right_width = right.content.chars().count() as u16;
  let pad = area
    .width
    .saturating_sub(left_width)
    .saturating_sub(right_width);

  let line = Line::from(vec![left, Span::raw(" ".repeat(pad as usize)), right]);

  let block = Block::default().style(Style::default().bg(Color::DarkGray));
  let inner = block.inner(area);
  f.render_widget(block, area);
  f.render_widget(Paragraph::new(line), inner);
}

// ─── Body ─────────────────────────────────────────────────────────────────────

fn draw_main(f: &mut Frame, area: Rect, app: &App) {
  let cols = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(22), Constraint::Percentage(78)])
    .split(area);

  subscription_panel::draw(f, cols[0], app);
  query_table::draw(f, cols[1], app);
}

/// Border style of a pane: highlighted while it has focus.
pub fn pane_border(focused: bool) -> Style {
  if focused { Style::default().fg(Color::Cyan) } else { Style::default().fg(Color::DarkGray) }
}

// ─── Status bar ───────────────────────────────────────────────────────────────

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
  let (mode_label, hints) = match (app.screen, app.focus) {
    _ if app.prompt.is_some() => ("CONFIRM", "y confirm  any other key cancels"),
    (Screen::Main, _) if app.filter_active => ("SEARCH", "Type to filter  Esc clear  Enter keep"),
    (Screen::Main, Focus::Subscriptions) => (
      "SUBS",
      "↑↓/jk choose  Tab queries  a/1-4 ack  u unack  r fetch  l reload  q quit",
    ),
    (Screen::Main, Focus::Queries) => (
      "QUERIES",
      "↑↓/jk move  Space select  a/1-4 ack  u unack  Tab subs  r fetch  q quit",
    ),
    (Screen::Backups, _) => (
      "BACKUPS",
      "↑↓/jk move  Tab pool  Enter restore  x purge incompatible  Esc back",
    ),
  };

  let status = match &app.prompt {
    Some(prompt) => prompt.question(),
    None if app.status_msg.is_empty() => hints.to_string(),
    None => app.status_msg.clone(),
  };

  let mut spans = vec![Span::styled(
    format!(" {mode_label} "),
    Style::default()
      .fg(Color::Black)
      .bg(Color::Cyan)
      .add_modifier(Modifier::BOLD),
  )];
  if let Some(stage) = app.fetch_stage {
    spans.push(Span::styled(
      format!(" {stage} "),
      Style::default().fg(Color::Black).bg(Color::Yellow),
    ));
  }
  spans.push(Span::styled(
    format!("  {status}"),
    Style::default().fg(if app.prompt.is_some() { Color::Yellow } else { Color::Gray }),
  ));

  f.render_widget(
    Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black)),
    area,
  );
}
