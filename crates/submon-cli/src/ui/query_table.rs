//! The ordered, colored query table in the right panel.

use ratatui::{
  Frame,
  layout::{Constraint, Rect},
  style::{Color, Modifier, Style},
  widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
};
use submon_core::rank::Rgb;

use crate::{
  app::{App, Focus},
  commands::{COLUMNS, cells, foreground},
};

const WIDTHS: [Constraint; 12] = [
  Constraint::Min(12),    // Subscription
  Constraint::Min(14),    // Human Name
  Constraint::Min(14),    // Query Text
  Constraint::Length(16), // Last File Time
  Constraint::Length(5),  // Acknowledged
  Constraint::Length(16), // Ack Until
  Constraint::Length(16), // Last Check
  Constraint::Length(16), // Next Check
  Constraint::Min(10),    // Next Check Status
  Constraint::Min(10),    // File Cache Status
  Constraint::Length(6),  // Paused
  Constraint::Length(4),  // Dead
];

fn color(rgb: Rgb) -> Color { Color::Rgb(rgb.r, rgb.g, rgb.b) }

pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let rows = app.rows();
  let focused = app.focus == Focus::Queries;

  let mut title = match app.subscription_filter() {
    Some(name) => format!(" {name} ({}) ", rows.len()),
    None => format!(" All queries ({}) ", rows.len()),
  };
  if !app.selected.is_empty() {
    title.push_str(&format!("[{} selected] ", app.selected.len()));
  }

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(super::pane_border(focused));
  let mut inner = block.inner(area);
  f.render_widget(block, area);

  if app.filter_active || !app.filter.is_empty() {
    let filter_area = Rect { height: 1, ..inner };
    inner.y += 1;
    inner.height = inner.height.saturating_sub(1);
    let text = if app.filter_active {
      format!("/{}_", app.filter)
    } else {
      format!("/{}", app.filter)
    };
    f.render_widget(
      Paragraph::new(text).style(Style::default().fg(Color::Yellow)),
      filter_area,
    );
  }

  if let Some(error) = &app.data.error {
    f.render_widget(
      Paragraph::new(format!("Could not load subscriptions: {error}"))
        .style(Style::default().fg(Color::Red)),
      inner,
    );
    return;
  }
  if rows.is_empty() {
    let hint = if app.data.total_queries() == 0 {
      "No subscription data. Press r to fetch from the API."
    } else {
      "No queries match the current filter."
    };
    f.render_widget(
      Paragraph::new(hint).style(Style::default().fg(Color::DarkGray)),
      inner,
    );
    return;
  }

  let header = Row::new(COLUMNS.iter().map(|c| Cell::from(*c))).style(
    Style::default()
      .fg(Color::White)
      .add_modifier(Modifier::BOLD),
  );

  let body: Vec<Row> = rows
    .iter()
    .map(|row| {
      let mut style = Style::default()
        .bg(color(row.color))
        .fg(color(foreground(row.color)));
      let mut cells = cells(row, app.now);
      if app.is_selected(row) {
        style = style.add_modifier(Modifier::BOLD);
        cells[0] = format!("● {}", cells[0]);
      }
      Row::new(cells.map(Cell::from)).style(style)
    })
    .collect();

  let mut state = TableState::default();
  state.select(Some(app.query_cursor));

  f.render_stateful_widget(
    Table::new(body, WIDTHS)
      .header(header)
      .column_spacing(1)
      .row_highlight_style(if focused {
        Style::default().add_modifier(Modifier::REVERSED)
      } else {
        Style::default().add_modifier(Modifier::UNDERLINED)
      }),
    inner,
    &mut state,
  );
}
