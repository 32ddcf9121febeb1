//! Backup browser, drawn over the whole body while the backup screen is open.

use ratatui::{
  Frame,
  layout::{Constraint, Rect},
  style::{Color, Modifier, Style},
  widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
};
use submon_core::store::BackupPool;

use crate::app::App;

pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let title = match app.backup_pool {
    BackupPool::PreIngest => format!(" Pre-ingest backups ({}) ", app.backups.len()),
    BackupPool::General => format!(" General backups ({}) ", app.backups.len()),
  };
  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Cyan));
  let inner = block.inner(area);
  f.render_widget(block, area);

  if app.backups.is_empty() {
    let dir = app.store.backup_settings().dir(app.backup_pool);
    f.render_widget(
      Paragraph::new(format!("No backups in {}. Tab switches pool.", dir.display()))
        .style(Style::default().fg(Color::DarkGray)),
      inner,
    );
    return;
  }

  let header = Row::new(["File", "Created", "Size", "Subscriptions", "Queries", "Status"])
    .style(Style::default().add_modifier(Modifier::BOLD));

  let rows: Vec<Row> = app
    .backups
    .iter()
    .map(|info| {
      let created = info.created_at.with_timezone(&chrono::Local);
      let (status, style) = if info.compatible {
        ("OK", Style::default())
      } else {
        ("Incompatible", Style::default().fg(Color::Red))
      };
      Row::new(vec![
        Cell::from(info.file_name()),
        Cell::from(created.format("%Y-%m-%d %H:%M:%S").to_string()),
        Cell::from(format!("{:.1} KiB", info.size_bytes as f64 / 1024.0)),
        Cell::from(info.subscription_count.to_string()),
        Cell::from(info.query_count.to_string()),
        Cell::from(status),
      ])
      .style(style)
    })
    .collect();

  let mut state = TableState::default();
  state.select(Some(app.backup_cursor));

  f.render_stateful_widget(
    Table::new(rows, [
      Constraint::Min(36),
      Constraint::Length(19),
      Constraint::Length(12),
      Constraint::Length(13),
      Constraint::Length(8),
      Constraint::Length(12),
    ])
    .header(header)
    .row_highlight_style(
      Style::default()
        .bg(Color::Blue)
        .fg(Color::White)
        .add_modifier(Modifier::BOLD),
    ),
    inner,
    &mut state,
  );
}
