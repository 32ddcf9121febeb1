//! Subscription list in the left panel.

use ratatui::{
  Frame,
  layout::Rect,
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, List, ListItem, ListState},
};

use crate::app::{App, Focus};

pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let focused = app.focus == Focus::Subscriptions;
  let block = Block::default()
    .title(format!(" Subscriptions ({}) ", app.data.subscriptions.len()))
    .borders(Borders::ALL)
    .border_style(super::pane_border(focused));

  let count_style = Style::default().fg(Color::DarkGray);
  let mut items = vec![ListItem::new(Line::from(vec![
    Span::styled("All subscriptions", Style::default().add_modifier(Modifier::BOLD)),
    Span::styled(format!(" ({})", app.data.total_queries()), count_style),
  ]))];
  items.extend(app.data.subscriptions.iter().map(|sub| {
    ListItem::new(Line::from(vec![
      Span::raw(sub.name.clone()),
      Span::styled(
        format!(" ({}/{})", sub.active_query_count(), sub.query_count()),
        count_style,
      ),
    ]))
  }));

  let mut state = ListState::default();
  state.select(Some(app.subscription_cursor));

  let highlight = if focused {
    Style::default()
      .bg(Color::Blue)
      .fg(Color::White)
      .add_modifier(Modifier::BOLD)
  } else {
    Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
  };

  f.render_stateful_widget(
    List::new(items).block(block).highlight_style(highlight),
    area,
    &mut state,
  );
}
