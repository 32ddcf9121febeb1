//! Presentation order and row colors for (subscription, query) pairs.
//!
//! Everything here is a pure function of its inputs and the `now` passed in.

use serde::{Deserialize, Serialize};

use crate::model::Query;

// ─── Ordering ────────────────────────────────────────────────────────────────

/// Priority band of a query in the table. Lower sorts first.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SortTier {
  /// Unacknowledged and has seen at least one file.
  Fresh        = 0,
  /// Unacknowledged and has never seen a file.
  NeverSeen    = 1,
  Acknowledged = 2,
}

/// Composite sort key. Within [`SortTier::NeverSeen`] every row ties.
pub fn sort_key(query: &Query) -> (SortTier, i64) {
  if query.acknowledged {
    (SortTier::Acknowledged, query.last_file_time)
  } else if query.last_file_time == 0 {
    (SortTier::NeverSeen, 0)
  } else {
    (SortTier::Fresh, query.last_file_time)
  }
}

/// Stable in-place sort by [`sort_key`]; equal keys keep input order.
pub fn order(rows: &mut [(&str, &Query)]) {
  rows.sort_by_key(|(_, q)| sort_key(q));
}

// ─── Colors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
  pub r: u8,
  pub g: u8,
  pub b: u8,
}

impl Rgb {
  pub const ACKNOWLEDGED: Rgb = Rgb::new(200, 255, 200);
  pub const DEAD: Rgb = Rgb::new(255, 200, 200);
  pub const PAUSED: Rgb = Rgb::new(230, 230, 230);
  pub const NEVER: Rgb = Rgb::new(240, 240, 240);
  pub const MID_GRADIENT: Rgb = Rgb::new(255, 220, 180);
  pub const FRESHEST: Rgb = Rgb::new(255, 240, 200);
  pub const OLDEST: Rgb = Rgb::new(255, 140, 60);

  pub const fn new(r: u8, g: u8, b: u8) -> Self { Self { r, g, b } }

  /// `#rrggbb`
  pub fn hex(&self) -> String {
    format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
  }

  /// Perceived brightness, used to compare shades in tests and to pick a
  /// readable foreground.
  pub fn luma(&self) -> u32 {
    299 * u32::from(self.r) + 587 * u32::from(self.g) + 114 * u32::from(self.b)
  }
}

/// The normalization domain of the age gradient.
///
/// Only unacknowledged rows with `last_file_time > 0` contribute, even
/// though the other rows are displayed too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GradientDomain {
  pub min_time: i64,
  pub max_time: i64,
}

impl GradientDomain {
  /// `(0, 0)` when no row qualifies.
  pub fn from_rows<'a>(queries: impl IntoIterator<Item = &'a Query>) -> Self {
    let mut times = queries
      .into_iter()
      .filter(|q| !q.acknowledged && q.last_file_time > 0)
      .map(|q| q.last_file_time);

    let Some(first) = times.next() else {
      return Self::default();
    };
    let (min_time, max_time) =
      times.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
    Self { min_time, max_time }
  }

  pub fn is_degenerate(&self) -> bool { self.min_time == self.max_time }
}

/// Everything [`row_color`] looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorInput {
  pub last_file_time: i64,
  pub domain:         GradientDomain,
  pub acknowledged:   bool,
  pub ack_time:       i64,
  pub dead:           bool,
  pub paused:         bool,
}

impl ColorInput {
  pub fn new(query: &Query, domain: GradientDomain) -> Self {
    Self {
      last_file_time: query.last_file_time,
      domain,
      acknowledged: query.acknowledged,
      ack_time: query.acknowledged_time,
      dead: query.dead,
      paused: query.paused,
    }
  }
}

/// Fixed color for a row's status, if one applies.
///
/// An acknowledgment that expired at or before `now` no longer counts.
pub fn status_color(input: &ColorInput, now: i64) -> Option<Rgb> {
  if input.acknowledged && (input.ack_time == 0 || input.ack_time > now) {
    Some(Rgb::ACKNOWLEDGED)
  } else if input.dead {
    Some(Rgb::DEAD)
  } else if input.paused {
    Some(Rgb::PAUSED)
  } else {
    None
  }
}

/// Age gradient: light orange for the freshest file, dark for the oldest.
pub fn age_color(last_file_time: i64, domain: GradientDomain) -> Rgb {
  if last_file_time == 0 {
    return Rgb::NEVER;
  }
  if domain.is_degenerate() {
    return Rgb::MID_GRADIENT;
  }

  let span = (domain.max_time - domain.min_time) as f64;
  let ratio = ((domain.max_time - last_file_time) as f64 / span).clamp(0.0, 1.0);

  // Truncation toward zero, channel by channel.
  let green = (240.0 - ratio * 100.0) as u8;
  let blue = (200.0 - ratio * 140.0) as u8;
  Rgb::new(255, green, blue)
}

pub fn row_color(input: ColorInput, now: i64) -> Rgb {
  status_color(&input, now)
    .unwrap_or_else(|| age_color(input.last_file_time, input.domain))
}

// ─── Combined ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow<'a> {
  pub subscription: &'a str,
  pub query:        &'a Query,
  pub tier:         SortTier,
  pub color:        Rgb,
}

/// Order `rows` and color each one against the domain of the whole set.
pub fn order_and_color<'a>(
  rows: impl IntoIterator<Item = (&'a str, &'a Query)>,
  now: i64,
) -> Vec<RankedRow<'a>> {
  let mut rows: Vec<(&str, &Query)> = rows.into_iter().collect();
  let domain = GradientDomain::from_rows(rows.iter().map(|(_, q)| *q));
  order(&mut rows);

  rows
    .into_iter()
    .map(|(subscription, query)| RankedRow {
      subscription,
      query,
      tier: sort_key(query).0,
      color: row_color(ColorInput::new(query, domain), now),
    })
    .collect()
}
