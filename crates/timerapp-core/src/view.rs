//! Read-only projections for rendering timers and history.
//!
//! Nothing here mutates or persists; front ends recompute these from a
//! fresh snapshot after every change.

use chrono::Local;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::history::HistoryEntry;
use crate::timer::{Timer, TimerStatus};

/// Which categories a listing shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(String),
}

impl CategoryFilter {
    /// `None` and the literal `"All"` mean no filtering.
    pub fn from_option(category: Option<&str>) -> Self {
        match category {
            None | Some("All") => CategoryFilter::All,
            Some(category) => CategoryFilter::Only(category.to_string()),
        }
    }

    pub fn matches(&self, timer: &Timer) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(category) => timer.category() == category,
        }
    }
}

/// Timers sharing one category, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroup<'a> {
    pub title: &'a str,
    pub timers: Vec<&'a Timer>,
}

/// Partition timers by category, keeping first-seen category order.
pub fn group_by_category<'a>(timers: &'a [Timer], filter: &CategoryFilter) -> Vec<CategoryGroup<'a>> {
    let mut groups: IndexMap<&str, Vec<&Timer>> = IndexMap::new();
    for timer in timers.iter().filter(|t| filter.matches(t)) {
        groups.entry(timer.category()).or_default().push(timer);
    }
    groups
        .into_iter()
        .map(|(title, timers)| CategoryGroup { title, timers })
        .collect()
}

/// Distinct categories in first-seen order.
pub fn categories(timers: &[Timer]) -> Vec<&str> {
    timers
        .iter()
        .map(Timer::category)
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Clock-style remaining time: `"00"`, `"01:05"`, `"01:01:01"`.
///
/// Hours appear only when non-zero; minutes when hours do or when non-zero.
pub fn format_time(total_secs: u64) -> String {
    let hrs = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    let mut parts = Vec::with_capacity(3);
    if hrs > 0 {
        parts.push(format!("{hrs:02}"));
    }
    if hrs > 0 || mins > 0 {
        parts.push(format!("{mins:02}"));
    }
    parts.push(format!("{secs:02}"));
    parts.join(":")
}

/// Unit-suffixed duration: `"5s"`, `"1m 5s"`, `"1h 1m 1s"`.
pub fn format_duration(total_secs: u64) -> String {
    let hrs = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    let mut parts = Vec::with_capacity(3);
    if hrs > 0 {
        parts.push(format!("{hrs}h"));
    }
    if mins > 0 {
        parts.push(format!("{mins}m"));
    }
    parts.push(format!("{secs}s"));
    parts.join(" ")
}

/// Elapsed share of the duration, floored to a whole percent.
pub fn completion_percent(timer: &Timer) -> Option<u64> {
    let duration = timer.duration();
    if duration == 0 {
        return None;
    }
    let elapsed = duration.saturating_sub(timer.remaining());
    Some(elapsed * 100 / duration)
}

/// One rendered timer line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub status: TimerStatus,
    pub remaining: String,
    pub percent: u64,
}

impl TimerRow {
    pub fn from_timer(timer: &Timer) -> Self {
        Self {
            id: timer.id().to_string(),
            name: timer.name().to_string(),
            category: timer.category().to_string(),
            status: timer.status(),
            remaining: format_time(timer.remaining()),
            percent: completion_percent(timer).unwrap_or(0),
        }
    }
}

/// A titled block of rows, one per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub title: String,
    pub rows: Vec<TimerRow>,
}

pub fn sections(timers: &[Timer], filter: &CategoryFilter) -> Vec<Section> {
    group_by_category(timers, filter)
        .into_iter()
        .map(|group| Section {
            title: group.title.to_string(),
            rows: group.timers.into_iter().map(TimerRow::from_timer).collect(),
        })
        .collect()
}

/// One rendered history line, with the completion time in local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRow {
    pub name: String,
    pub completed_at: String,
    pub duration: String,
}

impl HistoryRow {
    pub fn from_entry(entry: &HistoryEntry) -> Self {
        Self {
            name: entry.name.clone(),
            completed_at: entry
                .time
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            duration: format_duration(entry.duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::NewTimer;
    use chrono::Utc;

    fn timer(name: &str, duration: u64, category: &str) -> Timer {
        Timer::new(NewTimer::new(name, duration, category).unwrap())
    }

    #[test]
    fn format_time_examples() {
        assert_eq!(format_time(0), "00");
        assert_eq!(format_time(7), "07");
        assert_eq!(format_time(60), "01:00");
        assert_eq!(format_time(65), "01:05");
        assert_eq!(format_time(3600), "01:00:00");
        assert_eq!(format_time(3661), "01:01:01");
        assert_eq!(format_time(36_005), "10:00:05");
    }

    #[test]
    fn format_duration_examples() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(65), "1m 5s");
        assert_eq!(format_duration(3601), "1h 1s");
        assert_eq!(format_duration(3661), "1h 1m 1s");
    }

    #[test]
    fn completion_percent_floors() {
        let mut t = timer("Focus", 10, "Work");
        assert_eq!(completion_percent(&t), Some(0));

        t.start(Utc::now());
        for _ in 0..3 {
            t.tick(Utc::now());
        }
        assert_eq!(completion_percent(&t), Some(30));

        for _ in 0..7 {
            t.tick(Utc::now());
        }
        assert_eq!(completion_percent(&t), Some(100));

        let mut third = timer("Third", 3, "Work");
        third.start(Utc::now());
        third.tick(Utc::now());
        assert_eq!(completion_percent(&third), Some(33));
    }

    #[test]
    fn grouping_keeps_first_seen_order() {
        let timers = vec![
            timer("A", 5, "Work"),
            timer("B", 5, "Home"),
            timer("C", 5, "Work"),
            timer("D", 5, "Gym"),
        ];
        let groups = group_by_category(&timers, &CategoryFilter::All);
        let titles: Vec<_> = groups.iter().map(|g| g.title).collect();
        assert_eq!(titles, ["Work", "Home", "Gym"]);
        let work: Vec<_> = groups[0].timers.iter().map(|t| t.name()).collect();
        assert_eq!(work, ["A", "C"]);
    }

    #[test]
    fn grouping_applies_filter() {
        let timers = vec![timer("A", 5, "Work"), timer("B", 5, "Home")];
        let groups = group_by_category(&timers, &CategoryFilter::Only("Home".into()));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].timers[0].name(), "B");

        let none = group_by_category(&timers, &CategoryFilter::Only("Gym".into()));
        assert!(none.is_empty());
    }

    #[test]
    fn filter_from_option() {
        assert_eq!(CategoryFilter::from_option(None), CategoryFilter::All);
        assert_eq!(CategoryFilter::from_option(Some("All")), CategoryFilter::All);
        assert_eq!(
            CategoryFilter::from_option(Some("Work")),
            CategoryFilter::Only("Work".into())
        );
    }

    #[test]
    fn categories_are_distinct() {
        let timers = vec![
            timer("A", 5, "Work"),
            timer("B", 5, "Home"),
            timer("C", 5, "Work"),
        ];
        assert_eq!(categories(&timers), ["Work", "Home"]);
    }

    #[test]
    fn rows_render_remaining_and_percent() {
        let timers = vec![timer("Focus", 65, "Work")];
        let sections = sections(&timers, &CategoryFilter::All);
        let row = &sections[0].rows[0];
        assert_eq!(sections[0].title, "Work");
        assert_eq!(row.remaining, "01:05");
        assert_eq!(row.percent, 0);
        assert_eq!(row.status, TimerStatus::Paused);
    }

    #[test]
    fn history_row_formats_duration() {
        let entry = HistoryEntry {
            name: "Focus".into(),
            time: Utc::now(),
            duration: 65,
        };
        let row = HistoryRow::from_entry(&entry);
        assert_eq!(row.duration, "1m 5s");
        assert_eq!(row.completed_at.len(), "2024-01-01 00:00:00".len());
    }
}
