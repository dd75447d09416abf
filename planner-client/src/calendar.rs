//! Развёртка диапазонов дат планов в события по дням для календаря.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use tracing::warn;

use crate::models::Schedule;

/// Сдвиг часового пояса перед выделением дня (KST, UTC+9).
pub const DEFAULT_OFFSET_HOURS: i64 = 9;
/// Максимальная длина одного плана в днях.
pub const DEFAULT_MAX_SPAN_DAYS: i64 = 366;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Подпись плана в ячейке дня.
pub struct CalendarEvent {
    /// План, из которого получено событие.
    pub schedule_id: i64,
    /// Название поездки.
    pub title: String,
    /// Место назначения.
    pub destination: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Почему план не попал в календарь.
pub enum SkipReason {
    /// `end_date < start_date`.
    InvertedRange,
    /// План длиннее допустимого числа дней.
    SpanTooLong {
        /// Сколько дней занял бы план.
        days: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// План, пропущенный при развёртке.
pub struct SkippedSchedule {
    /// Идентификатор плана.
    pub schedule_id: i64,
    /// Название плана.
    pub title: String,
    /// Причина.
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
/// Результат развёртки: события по дням и пропущенные планы.
pub struct CalendarExpansion {
    days: BTreeMap<NaiveDate, Vec<CalendarEvent>>,
    skipped: Vec<SkippedSchedule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Ячейка сетки месяца.
pub struct DayCell {
    /// Дата.
    pub date: NaiveDate,
    /// События дня.
    pub events: Vec<CalendarEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Сетка месяца, недели начинаются с воскресенья.
pub struct MonthGrid {
    /// Год.
    pub year: i32,
    /// Месяц (1..=12).
    pub month: u32,
    /// Недели по 7 ячеек; `None` для дней соседнего месяца.
    pub weeks: Vec<Vec<Option<DayCell>>>,
}

impl CalendarExpansion {
    /// Ключ дня в формате `YYYY-MM-DD`.
    pub fn day_key(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    /// События по дням.
    pub fn days(&self) -> &BTreeMap<NaiveDate, Vec<CalendarEvent>> {
        &self.days
    }

    /// Ключи всех дней с событиями, по возрастанию.
    pub fn keys(&self) -> Vec<String> {
        self.days.keys().copied().map(Self::day_key).collect()
    }

    /// События конкретного дня.
    pub fn events_on(&self, date: NaiveDate) -> &[CalendarEvent] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Общее число записей во всех днях.
    pub fn total_entries(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    /// Планы, не попавшие в календарь.
    pub fn skipped(&self) -> &[SkippedSchedule] {
        &self.skipped
    }

    /// Сетка месяца с событиями. `None` для несуществующего месяца.
    pub fn month_grid(&self, year: i32, month: u32) -> Option<MonthGrid> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };

        let lead = first.weekday().num_days_from_sunday() as usize;
        let mut cells: Vec<Option<DayCell>> = vec![None; lead];
        for date in first.iter_days().take_while(|date| *date < next) {
            cells.push(Some(DayCell {
                date,
                events: self.events_on(date).to_vec(),
            }));
        }
        while cells.len() % 7 != 0 {
            cells.push(None);
        }

        Some(MonthGrid {
            year,
            month,
            weeks: cells.chunks(7).map(<[Option<DayCell>]>::to_vec).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
/// Параметры развёртки.
pub struct CalendarExpander {
    offset: Duration,
    max_span_days: i64,
}

impl Default for CalendarExpander {
    fn default() -> Self {
        Self {
            offset: Duration::hours(DEFAULT_OFFSET_HOURS),
            max_span_days: DEFAULT_MAX_SPAN_DAYS,
        }
    }
}

impl CalendarExpander {
    /// Создаёт развёртку с заданным сдвигом (в часах) и лимитом длины плана.
    pub fn new(offset_hours: i64, max_span_days: i64) -> Self {
        Self {
            offset: Duration::hours(offset_hours),
            max_span_days: max_span_days.max(1),
        }
    }

    /// Сдвиг часового пояса.
    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// Раскладывает планы по дням.
    ///
    /// Каждый план проходится по дням включительно от `start_date` до
    /// `end_date`; к каждому моменту добавляется сдвиг, от результата берётся
    /// дата. План с `end_date < start_date` не даёт ни одной записи и
    /// попадает в `skipped`, как и план длиннее `max_span_days`.
    pub fn expand(&self, schedules: &[Schedule]) -> CalendarExpansion {
        let mut expansion = CalendarExpansion::default();

        for schedule in schedules {
            if schedule.end_date < schedule.start_date {
                warn!(
                    schedule_id = schedule.id,
                    "schedule ends before it starts, not shown in calendar"
                );
                expansion.skipped.push(SkippedSchedule {
                    schedule_id: schedule.id,
                    title: schedule.title.clone(),
                    reason: SkipReason::InvertedRange,
                });
                continue;
            }

            let days = (schedule.end_date - schedule.start_date).num_days() + 1;
            if days > self.max_span_days {
                warn!(
                    schedule_id = schedule.id,
                    days,
                    limit = self.max_span_days,
                    "schedule range too wide, not shown in calendar"
                );
                expansion.skipped.push(SkippedSchedule {
                    schedule_id: schedule.id,
                    title: schedule.title.clone(),
                    reason: SkipReason::SpanTooLong { days },
                });
                continue;
            }

            let event = CalendarEvent {
                schedule_id: schedule.id,
                title: schedule.title.clone(),
                destination: schedule.destination.clone(),
            };

            let mut current = schedule.start_date;
            while current <= schedule.end_date {
                let key = (current + self.offset).date_naive();
                expansion.days.entry(key).or_default().push(event.clone());
                current += Duration::days(1);
            }
        }

        expansion
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
            .single()
            .expect("valid datetime")
    }

    fn schedule(id: i64, title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Schedule {
        Schedule {
            id,
            title: title.to_string(),
            destination: "Jeju".to_string(),
            start_date: start,
            end_date: end,
            photo_url: None,
            owner: 1,
            guests: Vec::new(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn three_day_trip_fills_three_buckets() {
        let schedules = [schedule(1, "A", at(2024, 6, 1, 0), at(2024, 6, 3, 0))];

        let expansion = CalendarExpander::default().expand(&schedules);

        assert_eq!(expansion.keys(), vec!["2024-06-01", "2024-06-02", "2024-06-03"]);
        for day in 1..=3 {
            let events = expansion.events_on(date(2024, 6, day));
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].title, "A");
            assert_eq!(events[0].destination, "Jeju");
        }
    }

    #[test]
    fn entry_count_is_span_plus_one() {
        let cases = [(0, 0), (0, 1), (3, 17), (10, 40)];
        for (offset, length) in cases {
            let start = at(2024, 1, 1, 0) + Duration::days(offset);
            let end = start + Duration::days(length);
            let expansion = CalendarExpander::default().expand(&[schedule(1, "T", start, end)]);
            assert_eq!(expansion.total_entries() as i64, length + 1);
        }
    }

    #[test]
    fn inverted_range_produces_nothing_and_is_reported() {
        let schedules = [schedule(5, "Back", at(2024, 6, 3, 0), at(2024, 6, 1, 0))];

        let expansion = CalendarExpander::default().expand(&schedules);

        assert_eq!(expansion.total_entries(), 0);
        assert_eq!(expansion.skipped().len(), 1);
        assert_eq!(expansion.skipped()[0].schedule_id, 5);
        assert_eq!(expansion.skipped()[0].reason, SkipReason::InvertedRange);
    }

    #[test]
    fn overly_wide_range_is_skipped_instead_of_looping() {
        let schedules = [schedule(9, "Forever", at(2000, 1, 1, 0), at(2999, 1, 1, 0))];

        let expansion = CalendarExpander::new(9, 30).expand(&schedules);

        assert_eq!(expansion.total_entries(), 0);
        assert!(matches!(
            expansion.skipped()[0].reason,
            SkipReason::SpanTooLong { days } if days > 30
        ));
    }

    #[test]
    fn offset_moves_kst_midnight_to_local_day() {
        // 2024-06-01 00:00 KST == 2024-05-31 15:00 UTC
        let schedules = [schedule(1, "K", at(2024, 5, 31, 15), at(2024, 6, 2, 15))];

        let shifted = CalendarExpander::default().expand(&schedules);
        assert_eq!(shifted.keys(), vec!["2024-06-01", "2024-06-02", "2024-06-03"]);

        let utc = CalendarExpander::new(0, DEFAULT_MAX_SPAN_DAYS).expand(&schedules);
        assert_eq!(utc.keys(), vec!["2024-05-31", "2024-06-01", "2024-06-02"]);
    }

    #[test]
    fn overlapping_plans_share_a_day_in_input_order() {
        let schedules = [
            schedule(1, "First", at(2024, 6, 1, 0), at(2024, 6, 2, 0)),
            schedule(2, "Second", at(2024, 6, 2, 0), at(2024, 6, 4, 0)),
        ];

        let expansion = CalendarExpander::default().expand(&schedules);
        let titles: Vec<&str> = expansion
            .events_on(date(2024, 6, 2))
            .iter()
            .map(|event| event.title.as_str())
            .collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[test]
    fn month_grid_starts_on_sunday_and_pads_weeks() {
        let schedules = [schedule(1, "A", at(2024, 6, 1, 0), at(2024, 6, 1, 0))];
        let expansion = CalendarExpander::default().expand(&schedules);

        let grid = expansion.month_grid(2024, 6).expect("june exists");

        // 2024-06-01: суббота
        assert_eq!(grid.weeks.len(), 6);
        assert!(grid.weeks[0][..6].iter().all(Option::is_none));
        let first = grid.weeks[0][6].as_ref().expect("june 1st cell");
        assert_eq!(first.date, date(2024, 6, 1));
        assert_eq!(first.events.len(), 1);
        assert!(grid.weeks.iter().all(|week| week.len() == 7));
    }

    #[test]
    fn month_grid_rejects_invalid_month() {
        assert!(CalendarExpansion::default().month_grid(2024, 13).is_none());
    }
}
