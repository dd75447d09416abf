use std::fmt;

use chrono::{Duration, NaiveDate};

use crate::models::{Schedule, User};

#[derive(Debug, Clone, PartialEq, Eq)]
/// «Билет»: представление одного плана на странице деталей.
pub struct Ticket {
    /// План.
    pub plan_id: i64,
    /// Название поездки.
    pub title: String,
    /// Место назначения.
    pub destination: String,
    /// Первый день (локальная дата).
    pub start: NaiveDate,
    /// Последний день (локальная дата).
    pub end: NaiveDate,
    /// Никнейм владельца, если он известен.
    pub owner: Option<String>,
    /// Никнеймы компаньонов.
    pub companions: Vec<String>,
    /// URL обложки.
    pub photo_url: Option<String>,
}

impl Ticket {
    /// Строит билет; даты переводятся в локальные через `offset`.
    pub fn from_schedule(schedule: &Schedule, owner: Option<&User>, offset: Duration) -> Self {
        Self {
            plan_id: schedule.id,
            title: schedule.title.clone(),
            destination: schedule.destination.clone(),
            start: (schedule.start_date + offset).date_naive(),
            end: (schedule.end_date + offset).date_naive(),
            owner: owner.map(|user| user.nick.clone()),
            companions: schedule
                .guests
                .iter()
                .map(|guest| guest.nick.clone())
                .collect(),
            photo_url: schedule.photo_url.clone(),
        }
    }

    /// Период вида `2024.06.01 - 2024.06.03`.
    pub fn period(&self) -> String {
        format!(
            "{} - {}",
            self.start.format("%Y.%m.%d"),
            self.end.format("%Y.%m.%d")
        )
    }

    /// Число дней поездки; 0 для перевёрнутого диапазона.
    pub fn days(&self) -> i64 {
        ((self.end - self.start).num_days() + 1).max(0)
    }

    /// Число ночей.
    pub fn nights(&self) -> i64 {
        (self.days() - 1).max(0)
    }

    /// Длительность: `2박 3일` или `당일치기` для поездки в один день.
    pub fn duration_label(&self) -> String {
        match self.days() {
            0 => "-".to_string(),
            1 => "당일치기".to_string(),
            days => format!("{}박 {}일", self.nights(), days),
        }
    }

    /// Отсчёт до начала: `D-3`, `D-DAY`, `D+2`.
    pub fn d_day(&self, today: NaiveDate) -> String {
        let diff = (self.start - today).num_days();
        match diff {
            0 => "D-DAY".to_string(),
            diff if diff > 0 => format!("D-{diff}"),
            diff => format!("D+{}", -diff),
        }
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}] {}", self.plan_id, self.title)?;
        writeln!(f, "destination: {}", self.destination)?;
        writeln!(f, "period: {} ({})", self.period(), self.duration_label())?;
        if let Some(owner) = &self.owner {
            writeln!(f, "owner: {owner}")?;
        }
        if self.companions.is_empty() {
            write!(f, "companions: -")
        } else {
            write!(f, "companions: {}", self.companions.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::UserSummary;

    fn schedule(start_day: u32, end_day: u32) -> Schedule {
        Schedule {
            id: 3,
            title: "Summer".to_string(),
            destination: "Jeju".to_string(),
            start_date: Utc
                .with_ymd_and_hms(2024, 6, start_day, 0, 0, 0)
                .single()
                .expect("valid ts"),
            end_date: Utc
                .with_ymd_and_hms(2024, 6, end_day, 0, 0, 0)
                .single()
                .expect("valid ts"),
            photo_url: None,
            owner: 1,
            guests: vec![UserSummary {
                id: 2,
                nick: "mina".to_string(),
                profile: None,
            }],
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).expect("valid date")
    }

    #[test]
    fn ticket_formats_period_and_duration() {
        let ticket = Ticket::from_schedule(&schedule(1, 3), None, Duration::hours(9));

        assert_eq!(ticket.period(), "2024.06.01 - 2024.06.03");
        assert_eq!(ticket.days(), 3);
        assert_eq!(ticket.duration_label(), "2박 3일");
        assert_eq!(ticket.companions, vec!["mina"]);
    }

    #[test]
    fn single_day_is_a_day_trip() {
        let ticket = Ticket::from_schedule(&schedule(5, 5), None, Duration::zero());
        assert_eq!(ticket.duration_label(), "당일치기");
        assert_eq!(ticket.nights(), 0);
    }

    #[test]
    fn d_day_counts_toward_start() {
        let ticket = Ticket::from_schedule(&schedule(10, 12), None, Duration::zero());

        assert_eq!(ticket.d_day(date(7)), "D-3");
        assert_eq!(ticket.d_day(date(10)), "D-DAY");
        assert_eq!(ticket.d_day(date(12)), "D+2");
    }

    #[test]
    fn owner_nick_is_shown_when_known() {
        let owner = User {
            id: 1,
            nick: "jun".to_string(),
            email: None,
            profile: None,
        };
        let ticket = Ticket::from_schedule(&schedule(1, 2), Some(&owner), Duration::zero());

        assert_eq!(ticket.owner.as_deref(), Some("jun"));
        assert!(ticket.to_string().contains("owner: jun"));
    }
}
