//! Month-grid arithmetic for the life timeline.
//!
//! A life is a grid of `life_expectancy * 12` cells, one per month, starting at
//! the birth date. Cell `n` covers the month that begins `n` months after birth.

use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};

/// Parses the calendar-date prefix of an ISO 8601 string (`2024-05-01` or
/// `2024-05-01T12:00:00.000Z`).
pub fn parse_iso_date(value: &str) -> Option<Date> {
    let format = format_description!("[year]-[month]-[day]");
    let prefix = value.trim().get(..10)?;
    Date::parse(prefix, format).ok()
}

pub fn format_iso_date(date: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    date.format(format)
        .unwrap_or_else(|_| format!("{}-{:02}-{:02}", date.year(), date.month() as u8, date.day()))
}

pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPosition {
    pub year_of_life: u32,
    pub month_of_year: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifeGrid {
    birth: Date,
    life_expectancy: u16,
}

impl LifeGrid {
    pub fn new(birth: Date, life_expectancy: u16) -> Self {
        Self {
            birth,
            life_expectancy,
        }
    }

    pub fn from_iso(birth: &str, life_expectancy: u16) -> Option<Self> {
        parse_iso_date(birth).map(|birth| Self::new(birth, life_expectancy))
    }

    pub fn birth(&self) -> Date {
        self.birth
    }

    pub fn total_months(&self) -> u32 {
        u32::from(self.life_expectancy) * 12
    }

    pub fn months_lived(&self, today: Date) -> u32 {
        let elapsed = whole_months_between(self.birth, today).max(0);
        u32::try_from(elapsed)
            .unwrap_or(u32::MAX)
            .min(self.total_months())
    }

    pub fn months_remaining(&self, today: Date) -> u32 {
        self.total_months() - self.months_lived(today)
    }

    /// The cell a date falls in, or `None` before birth or past the expectancy horizon.
    pub fn cell_for_date(&self, date: Date) -> Option<u32> {
        let elapsed = whole_months_between(self.birth, date);
        let cell = u32::try_from(elapsed).ok()?;
        (cell < self.total_months()).then_some(cell)
    }

    pub fn cell_start(&self, cell: u32) -> Option<Date> {
        if cell >= self.total_months() {
            return None;
        }
        add_months(self.birth, cell)
    }

    pub fn position(&self, cell: u32) -> Option<CellPosition> {
        if cell >= self.total_months() {
            return None;
        }
        Some(CellPosition {
            year_of_life: cell / 12,
            month_of_year: (cell % 12) as u8,
        })
    }
}

fn whole_months_between(from: Date, to: Date) -> i64 {
    let years = i64::from(to.year()) - i64::from(from.year());
    let months = i64::from(to.month() as u8) - i64::from(from.month() as u8);
    let mut total = years * 12 + months;
    if to.day() < from.day() {
        total -= 1;
    }
    total
}

fn add_months(date: Date, months: u32) -> Option<Date> {
    let zero_based = i64::from(date.month() as u8) - 1 + i64::from(months);
    let year = i32::try_from(i64::from(date.year()) + zero_based.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(zero_based.rem_euclid(12) + 1).ok()?).ok()?;
    let day = date.day().min(month.length(year));
    Date::from_calendar_date(year, month, day).ok()
}
