//! Business calendar commands

use anyhow::Result;
use chrono::{Datelike, Local, NaiveDate};
use clap::Subcommand;

use super::cascade_cmd::parse_date;
use super::output::Output;
use crate::domain::{Calendar, DayOff};
use crate::storage::{HolidayFile, Project};

#[derive(Subcommand)]
pub enum CalendarCommands {
    /// Check whether a date is a working day
    Check {
        /// Date (YYYY-MM-DD)
        date: String,
    },

    /// Add business days to a date (negative counts go back)
    ///
    /// Examples:
    ///   cascade calendar add 2025-01-24 1
    ///   cascade calendar add 2025-01-28 -2
    Add {
        /// Date (YYYY-MM-DD)
        date: String,

        /// Business days to add
        #[arg(allow_negative_numbers = true)]
        days: i64,
    },

    /// Count business days between two dates
    Between {
        /// From (YYYY-MM-DD)
        from: String,

        /// To (YYYY-MM-DD)
        to: String,
    },

    /// List holidays observed in the project's region
    Holidays {
        /// Calendar year (defaults to this year)
        #[arg(long)]
        year: Option<i32>,
    },
}

pub fn run(cmd: CalendarCommands, output: &Output) -> Result<()> {
    match cmd {
        CalendarCommands::Check { date } => check_date(output, &date),
        CalendarCommands::Add { date, days } => add_days(output, &date, days),
        CalendarCommands::Between { from, to } => count_between(output, &from, &to),
        CalendarCommands::Holidays { year } => list_holidays(output, year),
    }
}

fn project_calendar(project: &Project, dates: &[NaiveDate]) -> Result<Calendar> {
    let graph = project.load_graph()?;
    project.load_calendar_covering(&graph, dates)
}

fn check_date(output: &Output, date_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let date = parse_date(date_str)?;
    let calendar = project_calendar(&project, &[date])?;

    let day_off = if calendar.is_holiday(date) {
        Some(DayOff::Holiday)
    } else if calendar.is_weekend(date) {
        Some(DayOff::Weekend)
    } else {
        None
    };
    let next = calendar.next_working_day(date);

    if output.is_json() {
        output.data(&serde_json::json!({
            "date": date,
            "weekday": date.weekday().to_string(),
            "working_day": day_off.is_none(),
            "weekend": day_off == Some(DayOff::Weekend),
            "holiday": day_off == Some(DayOff::Holiday),
            "next_working_day": next,
        }));
        return Ok(());
    }

    match day_off {
        None => println!("{} ({}) is a working day", date, date.weekday()),
        Some(DayOff::Weekend) => println!(
            "{} ({}) is a weekend; next working day {}",
            date,
            date.weekday(),
            next
        ),
        Some(DayOff::Holiday) => println!(
            "{} ({}) is a holiday; next working day {}",
            date,
            date.weekday(),
            next
        ),
    }

    Ok(())
}

fn add_days(output: &Output, date_str: &str, days: i64) -> Result<()> {
    let project = Project::open_current()?;
    let date = parse_date(date_str)?;
    let calendar = project_calendar(&project, &[date])?;
    let result = calendar.add_business_days(date, days);

    if output.is_json() {
        output.data(&serde_json::json!({
            "date": date,
            "days": days,
            "result": result,
        }));
    } else {
        println!("{}", result);
    }

    Ok(())
}

fn count_between(output: &Output, from_str: &str, to_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let from = parse_date(from_str)?;
    let to = parse_date(to_str)?;
    let calendar = project_calendar(&project, &[from, to])?;
    let days = calendar.business_days_between(from, to);

    if output.is_json() {
        output.data(&serde_json::json!({
            "from": from,
            "to": to,
            "business_days": days,
        }));
    } else {
        println!("{}", days);
    }

    Ok(())
}

fn list_holidays(output: &Output, year: Option<i32>) -> Result<()> {
    let project = Project::open_current()?;
    let region = project.config().region();
    let year = year.unwrap_or_else(|| Local::now().date_naive().year());

    let source = project.holiday_source();
    let file = if source.path().exists() {
        HolidayFile::load(source.path())?
    } else {
        output.verbose_ctx("calendar", &format!("{} not found", source.path().display()));
        HolidayFile::default()
    };

    let mut holidays: Vec<_> = file
        .holidays
        .iter()
        .filter(|h| h.date.year() == year && h.applies_to(&region))
        .collect();
    holidays.sort_by_key(|h| h.date);

    if output.is_json() {
        output.data(&serde_json::json!({
            "region": region.code(),
            "year": year,
            "holidays": holidays,
        }));
    } else if holidays.is_empty() {
        println!("No holidays for {} in {}", region, year);
    } else {
        println!("Holidays for {} in {}:", region, year);
        for holiday in holidays {
            println!("  {} {} {}", holiday.date, holiday.date.weekday(), holiday.name);
        }
    }

    Ok(())
}
