//! Date-range partition generation
//!
//! [`DateRangeGenerator`] turns a start date, an interval and a termination (a count
//! or an end date) into contiguous, non-overlapping RANGE [`PartitionSpec`]s.
//!
//! Boundary `k` is always computed as `start + k * interval`, never by stepping from
//! the previous boundary, so a series starting on the 31st keeps returning to the
//! 31st wherever the month allows it.

use crate::config::NamingConfig;
use crate::error::PartitionError;
use crate::partition::PartitionSpec;
use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Days, Months, NaiveDate, NaiveTime};
use std::fmt::{self, Write};
use std::str::FromStr;

/// Number of partitions generated when neither `count` nor `to` is given
pub const DEFAULT_COUNT: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Interval {
    /// The `k`-th boundary after `start`
    pub fn advance(&self, start: NaiveDate, k: u32) -> Option<NaiveDate> {
        match self {
            Interval::Daily => start.checked_add_days(Days::new(u64::from(k))),
            Interval::Weekly => start.checked_add_days(Days::new(7 * u64::from(k))),
            Interval::Monthly => start.checked_add_months(Months::new(k)),
            Interval::Quarterly => start.checked_add_months(Months::new(k.checked_mul(3)?)),
            Interval::Yearly => start.checked_add_months(Months::new(k.checked_mul(12)?)),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Interval::Daily => "daily",
            Interval::Weekly => "weekly",
            Interval::Monthly => "monthly",
            Interval::Quarterly => "quarterly",
            Interval::Yearly => "yearly",
        };
        f.write_str(name)
    }
}

impl FromStr for Interval {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(Interval::Daily),
            "weekly" | "week" => Ok(Interval::Weekly),
            "monthly" | "month" => Ok(Interval::Monthly),
            "quarterly" | "quarter" => Ok(Interval::Quarterly),
            "yearly" | "year" => Ok(Interval::Yearly),
            other => Err(PartitionError::configuration(format!(
                "unknown interval '{other}' (expected daily, weekly, monthly, quarterly or yearly)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Count(u32),
    Until(NaiveDate),
}

/// Generates RANGE partitions over consecutive date intervals
///
/// `count` and `to` override each other: whichever is called last decides where the
/// series stops.
///
/// ```
/// use chrono::NaiveDate;
/// use partwright::date_range::DateRangeGenerator;
///
/// # fn main() -> Result<(), partwright::PartitionError> {
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let partitions = DateRangeGenerator::monthly(start)
///     .prefix("events_")
///     .count(3)
///     .build()?;
///
/// assert_eq!(partitions[0].name(), "events_2024_01");
/// assert_eq!(partitions.len(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeGenerator {
    interval: Interval,
    start: NaiveDate,
    termination: Termination,
    prefix: String,
    name_format: Option<String>,
    schema: Option<String>,
    tablespace: Option<String>,
    naming: NamingConfig,
}

impl DateRangeGenerator {
    pub fn new(interval: Interval, start: NaiveDate) -> Self {
        Self {
            interval,
            start,
            termination: Termination::Count(DEFAULT_COUNT),
            prefix: String::new(),
            name_format: None,
            schema: None,
            tablespace: None,
            naming: NamingConfig::default(),
        }
    }

    pub fn daily(start: NaiveDate) -> Self {
        Self::new(Interval::Daily, start)
    }

    pub fn weekly(start: NaiveDate) -> Self {
        Self::new(Interval::Weekly, start)
    }

    pub fn monthly(start: NaiveDate) -> Self {
        Self::new(Interval::Monthly, start)
    }

    pub fn quarterly(start: NaiveDate) -> Self {
        Self::new(Interval::Quarterly, start)
    }

    pub fn yearly(start: NaiveDate) -> Self {
        Self::new(Interval::Yearly, start)
    }

    pub fn from(mut self, start: NaiveDate) -> Self {
        self.start = start;
        self
    }

    /// Stop at `end` (exclusive); replaces any earlier `count`
    pub fn to(mut self, end: NaiveDate) -> Self {
        self.termination = Termination::Until(end);
        self
    }

    /// Generate exactly `count` partitions; replaces any earlier `to`
    pub fn count(mut self, count: u32) -> Self {
        self.termination = Termination::Count(count);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Override the interval's name format (strftime, plus `%q` for the quarter)
    pub fn name_format(mut self, format: impl Into<String>) -> Self {
        self.name_format = Some(format.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn tablespace(mut self, tablespace: impl Into<String>) -> Self {
        self.tablespace = Some(tablespace.into());
        self
    }

    pub fn with_naming(mut self, naming: NamingConfig) -> Self {
        self.naming = naming;
        self
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn has_prefix(&self) -> bool {
        !self.prefix.is_empty()
    }

    /// The `[from, to)` pairs this generator covers
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the end date precedes the start or a
    /// boundary falls outside the representable date range.
    pub fn boundaries(&self) -> Result<Vec<(NaiveDate, NaiveDate)>, PartitionError> {
        match self.termination {
            Termination::Count(count) => (0..count)
                .map(|k| Ok((self.boundary(k)?, self.boundary(k + 1)?)))
                .collect(),
            Termination::Until(end) => {
                if end < self.start {
                    return Err(PartitionError::configuration(format!(
                        "date range end {end} is before its start {}",
                        self.start
                    )));
                }

                let mut ranges = Vec::new();
                let mut k = 0;
                loop {
                    let from = self.boundary(k)?;
                    if from >= end {
                        break;
                    }
                    // Clip a non-aligned tail so coverage ends exactly at `end`.
                    let to = self.boundary(k + 1)?.min(end);
                    ranges.push((from, to));
                    k += 1;
                }
                Ok(ranges)
            }
        }
    }

    /// Produce the partition specs
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an inverted range, an invalid name format,
    /// or a generated name that is not a valid identifier.
    pub fn build(&self) -> Result<Vec<PartitionSpec>, PartitionError> {
        let format = self
            .name_format
            .as_deref()
            .unwrap_or_else(|| self.naming.format_for(self.interval));

        self.boundaries()?
            .into_iter()
            .map(|(from, to)| {
                let name = format!(
                    "{}{}{}{}",
                    self.prefix,
                    self.naming.prefix,
                    format_date(from, format)?,
                    self.naming.suffix
                );
                let mut spec = PartitionSpec::range(name, from, to)?;
                if let Some(schema) = &self.schema {
                    spec = spec.with_schema(schema.clone());
                }
                if let Some(tablespace) = &self.tablespace {
                    spec = spec.with_tablespace(tablespace.clone());
                }
                Ok(spec)
            })
            .collect()
    }

    fn boundary(&self, k: u32) -> Result<NaiveDate, PartitionError> {
        self.interval.advance(self.start, k).ok_or_else(|| {
            PartitionError::configuration(format!(
                "{} boundary {k} after {} is out of range",
                self.interval, self.start
            ))
        })
    }
}

/// Format `date` with a strftime pattern that may also contain `%q`
fn format_date(date: NaiveDate, pattern: &str) -> Result<String, PartitionError> {
    let quarter = (date.month0() / 3 + 1).to_string();

    let mut expanded = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            expanded.push(c);
            continue;
        }
        match chars.next() {
            Some('q') => expanded.push_str(&quarter),
            Some(next) => {
                expanded.push('%');
                expanded.push(next);
            }
            None => expanded.push('%'),
        }
    }

    if StrftimeItems::new(&expanded).any(|item| matches!(item, Item::Error)) {
        return Err(PartitionError::configuration(format!(
            "invalid partition name format '{pattern}'"
        )));
    }

    let mut name = String::new();
    write!(name, "{}", date.and_time(NaiveTime::MIN).format(&expanded)).map_err(|_| {
        PartitionError::configuration(format!(
            "partition name format '{pattern}' cannot be applied to {date}"
        ))
    })?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ranges(specs: &[PartitionSpec]) -> Vec<(String, String)> {
        specs
            .iter()
            .map(|s| {
                let (from, to) = s.range_bounds().unwrap();
                (from.to_sql_literal(), to.to_sql_literal())
            })
            .collect()
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!("Monthly".parse::<Interval>().unwrap(), Interval::Monthly);
        assert_eq!("week".parse::<Interval>().unwrap(), Interval::Weekly);
        assert!("fortnightly".parse::<Interval>().unwrap_err().is_configuration());
    }

    #[test]
    fn test_default_count_is_twelve() {
        let specs = DateRangeGenerator::monthly(ymd(2024, 1, 1)).build().unwrap();
        assert_eq!(specs.len(), 12);
        assert_eq!(specs[11].name(), "2024_12");
    }

    #[test]
    fn test_series_is_contiguous_for_every_interval() {
        for interval in [
            Interval::Daily,
            Interval::Weekly,
            Interval::Monthly,
            Interval::Quarterly,
            Interval::Yearly,
        ] {
            for count in [1, 2, 7, 13] {
                let bounds = DateRangeGenerator::new(interval, ymd(2023, 11, 30))
                    .count(count)
                    .boundaries()
                    .unwrap();
                assert_eq!(bounds.len(), count as usize);
                assert_eq!(bounds[0].0, ymd(2023, 11, 30));
                for pair in bounds.windows(2) {
                    assert_eq!(pair[0].1, pair[1].0, "{interval} gap at {:?}", pair);
                }
                assert!(bounds.iter().all(|(from, to)| from < to));
            }
        }
    }

    #[test]
    fn test_explicit_end_covers_exact_range() {
        let specs = DateRangeGenerator::monthly(ymd(2024, 1, 1))
            .to(ymd(2024, 4, 1))
            .build()
            .unwrap();
        assert_eq!(
            ranges(&specs),
            vec![
                ("'2024-01-01'".to_string(), "'2024-02-01'".to_string()),
                ("'2024-02-01'".to_string(), "'2024-03-01'".to_string()),
                ("'2024-03-01'".to_string(), "'2024-04-01'".to_string()),
            ]
        );
    }

    #[test]
    fn test_quarter_rollover_into_next_year() {
        let specs = DateRangeGenerator::quarterly(ymd(2024, 10, 1))
            .count(2)
            .build()
            .unwrap();
        assert_eq!(specs[0].name(), "2024_Q4");
        assert_eq!(specs[1].name(), "2025_Q1");
        assert_eq!(ranges(&specs)[1].1, "'2025-04-01'");
    }

    #[test]
    fn test_month_end_start_does_not_drift() {
        let bounds = DateRangeGenerator::monthly(ymd(2024, 1, 31))
            .count(3)
            .boundaries()
            .unwrap();
        assert_eq!(
            bounds,
            vec![
                (ymd(2024, 1, 31), ymd(2024, 2, 29)),
                (ymd(2024, 2, 29), ymd(2024, 3, 31)),
                (ymd(2024, 3, 31), ymd(2024, 4, 30)),
            ]
        );
    }

    #[test]
    fn test_count_and_to_last_writer_wins() {
        let by_count = DateRangeGenerator::monthly(ymd(2024, 1, 1))
            .to(ymd(2025, 1, 1))
            .count(2)
            .build()
            .unwrap();
        assert_eq!(by_count.len(), 2);

        let by_end = DateRangeGenerator::monthly(ymd(2024, 1, 1))
            .count(2)
            .to(ymd(2024, 6, 1))
            .build()
            .unwrap();
        assert_eq!(by_end.len(), 5);
    }

    #[test]
    fn test_degenerate_and_inverted_ends() {
        let empty = DateRangeGenerator::daily(ymd(2024, 1, 1))
            .to(ymd(2024, 1, 1))
            .build()
            .unwrap();
        assert!(empty.is_empty());

        let err = DateRangeGenerator::daily(ymd(2024, 1, 2))
            .to(ymd(2024, 1, 1))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_non_aligned_end_clips_last_partition() {
        let bounds = DateRangeGenerator::monthly(ymd(2024, 1, 1))
            .to(ymd(2024, 2, 15))
            .boundaries()
            .unwrap();
        assert_eq!(
            bounds,
            vec![
                (ymd(2024, 1, 1), ymd(2024, 2, 1)),
                (ymd(2024, 2, 1), ymd(2024, 2, 15)),
            ]
        );
    }

    #[test]
    fn test_naming_formats_and_affixes() {
        let naming = NamingConfig {
            prefix: "p".to_string(),
            suffix: "_v1".to_string(),
            ..NamingConfig::default()
        };
        let specs = DateRangeGenerator::weekly(ymd(2024, 1, 1))
            .prefix("metrics_")
            .with_naming(naming)
            .count(1)
            .schema("archive")
            .tablespace("cold")
            .build()
            .unwrap();
        assert_eq!(specs[0].name(), "metrics_p2024_W01_v1");
        assert_eq!(specs[0].schema(), Some("archive"));
        assert_eq!(specs[0].tablespace(), Some("cold"));

        let daily = DateRangeGenerator::daily(ymd(2024, 3, 9))
            .name_format("d%Y%m%d")
            .count(1)
            .build()
            .unwrap();
        assert_eq!(daily[0].name(), "d20240309");
    }

    #[test]
    fn test_invalid_name_format_rejected() {
        let err = DateRangeGenerator::monthly(ymd(2024, 1, 1))
            .name_format("%Y_%!")
            .count(1)
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("invalid partition name format"));
    }

    #[test]
    fn test_percent_escape_is_not_a_quarter() {
        assert_eq!(format_date(ymd(2024, 5, 1), "%%q%q").unwrap(), "%q2");
    }
}
