//! Resolution of relative date literals into concrete instants.
//!
//! Every literal denotes a run of whole days in the resolver's timezone.
//! A range spans from `00:00:00` on its first day to `23:59:59.999999999` on
//! its last day, and is returned as UTC instants.

use std::fmt;
use std::sync::Arc;

use chrono::{
    DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc, Weekday,
};
use chrono_tz::Tz;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::literal::{DateLiteral, DynamicDateKind, StaticDateLiteral};
use crate::compiler::{CompiledQuery, DateBound, DateParam, Value};
use crate::error::{SoqlResult, ValidationCode, ValidationError};

/// An inclusive span of days, with its UTC bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

/// Calendar unit a literal counts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Week,
    Month,
    Quarter,
    Year,
    FiscalQuarter,
    FiscalYear,
}

impl Unit {
    fn months(self) -> i64 {
        match self {
            Unit::Week => 0,
            Unit::Month => 1,
            Unit::Quarter | Unit::FiscalQuarter => 3,
            Unit::Year | Unit::FiscalYear => 12,
        }
    }
}

/// Resolves relative date literals against a clock.
#[derive(Clone)]
pub struct DateResolver {
    clock: Arc<dyn Clock>,
    timezone: Tz,
    week_start: Weekday,
    fiscal_year_start: u32,
}

impl fmt::Debug for DateResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DateResolver")
            .field("timezone", &self.timezone)
            .field("week_start", &self.week_start)
            .field("fiscal_year_start", &self.fiscal_year_start)
            .finish_non_exhaustive()
    }
}

impl Default for DateResolver {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl DateResolver {
    /// A resolver in UTC with weeks starting Monday and a January fiscal year.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timezone: Tz::UTC,
            week_start: Weekday::Mon,
            fiscal_year_start: 1,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_week_start(mut self, week_start: Weekday) -> Self {
        self.week_start = week_start;
        self
    }

    /// Set the first month of the fiscal year (1 = January). Values outside
    /// `1..=12` are clamped.
    pub fn with_fiscal_year_start(mut self, month: u32) -> Self {
        self.fiscal_year_start = month.clamp(1, 12);
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    pub fn fiscal_year_start(&self) -> u32 {
        self.fiscal_year_start
    }

    /// The current date in the resolver's timezone.
    pub fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.timezone).date_naive()
    }

    // ========================================================================
    // Literal resolution
    // ========================================================================

    /// Start instant of a static literal.
    pub fn resolve_static(&self, literal: StaticDateLiteral) -> Result<DateTime<Utc>, ValidationError> {
        self.resolve_static_range(literal).map(|r| r.start)
    }

    /// Start instant of a dynamic literal.
    pub fn resolve_dynamic(
        &self,
        kind: DynamicDateKind,
        n: u32,
    ) -> Result<DateTime<Utc>, ValidationError> {
        self.resolve_dynamic_range(kind, n).map(|r| r.start)
    }

    pub fn resolve_static_range(
        &self,
        literal: StaticDateLiteral,
    ) -> Result<DateRange, ValidationError> {
        use StaticDateLiteral::*;

        let today = self.today();
        let days = match literal {
            Yesterday => today.checked_sub_days(Days::new(1)).map(|d| (d, d)),
            Today => Some((today, today)),
            Tomorrow => today.checked_add_days(Days::new(1)).map(|d| (d, d)),
            LastWeek => self.periods(today, Unit::Week, -1, 1),
            ThisWeek => self.periods(today, Unit::Week, 0, 1),
            NextWeek => self.periods(today, Unit::Week, 1, 1),
            LastMonth => self.periods(today, Unit::Month, -1, 1),
            ThisMonth => self.periods(today, Unit::Month, 0, 1),
            NextMonth => self.periods(today, Unit::Month, 1, 1),
            Last90Days => last_n_days(today, 90),
            Next90Days => next_n_days(today, 90),
            LastQuarter => self.periods(today, Unit::Quarter, -1, 1),
            ThisQuarter => self.periods(today, Unit::Quarter, 0, 1),
            NextQuarter => self.periods(today, Unit::Quarter, 1, 1),
            LastYear => self.periods(today, Unit::Year, -1, 1),
            ThisYear => self.periods(today, Unit::Year, 0, 1),
            NextYear => self.periods(today, Unit::Year, 1, 1),
            LastFiscalQuarter => self.periods(today, Unit::FiscalQuarter, -1, 1),
            ThisFiscalQuarter => self.periods(today, Unit::FiscalQuarter, 0, 1),
            NextFiscalQuarter => self.periods(today, Unit::FiscalQuarter, 1, 1),
            LastFiscalYear => self.periods(today, Unit::FiscalYear, -1, 1),
            ThisFiscalYear => self.periods(today, Unit::FiscalYear, 0, 1),
            NextFiscalYear => self.periods(today, Unit::FiscalYear, 1, 1),
        };
        self.finish(DateLiteral::Static(literal), days)
    }

    pub fn resolve_dynamic_range(
        &self,
        kind: DynamicDateKind,
        n: u32,
    ) -> Result<DateRange, ValidationError> {
        use DynamicDateKind::*;

        let today = self.today();
        let count = i64::from(n);
        let days = match kind {
            LastNDays => last_n_days(today, n),
            NextNDays => next_n_days(today, n),
            NDaysAgo => today.checked_sub_days(Days::new(u64::from(n))).map(|d| (d, d)),
            LastNWeeks => self.periods(today, Unit::Week, -count, count),
            NextNWeeks => self.periods(today, Unit::Week, 1, count),
            NWeeksAgo => self.periods(today, Unit::Week, -count, 1),
            LastNMonths => self.periods(today, Unit::Month, -count, count),
            NextNMonths => self.periods(today, Unit::Month, 1, count),
            NMonthsAgo => self.periods(today, Unit::Month, -count, 1),
            LastNQuarters => self.periods(today, Unit::Quarter, -count, count),
            NextNQuarters => self.periods(today, Unit::Quarter, 1, count),
            NQuartersAgo => self.periods(today, Unit::Quarter, -count, 1),
            LastNYears => self.periods(today, Unit::Year, -count, count),
            NextNYears => self.periods(today, Unit::Year, 1, count),
            NYearsAgo => self.periods(today, Unit::Year, -count, 1),
            LastNFiscalQuarters => self.periods(today, Unit::FiscalQuarter, -count, count),
            NextNFiscalQuarters => self.periods(today, Unit::FiscalQuarter, 1, count),
            NFiscalQuartersAgo => self.periods(today, Unit::FiscalQuarter, -count, 1),
            LastNFiscalYears => self.periods(today, Unit::FiscalYear, -count, count),
            NextNFiscalYears => self.periods(today, Unit::FiscalYear, 1, count),
            NFiscalYearsAgo => self.periods(today, Unit::FiscalYear, -count, 1),
        };
        self.finish(DateLiteral::Dynamic { kind, n }, days)
    }

    /// Resolve either kind of literal to its range.
    pub fn resolve_range(&self, literal: DateLiteral) -> Result<DateRange, ValidationError> {
        match literal {
            DateLiteral::Static(lit) => self.resolve_static_range(lit),
            DateLiteral::Dynamic { kind, n } => self.resolve_dynamic_range(kind, n),
        }
    }

    // ========================================================================
    // Compiled query parameters
    // ========================================================================

    /// Fill single-bound date placeholders of a compiled query.
    ///
    /// Recomputes every value from the clock, so calling it again overwrites
    /// previous results rather than failing.
    pub fn resolve_date_params(&self, query: &mut CompiledQuery) -> SoqlResult<()> {
        for param in query.date_params.iter().filter(|p| !p.is_range) {
            let range = self.resolve_range(param.literal)?;
            let value = match param.bound {
                DateBound::Start => bound_value(param, range.start, range.first_day),
                DateBound::End => bound_value(param, range.end, range.last_day),
            };
            set_param(&mut query.params, param.param_index, value)?;
        }
        Ok(())
    }

    /// Fill both ends of range date placeholders of a compiled query.
    pub fn resolve_date_params_for_range(&self, query: &mut CompiledQuery) -> SoqlResult<()> {
        for param in query.date_params.iter().filter(|p| p.is_range) {
            let range = self.resolve_range(param.literal)?;
            set_param(
                &mut query.params,
                param.param_index,
                bound_value(param, range.start, range.first_day),
            )?;
            if let Some(end_index) = param.end_index {
                set_param(
                    &mut query.params,
                    end_index,
                    bound_value(param, range.end, range.last_day),
                )?;
            }
        }
        Ok(())
    }

    /// Fill every date placeholder, point and range alike.
    pub fn resolve_all(&self, query: &mut CompiledQuery) -> SoqlResult<()> {
        self.resolve_date_params(query)?;
        self.resolve_date_params_for_range(query)?;
        trace!(count = query.date_params.len(), "resolved date parameters");
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Days covered by `count` units, starting `offset` units from the one
    /// containing `today`.
    fn periods(
        &self,
        today: NaiveDate,
        unit: Unit,
        offset: i64,
        count: i64,
    ) -> Option<(NaiveDate, NaiveDate)> {
        let origin = self.period_start(today, unit)?;
        let first = shift(origin, unit, offset)?;
        let after = shift(origin, unit, offset.checked_add(count)?)?;
        let last = after.checked_sub_days(Days::new(1))?;
        Some((first, last))
    }

    fn period_start(&self, today: NaiveDate, unit: Unit) -> Option<NaiveDate> {
        let (year, month) = (today.year(), today.month());
        match unit {
            Unit::Week => {
                let back = (7 + today.weekday().num_days_from_monday()
                    - self.week_start.num_days_from_monday())
                    % 7;
                today.checked_sub_days(Days::new(u64::from(back)))
            }
            Unit::Month => NaiveDate::from_ymd_opt(year, month, 1),
            Unit::Quarter => NaiveDate::from_ymd_opt(year, (month - 1) / 3 * 3 + 1, 1),
            Unit::Year => NaiveDate::from_ymd_opt(year, 1, 1),
            Unit::FiscalYear => self.fiscal_year_of(today),
            Unit::FiscalQuarter => {
                let fiscal_year = self.fiscal_year_of(today)?;
                let into_year = (month + 12 - self.fiscal_year_start) % 12;
                fiscal_year.checked_add_months(Months::new(into_year / 3 * 3))
            }
        }
    }

    /// First day of the fiscal year containing `today`.
    fn fiscal_year_of(&self, today: NaiveDate) -> Option<NaiveDate> {
        let year = if today.month() < self.fiscal_year_start {
            today.year() - 1
        } else {
            today.year()
        };
        NaiveDate::from_ymd_opt(year, self.fiscal_year_start, 1)
    }

    fn finish(
        &self,
        literal: DateLiteral,
        days: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<DateRange, ValidationError> {
        let out_of_range = || {
            ValidationError::new(
                ValidationCode::InvalidDateLiteral,
                format!("date literal {} is out of range", literal),
            )
        };
        let (first_day, last_day) = days.ok_or_else(out_of_range)?;
        let start = self.local_midnight(first_day);
        let end = last_day
            .succ_opt()
            .map(|next| self.local_midnight(next) - Duration::nanoseconds(1))
            .ok_or_else(out_of_range)?;

        debug!(%literal, %start, %end, "resolved date literal");
        Ok(DateRange {
            start,
            end,
            first_day,
            last_day,
        })
    }

    /// The UTC instant of `00:00` on `day` in the resolver's timezone.
    ///
    /// When midnight falls in a DST gap, the first valid local time after it
    /// is used.
    fn local_midnight(&self, day: NaiveDate) -> DateTime<Utc> {
        let naive = day.and_time(NaiveTime::MIN);
        self.to_utc(naive)
            .or_else(|| self.to_utc(naive + Duration::hours(1)))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
    }

    fn to_utc(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn last_n_days(today: NaiveDate, n: u32) -> Option<(NaiveDate, NaiveDate)> {
    Some((today.checked_sub_days(Days::new(u64::from(n)))?, today))
}

fn next_n_days(today: NaiveDate, n: u32) -> Option<(NaiveDate, NaiveDate)> {
    Some((today, today.checked_add_days(Days::new(u64::from(n)))?))
}

/// Move a period start by `k` units.
fn shift(date: NaiveDate, unit: Unit, k: i64) -> Option<NaiveDate> {
    if unit == Unit::Week {
        let days = Days::new(k.unsigned_abs().checked_mul(7)?);
        return if k >= 0 {
            date.checked_add_days(days)
        } else {
            date.checked_sub_days(days)
        };
    }
    let months = k.checked_mul(unit.months())?;
    let step = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(step)
    } else {
        date.checked_sub_months(step)
    }
}

fn bound_value(param: &DateParam, instant: DateTime<Utc>, day: NaiveDate) -> Value {
    if param.date_only {
        Value::Date(day)
    } else {
        Value::Timestamp(instant)
    }
}

fn set_param(params: &mut [Value], index: usize, value: Value) -> SoqlResult<()> {
    match params.get_mut(index) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(ValidationError::new(
            ValidationCode::InvalidDateLiteral,
            format!("date parameter ${} is out of bounds", index + 1),
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::FixedClock;

    fn resolver_at(y: i32, m: u32, d: u32) -> DateResolver {
        let now = Utc.with_ymd_and_hms(y, m, d, 15, 30, 0).unwrap();
        DateResolver::new(Arc::new(FixedClock::new(now)))
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn days_of(range: DateRange) -> (NaiveDate, NaiveDate) {
        (range.first_day, range.last_day)
    }

    #[test]
    fn test_today_bounds() {
        let r = resolver_at(2024, 3, 15)
            .resolve_static_range(StaticDateLiteral::Today)
            .unwrap();
        assert_eq!(r.start, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
        assert_eq!(
            r.end,
            Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap() - Duration::nanoseconds(1)
        );
    }

    #[test]
    fn test_weeks() {
        let r = resolver_at(2024, 3, 15);
        assert_eq!(
            days_of(r.resolve_static_range(StaticDateLiteral::ThisWeek).unwrap()),
            (day(2024, 3, 11), day(2024, 3, 17))
        );
        assert_eq!(
            days_of(r.resolve_static_range(StaticDateLiteral::LastWeek).unwrap()),
            (day(2024, 3, 4), day(2024, 3, 10))
        );

        let sunday = resolver_at(2024, 3, 15).with_week_start(Weekday::Sun);
        assert_eq!(
            days_of(sunday.resolve_static_range(StaticDateLiteral::ThisWeek).unwrap()),
            (day(2024, 3, 10), day(2024, 3, 16))
        );
    }

    #[test]
    fn test_months_and_quarters() {
        let r = resolver_at(2024, 3, 15);
        assert_eq!(
            days_of(r.resolve_static_range(StaticDateLiteral::LastMonth).unwrap()),
            (day(2024, 2, 1), day(2024, 2, 29))
        );
        assert_eq!(
            days_of(r.resolve_static_range(StaticDateLiteral::NextQuarter).unwrap()),
            (day(2024, 4, 1), day(2024, 6, 30))
        );
        assert_eq!(
            days_of(r.resolve_dynamic_range(DynamicDateKind::LastNMonths, 2).unwrap()),
            (day(2024, 1, 1), day(2024, 2, 29))
        );
        assert_eq!(
            days_of(r.resolve_dynamic_range(DynamicDateKind::NYearsAgo, 1).unwrap()),
            (day(2023, 1, 1), day(2023, 12, 31))
        );
    }

    #[test]
    fn test_n_days() {
        let r = resolver_at(2024, 3, 15);
        assert_eq!(
            days_of(r.resolve_dynamic_range(DynamicDateKind::LastNDays, 30).unwrap()),
            (day(2024, 2, 14), day(2024, 3, 15))
        );
        assert_eq!(
            days_of(r.resolve_dynamic_range(DynamicDateKind::NextNDays, 3).unwrap()),
            (day(2024, 3, 15), day(2024, 3, 18))
        );
        assert_eq!(
            days_of(r.resolve_dynamic_range(DynamicDateKind::NDaysAgo, 5).unwrap()),
            (day(2024, 3, 10), day(2024, 3, 10))
        );
    }

    #[test]
    fn test_fiscal_periods() {
        let r = resolver_at(2024, 3, 15).with_fiscal_year_start(4);
        assert_eq!(
            days_of(r.resolve_static_range(StaticDateLiteral::ThisFiscalYear).unwrap()),
            (day(2023, 4, 1), day(2024, 3, 31))
        );
        assert_eq!(
            days_of(r.resolve_static_range(StaticDateLiteral::ThisFiscalQuarter).unwrap()),
            (day(2024, 1, 1), day(2024, 3, 31))
        );
        assert_eq!(
            days_of(r.resolve_static_range(StaticDateLiteral::NextFiscalQuarter).unwrap()),
            (day(2024, 4, 1), day(2024, 6, 30))
        );
    }

    #[test]
    fn test_timezone_shifts_bounds() {
        let r = resolver_at(2024, 3, 15).with_timezone(chrono_tz::America::New_York);
        let range = r.resolve_static_range(StaticDateLiteral::Today).unwrap();
        assert_eq!(range.first_day, day(2024, 3, 15));
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 3, 15, 4, 0, 0).unwrap());
    }

    #[test]
    fn test_out_of_range_literal() {
        let err = resolver_at(2024, 3, 15)
            .resolve_dynamic_range(DynamicDateKind::NextNYears, u32::MAX)
            .unwrap_err();
        assert_eq!(err.code, ValidationCode::InvalidDateLiteral);
    }
}
