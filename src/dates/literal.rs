//! Relative date literal keywords.

use std::fmt;

/// A relative date literal, either a fixed keyword or one parameterized by `N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateLiteral {
    Static(StaticDateLiteral),
    Dynamic { kind: DynamicDateKind, n: u32 },
}

impl fmt::Display for DateLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateLiteral::Static(lit) => f.write_str(lit.keyword()),
            DateLiteral::Dynamic { kind, n } => write!(f, "{}:{}", kind.keyword(), n),
        }
    }
}

/// Relative date keywords without a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticDateLiteral {
    Yesterday,
    Today,
    Tomorrow,
    LastWeek,
    ThisWeek,
    NextWeek,
    LastMonth,
    ThisMonth,
    NextMonth,
    Last90Days,
    Next90Days,
    LastQuarter,
    ThisQuarter,
    NextQuarter,
    LastYear,
    ThisYear,
    NextYear,
    LastFiscalQuarter,
    ThisFiscalQuarter,
    NextFiscalQuarter,
    LastFiscalYear,
    ThisFiscalYear,
    NextFiscalYear,
}

const STATIC_KEYWORDS: &[(&str, StaticDateLiteral)] = &[
    ("YESTERDAY", StaticDateLiteral::Yesterday),
    ("TODAY", StaticDateLiteral::Today),
    ("TOMORROW", StaticDateLiteral::Tomorrow),
    ("LAST_WEEK", StaticDateLiteral::LastWeek),
    ("THIS_WEEK", StaticDateLiteral::ThisWeek),
    ("NEXT_WEEK", StaticDateLiteral::NextWeek),
    ("LAST_MONTH", StaticDateLiteral::LastMonth),
    ("THIS_MONTH", StaticDateLiteral::ThisMonth),
    ("NEXT_MONTH", StaticDateLiteral::NextMonth),
    ("LAST_90_DAYS", StaticDateLiteral::Last90Days),
    ("NEXT_90_DAYS", StaticDateLiteral::Next90Days),
    ("LAST_QUARTER", StaticDateLiteral::LastQuarter),
    ("THIS_QUARTER", StaticDateLiteral::ThisQuarter),
    ("NEXT_QUARTER", StaticDateLiteral::NextQuarter),
    ("LAST_YEAR", StaticDateLiteral::LastYear),
    ("THIS_YEAR", StaticDateLiteral::ThisYear),
    ("NEXT_YEAR", StaticDateLiteral::NextYear),
    ("LAST_FISCAL_QUARTER", StaticDateLiteral::LastFiscalQuarter),
    ("THIS_FISCAL_QUARTER", StaticDateLiteral::ThisFiscalQuarter),
    ("NEXT_FISCAL_QUARTER", StaticDateLiteral::NextFiscalQuarter),
    ("LAST_FISCAL_YEAR", StaticDateLiteral::LastFiscalYear),
    ("THIS_FISCAL_YEAR", StaticDateLiteral::ThisFiscalYear),
    ("NEXT_FISCAL_YEAR", StaticDateLiteral::NextFiscalYear),
];

impl StaticDateLiteral {
    /// Look up a keyword, case-insensitively.
    pub fn from_keyword(s: &str) -> Option<Self> {
        STATIC_KEYWORDS
            .iter()
            .find(|(kw, _)| kw.eq_ignore_ascii_case(s))
            .map(|(_, lit)| *lit)
    }

    pub fn keyword(&self) -> &'static str {
        STATIC_KEYWORDS
            .iter()
            .find(|(_, lit)| lit == self)
            .map(|(kw, _)| *kw)
            .unwrap_or("TODAY")
    }
}

/// Relative date keywords that take `:N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicDateKind {
    LastNDays,
    NextNDays,
    NDaysAgo,
    LastNWeeks,
    NextNWeeks,
    NWeeksAgo,
    LastNMonths,
    NextNMonths,
    NMonthsAgo,
    LastNQuarters,
    NextNQuarters,
    NQuartersAgo,
    LastNYears,
    NextNYears,
    NYearsAgo,
    LastNFiscalQuarters,
    NextNFiscalQuarters,
    NFiscalQuartersAgo,
    LastNFiscalYears,
    NextNFiscalYears,
    NFiscalYearsAgo,
}

const DYNAMIC_KEYWORDS: &[(&str, DynamicDateKind)] = &[
    ("LAST_N_DAYS", DynamicDateKind::LastNDays),
    ("NEXT_N_DAYS", DynamicDateKind::NextNDays),
    ("N_DAYS_AGO", DynamicDateKind::NDaysAgo),
    ("LAST_N_WEEKS", DynamicDateKind::LastNWeeks),
    ("NEXT_N_WEEKS", DynamicDateKind::NextNWeeks),
    ("N_WEEKS_AGO", DynamicDateKind::NWeeksAgo),
    ("LAST_N_MONTHS", DynamicDateKind::LastNMonths),
    ("NEXT_N_MONTHS", DynamicDateKind::NextNMonths),
    ("N_MONTHS_AGO", DynamicDateKind::NMonthsAgo),
    ("LAST_N_QUARTERS", DynamicDateKind::LastNQuarters),
    ("NEXT_N_QUARTERS", DynamicDateKind::NextNQuarters),
    ("N_QUARTERS_AGO", DynamicDateKind::NQuartersAgo),
    ("LAST_N_YEARS", DynamicDateKind::LastNYears),
    ("NEXT_N_YEARS", DynamicDateKind::NextNYears),
    ("N_YEARS_AGO", DynamicDateKind::NYearsAgo),
    ("LAST_N_FISCAL_QUARTERS", DynamicDateKind::LastNFiscalQuarters),
    ("NEXT_N_FISCAL_QUARTERS", DynamicDateKind::NextNFiscalQuarters),
    ("N_FISCAL_QUARTERS_AGO", DynamicDateKind::NFiscalQuartersAgo),
    ("LAST_N_FISCAL_YEARS", DynamicDateKind::LastNFiscalYears),
    ("NEXT_N_FISCAL_YEARS", DynamicDateKind::NextNFiscalYears),
    ("N_FISCAL_YEARS_AGO", DynamicDateKind::NFiscalYearsAgo),
];

impl DynamicDateKind {
    /// Look up a keyword, case-insensitively.
    pub fn from_keyword(s: &str) -> Option<Self> {
        DYNAMIC_KEYWORDS
            .iter()
            .find(|(kw, _)| kw.eq_ignore_ascii_case(s))
            .map(|(_, kind)| *kind)
    }

    pub fn keyword(&self) -> &'static str {
        DYNAMIC_KEYWORDS
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(kw, _)| *kw)
            .unwrap_or("LAST_N_DAYS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_keywords_roundtrip() {
        for (kw, lit) in STATIC_KEYWORDS {
            assert_eq!(StaticDateLiteral::from_keyword(kw), Some(*lit));
            assert_eq!(lit.keyword(), *kw);
        }
        assert_eq!(
            StaticDateLiteral::from_keyword("this_fiscal_year"),
            Some(StaticDateLiteral::ThisFiscalYear)
        );
        assert_eq!(StaticDateLiteral::from_keyword("LAST_N_DAYS"), None);
    }

    #[test]
    fn test_dynamic_keywords() {
        assert_eq!(
            DynamicDateKind::from_keyword("last_n_days"),
            Some(DynamicDateKind::LastNDays)
        );
        assert_eq!(DynamicDateKind::from_keyword("TODAY"), None);
        let lit = DateLiteral::Dynamic {
            kind: DynamicDateKind::NFiscalYearsAgo,
            n: 2,
        };
        assert_eq!(lit.to_string(), "N_FISCAL_YEARS_AGO:2");
    }
}
