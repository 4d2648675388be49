//! Resource limits applied during validation and compilation.
//!
//! A value of `0` means "unlimited" for every field.

use serde::{Deserialize, Serialize};

use crate::error::{LimitError, LimitKind};

/// Query resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_select_fields: u32,
    pub max_records: u64,
    pub max_offset: u64,
    pub max_lookup_depth: u32,
    pub max_subqueries: u32,
    pub max_subquery_records: u64,
    pub max_query_length: u32,
    pub max_group_by_fields: u32,
    pub max_order_by_fields: u32,
    /// LIMIT applied when a query has none.
    pub default_limit: u64,
}

impl Limits {
    /// No limits at all.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Platform defaults for tenant-facing queries.
    pub fn recommended() -> Self {
        Self {
            max_select_fields: 200,
            max_records: 50_000,
            max_offset: 2_000,
            max_lookup_depth: 5,
            max_subqueries: 20,
            max_subquery_records: 200,
            max_query_length: 100_000,
            max_group_by_fields: 32,
            max_order_by_fields: 32,
            default_limit: 2_000,
        }
    }

    /// Overlay `other` on `self`. Only strictly positive fields of `other`
    /// replace the base value.
    pub fn merge(&self, other: &Limits) -> Limits {
        fn pick<T: Copy + Default + PartialOrd>(base: T, over: T) -> T {
            if over > T::default() {
                over
            } else {
                base
            }
        }

        Limits {
            max_select_fields: pick(self.max_select_fields, other.max_select_fields),
            max_records: pick(self.max_records, other.max_records),
            max_offset: pick(self.max_offset, other.max_offset),
            max_lookup_depth: pick(self.max_lookup_depth, other.max_lookup_depth),
            max_subqueries: pick(self.max_subqueries, other.max_subqueries),
            max_subquery_records: pick(self.max_subquery_records, other.max_subquery_records),
            max_query_length: pick(self.max_query_length, other.max_query_length),
            max_group_by_fields: pick(self.max_group_by_fields, other.max_group_by_fields),
            max_order_by_fields: pick(self.max_order_by_fields, other.max_order_by_fields),
            default_limit: pick(self.default_limit, other.default_limit),
        }
    }

    /// LIMIT to emit for a top-level query: the requested limit, else the
    /// default limit, capped by `max_records`. A requested 0 counts as
    /// absent. `None` means no LIMIT.
    pub fn effective_limit(&self, requested: Option<u64>) -> Option<u64> {
        let limit = requested
            .filter(|&n| n > 0)
            .or((self.default_limit > 0).then_some(self.default_limit));
        cap(limit, self.max_records)
    }

    /// LIMIT to emit for a relationship subquery.
    pub fn effective_subquery_limit(&self, requested: Option<u64>) -> Option<u64> {
        cap(requested.filter(|&n| n > 0), self.max_subquery_records)
    }

    // ========================================================================
    // Checks
    // ========================================================================

    pub fn check_select_fields(&self, count: usize) -> Result<(), LimitError> {
        check(LimitKind::MaxSelectFields, u64::from(self.max_select_fields), count as u64)
    }

    pub fn check_records(&self, limit: u64) -> Result<(), LimitError> {
        check(LimitKind::MaxRecords, self.max_records, limit)
    }

    pub fn check_offset(&self, offset: u64) -> Result<(), LimitError> {
        check(LimitKind::MaxOffset, self.max_offset, offset)
    }

    pub fn check_lookup_depth(&self, depth: usize) -> Result<(), LimitError> {
        check(LimitKind::MaxLookupDepth, u64::from(self.max_lookup_depth), depth as u64)
    }

    pub fn check_subqueries(&self, count: usize) -> Result<(), LimitError> {
        check(LimitKind::MaxSubqueries, u64::from(self.max_subqueries), count as u64)
    }

    pub fn check_subquery_records(&self, limit: u64) -> Result<(), LimitError> {
        check(LimitKind::MaxSubqueryRecords, self.max_subquery_records, limit)
    }

    pub fn check_query_length(&self, length: usize) -> Result<(), LimitError> {
        check(LimitKind::MaxQueryLength, u64::from(self.max_query_length), length as u64)
    }

    pub fn check_group_by_fields(&self, count: usize) -> Result<(), LimitError> {
        check(LimitKind::MaxGroupByFields, u64::from(self.max_group_by_fields), count as u64)
    }

    pub fn check_order_by_fields(&self, count: usize) -> Result<(), LimitError> {
        check(LimitKind::MaxOrderByFields, u64::from(self.max_order_by_fields), count as u64)
    }
}

fn check(kind: LimitKind, limit: u64, actual: u64) -> Result<(), LimitError> {
    if limit > 0 && actual > limit {
        Err(LimitError::new(kind, limit, actual))
    } else {
        Ok(())
    }
}

fn cap(value: Option<u64>, max: u64) -> Option<u64> {
    match (value, max) {
        (Some(v), 0) => Some(v),
        (Some(v), max) => Some(v.min(max)),
        (None, 0) => None,
        (None, max) => Some(max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_unlimited() {
        let limits = Limits::unlimited();
        assert!(limits.check_records(u64::MAX).is_ok());
        assert_eq!(limits.effective_limit(None), None);
        assert_eq!(limits.effective_limit(Some(10)), Some(10));
    }

    #[test]
    fn test_check_reports_limit_and_actual() {
        let limits = Limits {
            max_records: 100,
            ..Limits::default()
        };
        let err = limits.check_records(200).unwrap_err();
        assert_eq!(err.kind, LimitKind::MaxRecords);
        assert_eq!(err.limit, 100);
        assert_eq!(err.actual, 200);
        assert!(limits.check_records(100).is_ok());
    }

    #[test]
    fn test_merge_only_positive_overrides() {
        let base = Limits::recommended();
        let merged = base.merge(&Limits {
            max_records: 10,
            ..Limits::default()
        });
        assert_eq!(merged.max_records, 10);
        assert_eq!(merged.max_offset, base.max_offset);
        assert_eq!(base.merge(&Limits::default()), base);
    }

    #[test]
    fn test_effective_limits() {
        let limits = Limits {
            max_records: 500,
            default_limit: 100,
            max_subquery_records: 50,
            ..Limits::default()
        };
        assert_eq!(limits.effective_limit(None), Some(100));
        assert_eq!(limits.effective_limit(Some(1000)), Some(500));
        assert_eq!(limits.effective_limit(Some(0)), Some(100));
        assert_eq!(
            Limits {
                max_records: 500,
                ..Limits::default()
            }
            .effective_limit(None),
            Some(500)
        );
        assert_eq!(limits.effective_subquery_limit(None), Some(50));
        assert_eq!(limits.effective_subquery_limit(Some(10)), Some(10));
    }
}
