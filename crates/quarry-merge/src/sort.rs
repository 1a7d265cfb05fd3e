//! Sort keys and row comparison
//!
//! A [`SortKey`] defines a total order over rows by an ordered list of
//! `(channel, order)` pairs. Null placement is decided before direction:
//! a NULLS FIRST null sorts ahead of every value whether the channel is
//! ascending or descending.

use crate::page::{ColumnType, Page, ValueRef};
use quarry_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Direction and null placement for one sort channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    AscNullsFirst,
    AscNullsLast,
    DescNullsFirst,
    DescNullsLast,
}

impl SortOrder {
    /// Whether non-null values sort ascending
    #[must_use]
    pub const fn is_ascending(self) -> bool {
        matches!(self, Self::AscNullsFirst | Self::AscNullsLast)
    }

    /// Whether nulls sort before all non-null values
    #[must_use]
    pub const fn nulls_first(self) -> bool {
        matches!(self, Self::AscNullsFirst | Self::DescNullsFirst)
    }
}

/// One channel of a sort key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortChannel {
    /// Input channel index the comparison reads
    pub channel: usize,
    /// Direction and null placement
    pub order: SortOrder,
}

impl SortChannel {
    /// Create a new sort channel
    #[must_use]
    pub const fn new(channel: usize, order: SortOrder) -> Self {
        Self { channel, order }
    }
}

/// Ordered list of sort channels defining a total order over rows
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey(Vec<SortChannel>);

impl SortKey {
    /// Create a sort key; at least one channel is required
    pub fn new(channels: Vec<SortChannel>) -> Result<Self> {
        if channels.is_empty() {
            return Err(Error::configuration("sort key has no channels"));
        }
        Ok(Self(channels))
    }

    /// The sort channels, in precedence order
    #[must_use]
    pub fn channels(&self) -> &[SortChannel] {
        &self.0
    }

    /// Validate every referenced channel against a schema
    pub fn validate(&self, schema: &[ColumnType]) -> Result<()> {
        for sort_channel in &self.0 {
            if sort_channel.channel >= schema.len() {
                return Err(Error::configuration(format!(
                    "sort channel {} out of bounds for {} columns",
                    sort_channel.channel,
                    schema.len()
                )));
            }
        }
        Ok(())
    }

    /// Compare row `a_position` of `a` against row `b_position` of `b`
    #[must_use]
    pub fn compare_rows(
        &self,
        a: &Page,
        a_position: usize,
        b: &Page,
        b_position: usize,
    ) -> Ordering {
        for sort_channel in &self.0 {
            let left = a.value(sort_channel.channel, a_position);
            let right = b.value(sort_channel.channel, b_position);
            let ordering = compare_values(left, right, sort_channel.order);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Compare two optional cells under one sort order
fn compare_values(left: Option<ValueRef<'_>>, right: Option<ValueRef<'_>>, order: SortOrder) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => {
            if order.nulls_first() {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (Some(_), None) => {
            if order.nulls_first() {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (Some(left), Some(right)) => {
            let ordering = compare_non_null(left, right);
            if order.is_ascending() {
                ordering
            } else {
                ordering.reverse()
            }
        }
    }
}

/// Total order over non-null cells
///
/// Cross-type comparisons cannot occur for pages validated against one
/// schema; the discriminant fallback keeps the order total regardless.
fn compare_non_null(left: ValueRef<'_>, right: ValueRef<'_>) -> Ordering {
    match (left, right) {
        (ValueRef::Int64(l), ValueRef::Int64(r)) => l.cmp(&r),
        (ValueRef::Float64(l), ValueRef::Float64(r)) => l.total_cmp(&r),
        (ValueRef::Utf8(l), ValueRef::Utf8(r)) => l.cmp(r),
        (ValueRef::Bool(l), ValueRef::Bool(r)) => l.cmp(&r),
        (l, r) => discriminant_rank(l).cmp(&discriminant_rank(r)),
    }
}

const fn discriminant_rank(value: ValueRef<'_>) -> u8 {
    match value {
        ValueRef::Int64(_) => 0,
        ValueRef::Float64(_) => 1,
        ValueRef::Utf8(_) => 2,
        ValueRef::Bool(_) => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Column;

    fn page(values: Vec<Option<i64>>) -> Page {
        Page::new(vec![Column::Int64(values)]).unwrap()
    }

    fn key(order: SortOrder) -> SortKey {
        SortKey::new(vec![SortChannel::new(0, order)]).unwrap()
    }

    #[test]
    fn test_ascending_comparison() {
        let a = page(vec![Some(1)]);
        let b = page(vec![Some(2)]);
        let key = key(SortOrder::AscNullsFirst);

        assert_eq!(key.compare_rows(&a, 0, &b, 0), Ordering::Less);
        assert_eq!(key.compare_rows(&b, 0, &a, 0), Ordering::Greater);
        assert_eq!(key.compare_rows(&a, 0, &a, 0), Ordering::Equal);
    }

    #[test]
    fn test_descending_comparison() {
        let a = page(vec![Some(1)]);
        let b = page(vec![Some(2)]);
        let key = key(SortOrder::DescNullsLast);

        assert_eq!(key.compare_rows(&a, 0, &b, 0), Ordering::Greater);
        assert_eq!(key.compare_rows(&b, 0, &a, 0), Ordering::Less);
    }

    #[test]
    fn test_null_placement_ignores_direction() {
        let null = page(vec![None]);
        let value = page(vec![Some(5)]);

        for order in [SortOrder::AscNullsFirst, SortOrder::DescNullsFirst] {
            assert_eq!(key(order).compare_rows(&null, 0, &value, 0), Ordering::Less);
        }
        for order in [SortOrder::AscNullsLast, SortOrder::DescNullsLast] {
            assert_eq!(
                key(order).compare_rows(&null, 0, &value, 0),
                Ordering::Greater
            );
        }
    }

    #[test]
    fn test_multi_channel_precedence() {
        let a = Page::new(vec![
            Column::Int64(vec![Some(1)]),
            Column::Utf8(vec![Some("b".into())]),
        ])
        .unwrap();
        let b = Page::new(vec![
            Column::Int64(vec![Some(1)]),
            Column::Utf8(vec![Some("a".into())]),
        ])
        .unwrap();

        let key = SortKey::new(vec![
            SortChannel::new(0, SortOrder::AscNullsFirst),
            SortChannel::new(1, SortOrder::AscNullsFirst),
        ])
        .unwrap();

        // First channel ties, second decides
        assert_eq!(key.compare_rows(&a, 0, &b, 0), Ordering::Greater);
    }

    #[test]
    fn test_validate_rejects_out_of_bounds_channel() {
        let key = SortKey::new(vec![SortChannel::new(2, SortOrder::AscNullsFirst)]).unwrap();
        assert!(key.validate(&[ColumnType::Int64]).is_err());
        assert!(
            key.validate(&[ColumnType::Int64, ColumnType::Utf8, ColumnType::Bool])
                .is_ok()
        );
    }

    #[test]
    fn test_empty_sort_key_rejected() {
        assert!(SortKey::new(Vec::new()).is_err());
    }
}
