//! Columnar page model
//!
//! A [`Page`] is an immutable batch of rows stored column-wise. Pages flow
//! through the merge pipeline exactly once and are released after their
//! rows have been emitted. [`SerializedPage`] is the wire envelope used by
//! exchange clients: a bincode payload carrying its own row count,
//! uncompressed length, and xxHash64.

use bytes::Bytes;
use quarry_common::checksum::xxhash64;
use quarry_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Logical type of one page column
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Int64,
    Float64,
    Utf8,
    Bool,
}

/// One column of a page, with per-cell nulls
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Utf8(Vec<Option<String>>),
    Bool(Vec<Option<bool>>),
}

impl Column {
    /// Create an empty column of the given type
    #[must_use]
    pub const fn empty(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Int64 => Self::Int64(Vec::new()),
            ColumnType::Float64 => Self::Float64(Vec::new()),
            ColumnType::Utf8 => Self::Utf8(Vec::new()),
            ColumnType::Bool => Self::Bool(Vec::new()),
        }
    }

    /// Number of cells in this column
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Utf8(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    /// Whether this column has no cells
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logical type of this column
    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        match self {
            Self::Int64(_) => ColumnType::Int64,
            Self::Float64(_) => ColumnType::Float64,
            Self::Utf8(_) => ColumnType::Utf8,
            Self::Bool(_) => ColumnType::Bool,
        }
    }

    /// Estimated in-memory footprint of this column in bytes
    #[must_use]
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Int64(v) => v.len() * 9,
            Self::Float64(v) => v.len() * 9,
            Self::Bool(v) => v.len() * 2,
            Self::Utf8(v) => v
                .iter()
                .map(|s| 1 + s.as_ref().map_or(0, |s| s.len() + 16))
                .sum(),
        }
    }

    /// Borrow the value at `position`, `None` meaning SQL NULL
    #[must_use]
    pub fn value(&self, position: usize) -> Option<ValueRef<'_>> {
        match self {
            Self::Int64(v) => v[position].map(ValueRef::Int64),
            Self::Float64(v) => v[position].map(ValueRef::Float64),
            Self::Utf8(v) => v[position].as_deref().map(ValueRef::Utf8),
            Self::Bool(v) => v[position].map(ValueRef::Bool),
        }
    }

    /// Append the cell at `position` of `other` to this column
    pub fn push_from(&mut self, other: &Self, position: usize) -> Result<()> {
        match (self, other) {
            (Self::Int64(dst), Self::Int64(src)) => dst.push(src[position]),
            (Self::Float64(dst), Self::Float64(src)) => dst.push(src[position]),
            (Self::Utf8(dst), Self::Utf8(src)) => dst.push(src[position].clone()),
            (Self::Bool(dst), Self::Bool(src)) => dst.push(src[position]),
            (dst, src) => {
                return Err(Error::configuration(format!(
                    "cannot append {:?} cell to {:?} column",
                    src.column_type(),
                    dst.column_type()
                )));
            }
        }
        Ok(())
    }
}

/// Borrowed view of a single non-null cell
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ValueRef<'a> {
    Int64(i64),
    Float64(f64),
    Utf8(&'a str),
    Bool(bool),
}

/// Immutable columnar batch of rows
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page {
    columns: Vec<Column>,
    row_count: usize,
}

impl Page {
    /// Create a page from columns, validating that all columns have the
    /// same length
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map_or(0, Column::len);
        if columns.iter().any(|c| c.len() != row_count) {
            return Err(Error::configuration(
                "page columns have differing row counts",
            ));
        }
        Ok(Self { columns, row_count })
    }

    /// Number of rows (positions) in this page
    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.row_count
    }

    /// Number of columns (channels) in this page
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Estimated in-memory footprint of this page in bytes
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(Column::byte_size).sum()
    }

    /// Access a column by channel index
    #[must_use]
    pub fn column(&self, channel: usize) -> &Column {
        &self.columns[channel]
    }

    /// Borrow the cell at `(channel, position)`, `None` meaning SQL NULL
    #[must_use]
    pub fn value(&self, channel: usize, position: usize) -> Option<ValueRef<'_>> {
        self.columns[channel].value(position)
    }

    /// Logical types of all columns, in channel order
    #[must_use]
    pub fn column_types(&self) -> Vec<ColumnType> {
        self.columns.iter().map(Column::column_type).collect()
    }
}

/// Check a decoded page against the declared schema of its source
pub fn validate_page(page: &Page, schema: &[ColumnType]) -> Result<()> {
    if page.column_count() != schema.len() {
        return Err(Error::configuration(format!(
            "page has {} columns, schema declares {}",
            page.column_count(),
            schema.len()
        )));
    }
    for (channel, expected) in schema.iter().enumerate() {
        let actual = page.column(channel).column_type();
        if actual != *expected {
            return Err(Error::configuration(format!(
                "channel {channel} has type {actual:?}, schema declares {expected:?}"
            )));
        }
    }
    Ok(())
}

/// Accumulates projected rows into an output page
///
/// The builder reports itself full once it crosses either the byte or the
/// row threshold; callers may also apply their own fullness predicate on
/// top of [`PageBuilder::byte_size`] and [`PageBuilder::row_count`].
#[derive(Debug)]
pub struct PageBuilder {
    types: Vec<ColumnType>,
    columns: Vec<Column>,
    max_bytes: usize,
    max_rows: usize,
}

impl PageBuilder {
    /// Create a builder producing pages with the given column types
    #[must_use]
    pub fn new(types: Vec<ColumnType>, max_bytes: usize, max_rows: usize) -> Self {
        let columns = types.iter().map(|t| Column::empty(*t)).collect();
        Self {
            types,
            columns,
            max_bytes,
            max_rows,
        }
    }

    /// Append one row of `page`, projected to `channels`
    ///
    /// `channels[i]` selects the input channel written to output column `i`.
    pub fn append_row(&mut self, page: &Page, position: usize, channels: &[usize]) -> Result<()> {
        if channels.len() != self.columns.len() {
            return Err(Error::configuration(format!(
                "projection selects {} channels, builder has {} columns",
                channels.len(),
                self.columns.len()
            )));
        }
        for (dst, &channel) in self.columns.iter_mut().zip(channels) {
            dst.push_from(page.column(channel), position)?;
        }
        Ok(())
    }

    /// Number of rows accumulated so far
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Estimated byte footprint of the accumulated rows
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(Column::byte_size).sum()
    }

    /// Whether no rows have been accumulated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Whether the builder has crossed its byte or row threshold
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.row_count() >= self.max_rows || self.byte_size() >= self.max_bytes
    }

    /// Take the accumulated rows as a page, resetting the builder
    pub fn build(&mut self) -> Result<Page> {
        let columns = std::mem::replace(
            &mut self.columns,
            self.types.iter().map(|t| Column::empty(*t)).collect(),
        );
        Page::new(columns)
    }
}

/// Wire envelope for one page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedPage {
    /// Encoded payload
    pub data: Bytes,
    /// Row count carried alongside the payload
    pub row_count: usize,
    /// Uncompressed payload length in bytes
    pub uncompressed_bytes: usize,
    /// xxHash64 of the payload
    pub xxhash64: u64,
}

impl SerializedPage {
    /// Encode a page into its wire envelope
    pub fn serialize(page: &Page) -> Result<Self> {
        let data = bincode::serialize(page)
            .map_err(|e| Error::Serialization(format!("page encode failed: {e}")))?;
        let checksum = xxhash64(&data);
        Ok(Self {
            uncompressed_bytes: data.len(),
            row_count: page.row_count(),
            xxhash64: checksum,
            data: Bytes::from(data),
        })
    }

    /// Decode the payload, verifying length, checksum, and row count
    pub fn deserialize(&self) -> Result<Page> {
        if self.data.len() != self.uncompressed_bytes {
            return Err(Error::Deserialization(format!(
                "payload is {} bytes, envelope declares {}",
                self.data.len(),
                self.uncompressed_bytes
            )));
        }
        let actual = xxhash64(&self.data);
        if actual != self.xxhash64 {
            return Err(Error::ChecksumMismatch {
                expected: self.xxhash64,
                actual,
            });
        }
        let page: Page = bincode::deserialize(&self.data)
            .map_err(|e| Error::Deserialization(format!("page decode failed: {e}")))?;
        if page.row_count() != self.row_count {
            return Err(Error::Deserialization(format!(
                "decoded page has {} rows, envelope declares {}",
                page.row_count(),
                self.row_count
            )));
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int64_page(values: &[i64]) -> Page {
        Page::new(vec![Column::Int64(values.iter().map(|v| Some(*v)).collect())]).unwrap()
    }

    #[test]
    fn test_page_construction_rejects_ragged_columns() {
        let columns = vec![
            Column::Int64(vec![Some(1), Some(2)]),
            Column::Bool(vec![Some(true)]),
        ];
        assert!(Page::new(columns).is_err());
    }

    #[test]
    fn test_page_accessors() {
        let page = Page::new(vec![
            Column::Int64(vec![Some(7), None]),
            Column::Utf8(vec![Some("a".into()), Some("b".into())]),
        ])
        .unwrap();

        assert_eq!(page.row_count(), 2);
        assert_eq!(page.column_count(), 2);
        assert_eq!(page.value(0, 0), Some(ValueRef::Int64(7)));
        assert_eq!(page.value(0, 1), None);
        assert_eq!(page.value(1, 1), Some(ValueRef::Utf8("b")));
        assert_eq!(
            page.column_types(),
            vec![ColumnType::Int64, ColumnType::Utf8]
        );
        assert!(page.byte_size() > 0);
    }

    #[test]
    fn test_validate_page_type_mismatch() {
        let page = int64_page(&[1, 2, 3]);
        assert!(validate_page(&page, &[ColumnType::Int64]).is_ok());
        assert!(validate_page(&page, &[ColumnType::Utf8]).is_err());
        assert!(validate_page(&page, &[ColumnType::Int64, ColumnType::Int64]).is_err());
    }

    #[test]
    fn test_builder_projection_and_fullness() {
        let page = Page::new(vec![
            Column::Int64(vec![Some(1), Some(2), Some(3)]),
            Column::Utf8(vec![Some("x".into()), Some("y".into()), Some("z".into())]),
        ])
        .unwrap();

        // Project only the string channel, full at 2 rows
        let mut builder = PageBuilder::new(vec![ColumnType::Utf8], usize::MAX, 2);
        builder.append_row(&page, 0, &[1]).unwrap();
        assert!(!builder.is_full());
        builder.append_row(&page, 2, &[1]).unwrap();
        assert!(builder.is_full());

        let built = builder.build().unwrap();
        assert_eq!(built.row_count(), 2);
        assert_eq!(built.value(0, 0), Some(ValueRef::Utf8("x")));
        assert_eq!(built.value(0, 1), Some(ValueRef::Utf8("z")));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_serialized_page_round_trip() {
        let page = int64_page(&[5, 6, 7]);
        let serialized = SerializedPage::serialize(&page).unwrap();
        assert_eq!(serialized.row_count, 3);
        assert_eq!(serialized.uncompressed_bytes, serialized.data.len());

        let decoded = serialized.deserialize().unwrap();
        assert_eq!(decoded, page);
    }

    #[test]
    fn test_serialized_page_detects_corruption() {
        let page = int64_page(&[5, 6, 7]);
        let mut serialized = SerializedPage::serialize(&page).unwrap();

        let mut corrupted = serialized.data.to_vec();
        corrupted[0] ^= 0xff;
        serialized.data = Bytes::from(corrupted);

        let err = serialized.deserialize().unwrap_err();
        assert!(err.is_corruption(), "unexpected error: {err}");
    }
}
