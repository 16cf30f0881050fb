use std::cmp::Ordering;

use rayon::prelude::*;
use tracing::debug;

use crate::processor::column::Column;
use crate::processor::frame::Frame;
use crate::processor::index::Index;
use crate::processor::{FrameError, PARALLEL_MIN_ROWS};

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    column: String,
    reverse: bool,
    null_last: bool,
}

impl Order {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            reverse: false,
            null_last: false,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            reverse: true,
            ..Self::asc(column)
        }
    }

    /// Puts nulls after every value, whatever the direction.
    pub fn null_last(mut self) -> Self {
        self.null_last = true;
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    fn compare(&self, column: &Column, a: usize, b: usize) -> Ordering {
        if self.null_last {
            match (column.is_null(a), column.is_null(b)) {
                (true, true) => return Ordering::Equal,
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                (false, false) => {}
            }
        }
        let ord = column.compare(a, b);
        if self.reverse {
            ord.reverse()
        } else {
            ord
        }
    }
}

impl From<&str> for Order {
    fn from(column: &str) -> Self {
        Order::asc(column)
    }
}

impl Frame {
    /// Stable sort by `orders`, first key most significant.
    ///
    /// Only the index is permuted. Enum columns order by ordinal code, so a
    /// declared universe acts as a custom ordering.
    ///
    /// # Errors
    /// [`FrameError::MissingColumn`] for an unknown key column, attached to
    /// the returned frame.
    ///
    /// # Example
    /// ```rust
    /// use columnar_frame::{ColumnData, Frame, Order};
    ///
    /// let frame = Frame::new(vec![("COL1", ColumnData::from(vec![3i64, 1, 2]))]);
    /// let sorted = frame.sort([Order::desc("COL1")]);
    /// assert_eq!(sorted.int_view("COL1").unwrap().to_vec(), vec![Some(3), Some(2), Some(1)]);
    /// ```
    pub fn sort<I, O>(&self, orders: I) -> Frame
    where
        I: IntoIterator<Item = O>,
        O: Into<Order>,
    {
        if self.err.is_some() {
            return self.clone();
        }
        let orders: Vec<Order> = orders.into_iter().map(Into::into).collect();
        let keys = match orders
            .iter()
            .map(|o| self.column(&o.column).map(|c| (c, o)))
            .collect::<Result<Vec<_>, FrameError>>()
        {
            Ok(keys) => keys,
            Err(e) => return Frame::from_error("sort", e),
        };

        let compare = |a: &usize, b: &usize| {
            keys.iter()
                .map(|(column, order)| order.compare(column, *a, *b))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        };

        let mut positions = self.index.positions().to_vec();
        if positions.len() >= PARALLEL_MIN_ROWS {
            positions.par_sort_by(compare);
        } else {
            positions.sort_by(compare);
        }

        debug!(rows = positions.len(), keys = orders.len(), "Frame sorted");
        self.with_index(Index::from_positions(positions))
    }
}
