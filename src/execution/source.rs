use std::iter::Peekable;

use crate::models::Row;

/// Pull-based, possibly unbounded sequence of input rows.
pub trait RowSource: Send {
    /// Output column names of the statement that produced the rows, in order.
    fn columns(&self) -> &[String];

    fn has_next(&mut self) -> bool;

    /// Pull up to `max` rows. Returns fewer on the final pull and an empty batch once the
    /// source is exhausted; never fails past the end.
    fn take(&mut self, max: usize) -> Vec<Row>;
}

/// [`RowSource`] over any row iterator.
pub struct IteratorSource<I: Iterator<Item = Row>> {
    columns: Vec<String>,
    rows: Peekable<I>,
}

impl<I: Iterator<Item = Row>> IteratorSource<I> {
    pub fn new(columns: Vec<String>, rows: I) -> Self {
        Self {
            columns,
            rows: rows.peekable(),
        }
    }
}

impl<I> RowSource for IteratorSource<I>
where
    I: Iterator<Item = Row> + Send,
{
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn has_next(&mut self) -> bool {
        self.rows.peek().is_some()
    }

    fn take(&mut self, max: usize) -> Vec<Row> {
        self.rows.by_ref().take(max).collect()
    }
}
