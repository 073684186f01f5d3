//! Strided views over row-major packed matrices.
use std::ops::Index;

/// Anything that can be indexed by position and knows its length.
///
/// Lets the DCT's 1D pass treat a row slice and a strided column the same way.
pub trait IndexLen: Index<usize> {
    fn len(&self) -> usize;
}

impl<T> IndexLen for [T] {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }
}

/// Iterator over the columns of a row-major packed matrix.
pub struct Columns<'a, T: 'a> {
    data: &'a [T],
    rowstride: usize,
    curr: usize,
}

impl<'a, T: 'a> Columns<'a, T> {
    /// ## Panics
    /// If `data.len()` is not a multiple of `rowstride`.
    #[inline(always)]
    pub fn from_slice(data: &'a [T], rowstride: usize) -> Self {
        assert_eq!(
            data.len() % rowstride,
            0,
            "matrix length must be a multiple of the row stride"
        );

        Columns {
            data,
            rowstride,
            curr: 0,
        }
    }
}

impl<'a, T: 'a> Iterator for Columns<'a, T> {
    type Item = Column<'a, T>;

    #[inline(always)]
    fn next(&mut self) -> Option<Self::Item> {
        if self.curr < self.rowstride {
            let data = &self.data[self.curr..];
            self.curr += 1;
            Some(Column {
                data,
                rowstride: self.rowstride,
            })
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.rowstride - self.curr;
        (remaining, Some(remaining))
    }
}

impl<'a, T: 'a> ExactSizeIterator for Columns<'a, T> {}

/// A single column; index `i` is the element in row `i`.
pub struct Column<'a, T: 'a> {
    data: &'a [T],
    rowstride: usize,
}

impl<'a, T: 'a> Index<usize> for Column<'a, T> {
    type Output = T;

    #[inline(always)]
    fn index(&self, idx: usize) -> &T {
        &self.data[idx * self.rowstride]
    }
}

impl<'a, T: 'a> IndexLen for Column<'a, T> {
    #[inline(always)]
    fn len(&self) -> usize {
        (self.data.len() + self.rowstride - 1) / self.rowstride
    }
}

#[test]
fn test_columns_walk_strided() {
    // 2 rows, 3 columns
    let data = [1, 2, 3, 4, 5, 6];
    let cols: Vec<Vec<i32>> = Columns::from_slice(&data, 3)
        .map(|col| (0..col.len()).map(|i| col[i]).collect())
        .collect();

    assert_eq!(cols, vec![vec![1, 4], vec![2, 5], vec![3, 6]]);
}
