use std::ops::{Deref, DerefMut, Index, IndexMut};

/// Owned row-major 2-D grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer2<T> {
    pixels: Vec<T>,
    width: usize,
    height: usize,
}

/// Folds `i` into `[0, n - 1]` by reflecting about the first and last sample
/// (period `2n - 2`). Every index folds to 0 when `n == 1`.
#[inline]
pub fn mirror_index(i: isize, n: usize) -> usize {
    debug_assert!(n > 0, "cannot mirror into an empty range");
    if n == 1 {
        return 0;
    }
    let period = 2 * n as isize - 2;
    let k = i.rem_euclid(period);
    if k >= n as isize {
        (period - k) as usize
    } else {
        k as usize
    }
}

impl<T> Buffer2<T> {
    pub fn new(width: usize, height: usize, pixels: Vec<T>) -> Self {
        assert!(width > 0 && height > 0, "buffer dimensions must be at least 1x1");
        assert_eq!(
            pixels.len(),
            width * height,
            "pixels length must equal width * height"
        );
        Self {
            pixels,
            width,
            height,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn contains(&self, x: isize, y: isize) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    #[inline]
    pub fn index_of(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    #[inline]
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.pixels
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of range 0..{}", self.height);
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.height, "row {y} out of range 0..{}", self.height);
        &mut self.pixels[y * self.width..(y + 1) * self.width]
    }

    /// Value at `(x, y)` with both coordinates reflected into the grid.
    #[inline]
    pub fn get_mirrored(&self, x: isize, y: isize) -> &T {
        let mx = mirror_index(x, self.width);
        let my = mirror_index(y, self.height);
        &self.pixels[my * self.width + mx]
    }
}

impl<T: Copy> Buffer2<T> {
    pub fn new_filled(width: usize, height: usize, value: T) -> Self {
        Self::new(width, height, vec![value; width * height])
    }

    pub fn copy_column(&self, x: usize, out: &mut [T]) {
        assert!(x < self.width, "column {x} out of range 0..{}", self.width);
        assert_eq!(out.len(), self.height, "column length must equal height");
        for (y, v) in out.iter_mut().enumerate() {
            *v = self.pixels[y * self.width + x];
        }
    }

    pub fn set_column(&mut self, x: usize, column: &[T]) {
        assert!(x < self.width, "column {x} out of range 0..{}", self.width);
        assert_eq!(column.len(), self.height, "column length must equal height");
        for (y, &v) in column.iter().enumerate() {
            self.pixels[y * self.width + x] = v;
        }
    }

    pub fn set_row(&mut self, y: usize, row: &[T]) {
        assert_eq!(row.len(), self.width, "row length must equal width");
        self.row_mut(y).copy_from_slice(row);
    }

    #[inline]
    pub fn fill(&mut self, value: T) {
        self.pixels.fill(value);
    }
}

impl<T> Index<(usize, usize)> for Buffer2<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.pixels[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Buffer2<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        &mut self.pixels[y * self.width + x]
    }
}

impl<T> Deref for Buffer2<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.pixels
    }
}

impl<T> DerefMut for Buffer2<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pixels
    }
}
