//! Sliding pair trellis.
//!
//! Only the last `window` genomic columns are kept. Column `g` lives in
//! slot `(g - g_start) % window`; opening a new column evicts the one
//! `window` columns behind it. Each column holds `(c_len + 1) x states`
//! main cells, plus two planes for EXPLICIT states: the cells whose
//! segment has exactly the capped duration, and the cells whose segment
//! is longer than the cap.
use crate::model::{Hmm, StateType};
use crate::score::*;

/// A trellis cell. Viterbi cells carry traceback pointers, Forward cells are bare scores.
pub trait CellScore: Copy {
    fn empty() -> Self;
    fn score(&self) -> Score;
}

impl CellScore for Score {
    fn empty() -> Self {
        MIN_SCORE
    }
    fn score(&self) -> Score {
        *self
    }
}

/// Read access to the scores of a trellis.
pub trait ScoreView {
    /// Score of the main cell. Anything before the left boundary reads `MIN_SCORE`.
    fn main(&self, g: isize, c: isize, s: usize) -> Score;
    /// Score of the segments of EXPLICIT slot `x` with exactly the capped duration.
    fn capped(&self, g: isize, c: isize, x: usize) -> Score;
    /// Score of the segments of EXPLICIT slot `x` longer than the cap.
    fn tail(&self, g: isize, c: isize, x: usize) -> Score;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    Main,
    Capped,
    Tail,
}

#[derive(Debug, Clone)]
pub struct PairTrellis<T: CellScore> {
    g_start: usize,
    g_end: usize,
    c_len: usize,
    states: usize,
    window: usize,
    // State -> slot in the explicit planes.
    explicit: Vec<Option<usize>>,
    num_explicit: usize,
    // The last opened column.
    current: Option<usize>,
    main: Vec<T>,
    capped: Vec<T>,
    tail: Vec<T>,
}

impl<T: CellScore> PairTrellis<T> {
    /// A trellis over genomic columns `[g_start, g_end]` and cDNA rows `[0, c_len]`.
    pub fn new(hmm: &Hmm, g_start: usize, g_end: usize, c_len: usize) -> Self {
        let states = hmm.num_states();
        let window = hmm.window().min(g_end - g_start + 1);
        let mut num_explicit = 0;
        let explicit: Vec<_> = hmm
            .states
            .iter()
            .map(|s| match s.state_type {
                StateType::Explicit => {
                    num_explicit += 1;
                    Some(num_explicit - 1)
                }
                StateType::Internal => None,
            })
            .collect();
        let rows = c_len + 1;
        Self {
            g_start,
            g_end,
            c_len,
            states,
            window,
            explicit,
            num_explicit,
            current: None,
            main: vec![T::empty(); window * rows * states],
            capped: vec![T::empty(); window * rows * num_explicit],
            tail: vec![T::empty(); window * rows * num_explicit],
        }
    }
    pub fn g_start(&self) -> usize {
        self.g_start
    }
    pub fn g_end(&self) -> usize {
        self.g_end
    }
    pub fn c_len(&self) -> usize {
        self.c_len
    }
    pub fn states(&self) -> usize {
        self.states
    }
    pub fn window(&self) -> usize {
        self.window
    }
    pub fn current(&self) -> Option<usize> {
        self.current
    }
    /// Slot of `s` in the explicit planes.
    pub fn explicit_slot(&self, s: usize) -> Option<usize> {
        self.explicit[s]
    }
    /// Columns currently held, oldest first.
    pub fn live_columns(&self) -> std::ops::Range<usize> {
        match self.current {
            Some(current) => (current + 1).saturating_sub(self.window).max(self.g_start)..current + 1,
            None => self.g_start..self.g_start,
        }
    }
    fn slot(&self, g: usize) -> usize {
        (g - self.g_start) % self.window
    }
    fn base(&self, g: usize, c: usize) -> usize {
        self.slot(g) * (self.c_len + 1) + c
    }
    // Panics when `g` was evicted or not opened yet.
    fn check_live(&self, g: usize) {
        let live = self.live_columns();
        assert!(
            live.contains(&g),
            "column {} is not held (live columns {:?})",
            g,
            live
        );
    }
    /// Open column `g`, evicting the column it replaces. `evict` sees every
    /// non-empty cell of the evicted column before it is reset.
    pub fn open_column<F: FnMut(Plane, &T)>(&mut self, g: usize, mut evict: F) {
        assert!(self.g_start <= g && g <= self.g_end);
        assert!(self.current.map(|x| x + 1 == g).unwrap_or(g == self.g_start));
        let rows = self.c_len + 1;
        if g >= self.g_start + self.window {
            let slot = self.slot(g);
            let range = slot * rows * self.states..(slot + 1) * rows * self.states;
            for cell in self.main[range].iter_mut() {
                if cell.score() > MIN_SCORE {
                    evict(Plane::Main, cell);
                }
                *cell = T::empty();
            }
            let range = slot * rows * self.num_explicit..(slot + 1) * rows * self.num_explicit;
            for cell in self.capped[range.clone()].iter_mut() {
                if cell.score() > MIN_SCORE {
                    evict(Plane::Capped, cell);
                }
                *cell = T::empty();
            }
            for cell in self.tail[range].iter_mut() {
                if cell.score() > MIN_SCORE {
                    evict(Plane::Tail, cell);
                }
                *cell = T::empty();
            }
        }
        self.current = Some(g);
    }
    pub fn get(&self, plane: Plane, g: usize, c: usize, s: usize) -> &T {
        self.check_live(g);
        match plane {
            Plane::Main => &self.main[self.base(g, c) * self.states + s],
            Plane::Capped => &self.capped[self.base(g, c) * self.num_explicit + s],
            Plane::Tail => &self.tail[self.base(g, c) * self.num_explicit + s],
        }
    }
    /// Mutable access. For the explicit planes, `s` is the explicit slot.
    pub fn get_mut(&mut self, plane: Plane, g: usize, c: usize, s: usize) -> &mut T {
        self.check_live(g);
        let base = self.base(g, c);
        match plane {
            Plane::Main => &mut self.main[base * self.states + s],
            Plane::Capped => &mut self.capped[base * self.num_explicit + s],
            Plane::Tail => &mut self.tail[base * self.num_explicit + s],
        }
    }
    /// Every non-empty cell of the live columns as (plane, g, c, state or slot, cell).
    pub fn filled_cells(&self) -> Vec<(Plane, usize, usize, usize, &T)> {
        let mut cells = vec![];
        for g in self.live_columns() {
            for c in 0..=self.c_len {
                for s in 0..self.states {
                    let cell = self.get(Plane::Main, g, c, s);
                    if cell.score() > MIN_SCORE {
                        cells.push((Plane::Main, g, c, s, cell));
                    }
                }
                for x in 0..self.num_explicit {
                    for plane in [Plane::Capped, Plane::Tail].iter() {
                        let cell = self.get(*plane, g, c, x);
                        if cell.score() > MIN_SCORE {
                            cells.push((*plane, g, c, x, cell));
                        }
                    }
                }
            }
        }
        cells
    }
    fn read(&self, plane: Plane, g: isize, c: isize, s: usize) -> Score {
        if g < self.g_start as isize || c < 0 {
            return MIN_SCORE;
        }
        self.get(plane, g as usize, c as usize, s).score()
    }
}

impl<T: CellScore> ScoreView for PairTrellis<T> {
    fn main(&self, g: isize, c: isize, s: usize) -> Score {
        self.read(Plane::Main, g, c, s)
    }
    fn capped(&self, g: isize, c: isize, x: usize) -> Score {
        self.read(Plane::Capped, g, c, x)
    }
    fn tail(&self, g: isize, c: isize, x: usize) -> Score {
        self.read(Plane::Tail, g, c, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::test_hmm;
    #[test]
    fn sliding() {
        let hmm = test_hmm();
        let mut trellis: PairTrellis<Score> = PairTrellis::new(&hmm, 10, 100, 5);
        assert_eq!(trellis.window(), 31);
        let bracc = hmm.state_index("BrAccU2").unwrap();
        assert_eq!(trellis.explicit_slot(bracc), Some(0));
        let mut evicted = 0;
        for g in 10..=50 {
            trellis.open_column(g, |_, _| evicted += 1);
            *trellis.get_mut(Plane::Main, g, 2, 0) = -(g as f64);
            *trellis.get_mut(Plane::Tail, g, 1, 0) = -(g as f64);
        }
        assert_eq!(evicted, 2 * (50 - 40));
        assert_eq!(trellis.live_columns(), 20..51);
        assert_eq!(trellis.main(20, 2, 0), -20.0);
        assert_eq!(trellis.tail(50, 1, 0), -50.0);
        assert_eq!(trellis.main(9, 2, 0), MIN_SCORE);
        assert_eq!(trellis.main(30, -1, 0), MIN_SCORE);
        assert_eq!(trellis.filled_cells().len(), 2 * 31);
    }
    #[test]
    #[should_panic]
    fn evicted_read() {
        let hmm = test_hmm();
        let mut trellis: PairTrellis<Score> = PairTrellis::new(&hmm, 0, 100, 5);
        for g in 0..=40 {
            trellis.open_column(g, |_, _| {});
        }
        trellis.main(5, 0, 0);
    }
    #[test]
    fn narrow_window() {
        let hmm = test_hmm();
        let mut trellis: PairTrellis<Score> = PairTrellis::new(&hmm, 0, 3, 2);
        assert_eq!(trellis.window(), 4);
        for g in 0..=3 {
            trellis.open_column(g, |_, _| {});
        }
        assert_eq!(trellis.live_columns(), 0..4);
    }
}
