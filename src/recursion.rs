//! The recursion shared by the Viterbi and the Forward decoders.
//!
//! Both decoders enumerate exactly the same candidates, in the same order
//! and with the same floating point expressions. They differ only in how
//! the candidates are combined: Viterbi keeps the first maximum, Forward
//! sums them in log space.
use crate::model::{Hmm, Timing};
use crate::padseq::Dna;
use crate::score::*;
use crate::trellis::ScoreView;

/// Where a candidate comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The start of the alignment.
    Begin,
    /// A new segment after the segment of `from` ending at `(g, c)`.
    Entry { g: usize, c: usize, from: usize },
    /// The same segment, extended from `(g, c)`.
    Continue { g: usize, c: usize },
    /// The capped-duration segment ending at `(g, c)`, extended past the cap.
    Capped { g: usize, c: usize },
    /// The over-the-cap segment ending at `(g, c)`.
    Tail { g: usize, c: usize },
}

/// Combine candidates.
pub trait Accumulate {
    fn offer(&mut self, value: Score, source: Source);
    fn value(&self) -> Score;
}

/// Keeps the first candidate with the highest score.
#[derive(Debug, Clone, Copy)]
pub struct Best {
    pub score: Score,
    pub source: Option<Source>,
}

impl Best {
    pub fn new() -> Self {
        Self {
            score: MIN_SCORE,
            source: None,
        }
    }
}

impl Default for Best {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulate for Best {
    fn offer(&mut self, value: Score, source: Source) {
        if value > self.score {
            self.score = value;
            self.source = Some(source);
        }
    }
    fn value(&self) -> Score {
        self.score
    }
}

/// Log-sum of every candidate.
#[derive(Debug, Clone, Copy)]
pub struct Sum(pub Score);

impl Default for Sum {
    fn default() -> Self {
        Sum(MIN_SCORE)
    }
}

impl Accumulate for Sum {
    fn offer(&mut self, value: Score, _: Source) {
        self.0 = add_log(self.0, value);
    }
    fn value(&self) -> Score {
        self.0
    }
}

/// What a decoder reads besides its trellis.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub hmm: &'a Hmm,
    pub genomic: &'a Dna,
    pub cdna: &'a Dna,
    /// The left boundary. `(g_start, 0)` is the begin cell.
    pub g_start: usize,
}

impl<'a> Context<'a> {
    fn is_begin(&self, g: isize, c: isize) -> bool {
        g == self.g_start as isize && c == 0
    }
    fn emission(&self, s: usize, g: isize, c: isize) -> Score {
        self.hmm.emission(s, self.genomic, self.cdna, g, c)
    }
}

/// Candidates for the INTERNAL state `s` at `(g, c)`.
pub fn relax_internal<V: ScoreView, A: Accumulate>(
    ctx: &Context,
    view: &V,
    g: usize,
    c: usize,
    s: usize,
    acc: &mut A,
) {
    let hmm = ctx.hmm;
    let state = &hmm.states[s];
    let (entry, ext) = match *hmm.timing(s) {
        Timing::Memoryless { entry, ext } => (entry, ext),
        Timing::Explicit { .. } => unreachable!("{} is EXPLICIT", hmm.state_name(s)),
    };
    let (g, c) = (g as isize, c as isize);
    let (sg, sc) = (g - state.dg as isize, c - state.dc as isize);
    if sg < ctx.g_start as isize || sc < 0 {
        return;
    }
    let e = ctx.emission(s, g, c);
    if e == MIN_SCORE {
        return;
    }
    let (ug, uc) = (sg as usize, sc as usize);
    acc.offer(view.main(sg, sc, s) + ext + e, Source::Continue { g: ug, c: uc });
    if ctx.is_begin(sg, sc) {
        acc.offer(state.init + entry + e, Source::Begin);
    } else {
        for &from in hmm.predecessors(s).iter().filter(|&&p| p != s) {
            let value = view.main(sg, sc, from) + hmm.transition(from, s) + entry + e;
            acc.offer(value, Source::Entry { g: ug, c: uc, from });
        }
    }
}

/// Candidates for the EXPLICIT state `s` (slot `x` of the explicit planes) at `(g, c)`.
/// `tail` receives the segments longer than the cap, `capped` those of exactly the cap,
/// and `main` every duration, the tail last.
pub fn relax_explicit<V: ScoreView, A: Accumulate>(
    ctx: &Context,
    view: &V,
    (g, c): (usize, usize),
    (s, x): (usize, usize),
    main: &mut A,
    capped: &mut A,
    tail: &mut A,
) {
    let hmm = ctx.hmm;
    let state = &hmm.states[s];
    let (table, step, ext) = match hmm.timing(s) {
        Timing::Explicit { table, step, ext } => (table, *step, *ext),
        Timing::Memoryless { .. } => unreachable!("{} is INTERNAL", hmm.state_name(s)),
    };
    let cap = table.len() - 1;
    let (dg, dc) = (state.dg as isize, state.dc as isize);
    let (g, c) = (g as isize, c as isize);
    let e = ctx.emission(s, g, c);
    if e == MIN_SCORE {
        return;
    }
    let (sg, sc) = (g - dg, c - dc);
    if sg >= ctx.g_start as isize && sc >= 0 {
        let (ug, uc) = (sg as usize, sc as usize);
        tail.offer(view.tail(sg, sc, x) + ext + e, Source::Tail { g: ug, c: uc });
        tail.offer(view.capped(sg, sc, x) + step + e, Source::Capped { g: ug, c: uc });
    }
    let mut emitted = 0f64;
    for d in 1..=cap as isize {
        let unit = if d == 1 {
            e
        } else {
            ctx.emission(s, g - (d - 1) * dg, c - (d - 1) * dc)
        };
        emitted += unit;
        let (sg, sc) = (g - d * dg, c - d * dc);
        if emitted == MIN_SCORE || sg < ctx.g_start as isize || sc < 0 {
            break;
        }
        let duration = table[d as usize];
        let is_cap = d as usize == cap;
        if ctx.is_begin(sg, sc) {
            let value = state.init + duration + emitted;
            main.offer(value, Source::Begin);
            if is_cap {
                capped.offer(value, Source::Begin);
            }
        } else {
            let (ug, uc) = (sg as usize, sc as usize);
            for &from in hmm.predecessors(s).iter() {
                let value = view.main(sg, sc, from) + hmm.transition(from, s) + duration + emitted;
                let source = Source::Entry { g: ug, c: uc, from };
                main.offer(value, source);
                if is_cap {
                    capped.offer(value, source);
                }
            }
        }
    }
    main.offer(
        tail.value(),
        Source::Tail {
            g: g as usize,
            c: c as usize,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn best_keeps_first() {
        let mut best = Best::new();
        best.offer(MIN_SCORE, Source::Begin);
        assert!(best.source.is_none());
        best.offer(-1.0, Source::Continue { g: 1, c: 1 });
        best.offer(-1.0, Source::Begin);
        assert_eq!(best.source, Some(Source::Continue { g: 1, c: 1 }));
        best.offer(-0.5, Source::Begin);
        assert_eq!(best.source, Some(Source::Begin));
    }
    #[test]
    fn sum() {
        let mut sum = Sum::default();
        sum.offer(0.25f64.ln(), Source::Begin);
        sum.offer(MIN_SCORE, Source::Begin);
        sum.offer(0.5f64.ln(), Source::Begin);
        assert!((sum.value() - 0.75f64.ln()).abs() < 1e-12);
    }
}
