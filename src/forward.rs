//! Pair Forward decoder. Same candidates as the Viterbi decoder, summed.
use crate::model::{Hmm, StateType};
use crate::padseq::Dna;
use crate::recursion::*;
use crate::score::*;
use crate::seed::Band;
use crate::trellis::{PairTrellis, Plane, ScoreView};

pub struct PairForward<'a> {
    ctx: Context<'a>,
    band: Band,
    trellis: PairTrellis<Score>,
}

impl<'a> PairForward<'a> {
    pub fn new(hmm: &'a Hmm, genomic: &'a Dna, cdna: &'a Dna, band: Band) -> Self {
        let (g_start, g_end) = (band.g_start(), band.g_end());
        let ctx = Context {
            hmm,
            genomic,
            cdna,
            g_start,
        };
        let trellis = PairTrellis::new(hmm, g_start, g_end, cdna.len());
        Self { ctx, band, trellis }
    }
    pub fn fill_column(&mut self, g: usize) {
        self.trellis.open_column(g, |_, _| {});
        let states = self.ctx.hmm.num_states();
        for (lo, hi) in self.band.column(g) {
            for c in lo..=hi {
                if g == self.band.g_start() && c == 0 {
                    continue;
                }
                for s in 0..states {
                    match self.ctx.hmm.states[s].state_type {
                        StateType::Internal => {
                            let mut sum = Sum::default();
                            relax_internal(&self.ctx, &self.trellis, g, c, s, &mut sum);
                            *self.trellis.get_mut(Plane::Main, g, c, s) = sum.value();
                        }
                        StateType::Explicit => self.fill_explicit(g, c, s),
                    }
                }
            }
        }
    }
    fn fill_explicit(&mut self, g: usize, c: usize, s: usize) {
        let x = match self.trellis.explicit_slot(s) {
            Some(x) => x,
            None => unreachable!(),
        };
        let (mut main, mut capped, mut tail) = (Sum::default(), Sum::default(), Sum::default());
        relax_explicit(
            &self.ctx,
            &self.trellis,
            (g, c),
            (s, x),
            &mut main,
            &mut capped,
            &mut tail,
        );
        *self.trellis.get_mut(Plane::Tail, g, c, x) = tail.value();
        *self.trellis.get_mut(Plane::Capped, g, c, x) = capped.value();
        *self.trellis.get_mut(Plane::Main, g, c, s) = main.value();
    }
    /// Log-probability of every path reaching the end.
    pub fn finish(self) -> Score {
        let (g, c) = (self.band.g_end() as isize, self.ctx.cdna.len() as isize);
        let ends: Vec<_> = self
            .ctx
            .hmm
            .states
            .iter()
            .enumerate()
            .map(|(s, state)| self.trellis.main(g, c, s) + state.exit)
            .collect();
        logsumexp(&ends)
    }
    pub fn run(mut self) -> Score {
        for g in self.band.g_start()..=self.band.g_end() {
            self.fill_column(g);
        }
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::test_hmm;
    use crate::viterbi::PairViterbi;
    #[test]
    fn forward_bounds_viterbi() {
        let hmm = test_hmm();
        let genomic = Dna::new("g", b"TTGACCGTAAGTCCCCTTTCAGGATTACA".as_ref());
        let cdna = Dna::new("c", b"GACCGATTAC".as_ref());
        let band = Band::full(0, genomic.len(), cdna.len());
        let forward = PairForward::new(&hmm, &genomic, &cdna, band.clone()).run();
        let viterbi = PairViterbi::new(&hmm, &genomic, &cdna, band).run();
        assert!(forward > MIN_SCORE);
        assert!(forward >= viterbi.score - 1e-9);
    }
    #[test]
    fn single_path() {
        // A single Match unit is the only way to explain one pair of bases.
        let hmm = test_hmm();
        let genomic = Dna::new("g", b"A".as_ref());
        let cdna = Dna::new("c", b"A".as_ref());
        let band = Band::full(0, 1, 1);
        let forward = PairForward::new(&hmm, &genomic, &cdna, band.clone()).run();
        let viterbi = PairViterbi::new(&hmm, &genomic, &cdna, band).run();
        assert!(approx_eq(forward, viterbi.score, 1e-9), "{} {}", forward, viterbi.score);
    }
}
