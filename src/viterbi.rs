//! Pair Viterbi decoder.
//!
//! The trellis is filled column by column over the genomic sequence. Only
//! the last few columns are kept; the traceback lives in a [`TbTree`] whose
//! nodes are locked by the cells pointing at them. After every column the
//! cpoint (the tree root) is moved down as far as every live path agrees,
//! and the segments it passes over are committed. At the end, the path from
//! the best final cell back to the cpoint completes the alignment.
use crate::feature::AlignmentFeature;
use crate::forward::PairForward;
use crate::model::{Hmm, StateType};
use crate::padseq::Dna;
use crate::recursion::*;
use crate::score::*;
use crate::seed::Band;
use crate::tbtree::{NodeIx, TbNode, TbTree, NIL};
use crate::trellis::{CellScore, PairTrellis, Plane, ScoreView};

/// A Viterbi cell: the best score, the node where its segment started and,
/// once some later segment starts from here, the node of this cell itself.
#[derive(Debug, Clone, Copy)]
pub struct Cell {
    pub score: Score,
    pub tb: NodeIx,
    pub own: NodeIx,
}

impl CellScore for Cell {
    fn empty() -> Self {
        Cell {
            score: MIN_SCORE,
            tb: NIL,
            own: NIL,
        }
    }
    fn score(&self) -> Score {
        self.score
    }
}

/// A run of one state between two traceback nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub state: usize,
    pub from: (usize, usize),
    pub to: (usize, usize),
    pub score: Score,
}

impl Segment {
    fn new(start: &TbNode, end: &TbNode) -> Self {
        Segment {
            state: end.state,
            from: (start.g, start.c),
            to: (end.g, end.c),
            score: end.score - start.score,
        }
    }
}

/// The result of decoding one pair of sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct Decode {
    /// Viterbi score, exit included.
    pub score: Score,
    /// Forward score, if it was computed.
    pub forward: Option<Score>,
    pub features: Vec<AlignmentFeature>,
}

impl Decode {
    /// The result reported when no alignment could be made.
    pub fn degenerate() -> Self {
        Decode {
            score: 0f64,
            forward: None,
            features: vec![],
        }
    }
    pub fn is_degenerate(&self) -> bool {
        self.features.is_empty()
    }
}

pub struct PairViterbi<'a> {
    ctx: Context<'a>,
    band: Band,
    trellis: PairTrellis<Cell>,
    tree: TbTree,
    // The node standing for the begin cell.
    begin: NodeIx,
    committed: Vec<Segment>,
    forward: Option<PairForward<'a>>,
    max_live: usize,
}

impl<'a> PairViterbi<'a> {
    /// Prepare a decoder over the cells of `band`.
    pub fn new(hmm: &'a Hmm, genomic: &'a Dna, cdna: &'a Dna, band: Band) -> Self {
        let (g_start, g_end) = (band.g_start(), band.g_end());
        assert!(g_end <= genomic.len() && band.c_len() == cdna.len());
        let ctx = Context {
            hmm,
            genomic,
            cdna,
            g_start,
        };
        let trellis = PairTrellis::new(hmm, g_start, g_end, cdna.len());
        let mut tree = TbTree::new(g_start, 0);
        let begin = tree.root();
        // Held by the begin cell until its column is evicted.
        tree.lock(begin);
        Self {
            ctx,
            band,
            trellis,
            tree,
            begin,
            committed: vec![],
            forward: None,
            max_live: 1,
        }
    }
    /// Run the Forward recursion over the same columns.
    pub fn with_forward(mut self) -> Self {
        let ctx = self.ctx;
        self.forward = Some(PairForward::new(
            ctx.hmm,
            ctx.genomic,
            ctx.cdna,
            self.band.clone(),
        ));
        self
    }
    pub fn band(&self) -> &Band {
        &self.band
    }
    pub fn tree(&self) -> &TbTree {
        &self.tree
    }
    /// Largest number of tree nodes alive at the end of a column so far.
    pub fn max_live_nodes(&self) -> usize {
        self.max_live
    }
    /// Segments committed so far.
    pub fn committed(&self) -> &[Segment] {
        &self.committed
    }
    /// Fill every column and trace back.
    pub fn run(mut self) -> Decode {
        for g in self.band.g_start()..=self.band.g_end() {
            self.fill_column(g);
        }
        self.finish()
    }
    /// Fill column `g`. Columns should be filled in order.
    pub fn fill_column(&mut self, g: usize) {
        let window = self.trellis.window();
        let tree = &mut self.tree;
        self.trellis.open_column(g, |_, cell| {
            if cell.tb != NIL {
                tree.unlock(cell.tb);
            }
            if cell.own != NIL {
                tree.unlock(cell.own);
            }
        });
        if g == self.band.g_start() + window {
            self.tree.unlock(self.begin);
        }
        let states = self.ctx.hmm.num_states();
        for (lo, hi) in self.band.column(g) {
            for c in lo..=hi {
                if g == self.band.g_start() && c == 0 {
                    continue;
                }
                for s in 0..states {
                    match self.ctx.hmm.states[s].state_type {
                        StateType::Internal => self.fill_internal(g, c, s),
                        StateType::Explicit => self.fill_explicit(g, c, s),
                    }
                }
            }
        }
        let committed = &mut self.committed;
        let count = self
            .tree
            .advance_cpoint(|start, end| committed.push(Segment::new(start, end)));
        if count > 0 {
            trace!("Column {}: {} segments committed", g, count);
        }
        self.max_live = self.max_live.max(self.tree.live());
        if let Some(forward) = self.forward.as_mut() {
            forward.fill_column(g);
        }
    }
    fn fill_internal(&mut self, g: usize, c: usize, s: usize) {
        let mut best = Best::new();
        relax_internal(&self.ctx, &self.trellis, g, c, s, &mut best);
        if let Some(source) = best.source {
            let tb = self.resolve(source, s);
            self.store(Plane::Main, g, c, s, best.score, tb);
        }
    }
    fn fill_explicit(&mut self, g: usize, c: usize, s: usize) {
        let x = match self.trellis.explicit_slot(s) {
            Some(x) => x,
            None => unreachable!(),
        };
        let (mut main, mut capped, mut tail) = (Best::new(), Best::new(), Best::new());
        relax_explicit(
            &self.ctx,
            &self.trellis,
            (g, c),
            (s, x),
            &mut main,
            &mut capped,
            &mut tail,
        );
        if let Some(source) = tail.source {
            let tb = self.resolve(source, s);
            self.store(Plane::Tail, g, c, x, tail.score, tb);
        }
        if let Some(source) = capped.source {
            let tb = self.resolve(source, s);
            self.store(Plane::Capped, g, c, x, capped.score, tb);
        }
        if let Some(source) = main.source {
            let tb = self.resolve(source, s);
            self.store(Plane::Main, g, c, s, main.score, tb);
        }
    }
    fn store(&mut self, plane: Plane, g: usize, c: usize, s: usize, score: Score, tb: NodeIx) {
        self.tree.lock(tb);
        *self.trellis.get_mut(plane, g, c, s) = Cell { score, tb, own: NIL };
    }
    // The node a candidate's segment starts from.
    fn resolve(&mut self, source: Source, s: usize) -> NodeIx {
        match source {
            Source::Begin => self.begin,
            Source::Entry { g, c, from } => self.own_node(g, c, from),
            Source::Continue { g, c } => self.trellis.get(Plane::Main, g, c, s).tb,
            Source::Capped { g, c } => {
                let x = self.trellis.explicit_slot(s).unwrap_or(0);
                self.trellis.get(Plane::Capped, g, c, x).tb
            }
            Source::Tail { g, c } => {
                let x = self.trellis.explicit_slot(s).unwrap_or(0);
                self.trellis.get(Plane::Tail, g, c, x).tb
            }
        }
    }
    // The node of the segment of `s` ending at (g, c), created on first use.
    fn own_node(&mut self, g: usize, c: usize, s: usize) -> NodeIx {
        let cell = *self.trellis.get(Plane::Main, g, c, s);
        if cell.own != NIL {
            return cell.own;
        }
        let own = self.tree.new_child(cell.tb, g, c, s, cell.score);
        self.tree.lock(own);
        self.trellis.get_mut(Plane::Main, g, c, s).own = own;
        own
    }
    /// Pick the best final cell and assemble the alignment.
    pub fn finish(mut self) -> Decode {
        let hmm = self.ctx.hmm;
        let (g, c) = (self.band.g_end(), self.ctx.cdna.len());
        let mut best: Option<(usize, Score)> = None;
        for (s, state) in hmm.states.iter().enumerate() {
            let score = self.trellis.main(g as isize, c as isize, s) + state.exit;
            if score > best.map(|x| x.1).unwrap_or(MIN_SCORE) {
                best = Some((s, score));
            }
        }
        let forward = self.forward.take().map(|f| f.finish());
        let (last, score) = match best {
            Some(best) => best,
            None => {
                warn!(
                    "No alignment between {} and {}",
                    self.ctx.genomic.name(),
                    self.ctx.cdna.name()
                );
                return Decode::degenerate();
            }
        };
        let own = self.own_node(g, c, last);
        let path = self.tree.path_to_root(own);
        let mut segments = std::mem::take(&mut self.committed);
        segments.extend(path.windows(2).rev().map(|pair| {
            let (end, start) = (self.tree.node(pair[0]), self.tree.node(pair[1]));
            Segment::new(start, end)
        }));
        if let Some(last) = segments.last_mut() {
            last.score += hmm.states[last.state].exit;
        }
        debug!(
            "Viterbi {:.3} with {} segments, at most {} live nodes",
            score,
            segments.len(),
            self.max_live
        );
        Decode {
            score,
            forward,
            features: AlignmentFeature::from_segments(hmm, &segments),
        }
    }
    /// Check that every pointer held by the trellis refers to a live, locked
    /// node under the cpoint, and that no cell outside of the band was filled.
    pub fn check_integrity(&self) -> Result<(), String> {
        let root = self.tree.root();
        for (plane, g, c, s, cell) in self.trellis.filled_cells() {
            if !self.band.contains(g, c) {
                return Err(format!("{:?} cell ({},{},{}) is outside of the band", plane, g, c, s));
            }
            for &node in [cell.tb, cell.own].iter().filter(|&&n| n != NIL) {
                if !self.tree.is_alive(node) {
                    return Err(format!("({},{},{}) points to a freed node {}", g, c, s, node));
                }
                if self.tree.node(node).lock_count() == 0 {
                    return Err(format!("({},{},{}) holds no lock on node {}", g, c, s, node));
                }
                if !self.tree.is_ancestor(root, node) {
                    return Err(format!("({},{},{}) is not under the cpoint", g, c, s));
                }
            }
            if cell.tb == NIL {
                return Err(format!("({},{},{}) has no traceback", g, c, s));
            }
        }
        Ok(())
    }
}

/// Decode `genomic` and `cdna` over `band`, optionally with the Forward score.
pub fn decode(hmm: &Hmm, genomic: &Dna, cdna: &Dna, band: Band, forward: bool) -> Decode {
    let viterbi = PairViterbi::new(hmm, genomic, cdna, band);
    if forward {
        viterbi.with_forward().run()
    } else {
        viterbi.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen_seq;
    use crate::model::tests::test_hmm;
    use crate::model::{StateRole, Strand};
    use crate::seed::{Hsp, SeedAlignment};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    fn full_band(genomic: &Dna, cdna: &Dna) -> Band {
        Band::full(0, genomic.len(), cdna.len())
    }
    fn run_checked(hmm: &Hmm, genomic: &Dna, cdna: &Dna, band: Band) -> Decode {
        let mut viterbi = PairViterbi::new(hmm, genomic, cdna, band).with_forward();
        for g in viterbi.band().g_start()..=viterbi.band().g_end() {
            viterbi.fill_column(g);
            if let Err(why) = viterbi.check_integrity() {
                panic!("column {}: {}", g, why);
            }
        }
        viterbi.finish()
    }
    fn feature_sum(decode: &Decode) -> f64 {
        decode.features.iter().map(|f| f.score).sum()
    }
    #[test]
    fn identity() {
        let hmm = test_hmm();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(4289);
        let template = gen_seq::generate_seq(&mut rng, 600);
        let genomic = Dna::new("genomic", template.as_slice());
        let cdna = Dna::new("cdna", &template[200..400]);
        let decode = run_checked(&hmm, &genomic, &cdna, full_band(&genomic, &cdna));
        let matches: Vec<_> = decode
            .features
            .iter()
            .filter(|f| hmm.states[f.state].role == StateRole::Match)
            .collect();
        assert_eq!(matches.len(), 1, "{:?}", decode.features);
        let m = matches[0];
        assert_eq!((m.g_start, m.g_end, m.c_start, m.c_end), (201, 400, 1, 200));
        assert!(decode
            .features
            .iter()
            .all(|f| hmm.states[f.state].role != StateRole::Intron));
        assert!(approx_eq(decode.score, feature_sum(&decode), 1e-6));
        assert!(decode.forward.unwrap() >= decode.score - 1e-9);
    }
    #[test]
    fn single_intron() {
        let hmm = test_hmm();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(392);
        let gene = gen_seq::generate_gene(&mut rng, &[150, 150], &[500]);
        let genomic = Dna::new("genomic", gene.genomic.as_slice());
        let cdna = Dna::new("cdna", gene.cdna.as_slice());
        let decode = run_checked(&hmm, &genomic, &cdna, full_band(&genomic, &cdna));
        let fs = &decode.features;
        let first = &fs[0];
        let last = &fs[fs.len() - 1];
        assert_eq!(hmm.state_name(first.state), "Match");
        assert_eq!((first.g_start, first.g_end, first.c_start, first.c_end), (1, 150, 1, 150));
        assert_eq!(hmm.state_name(last.state), "Match");
        assert_eq!((last.g_start, last.g_end, last.c_start, last.c_end), (651, 800, 151, 300));
        let intron = &fs[1..fs.len() - 1];
        assert!(intron.iter().all(|f| hmm.states[f.state].role == StateRole::Intron));
        assert_eq!(hmm.state_name(intron[0].state), "DonorU2");
        assert_eq!((intron[0].g_start, intron[0].g_end), (151, 158));
        let acc = &intron[intron.len() - 1];
        assert_eq!(hmm.state_name(acc.state), "AccU2");
        assert_eq!((acc.g_start, acc.g_end), (645, 650));
        assert!(approx_eq(decode.score, feature_sum(&decode), 1e-6));
        assert!(decode.forward.unwrap() >= decode.score - 1e-9);
    }
    #[test]
    fn strand_symmetry() {
        let hmm = test_hmm();
        let minus = hmm.strand_resolved(Strand::Minus);
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(77);
        let gene = gen_seq::generate_gene(&mut rng, &[60, 50], &[120]);
        let genomic = Dna::new("genomic", gene.genomic.as_slice());
        let cdna = Dna::new("cdna", gene.cdna.as_slice());
        let plus = decode(&hmm, &genomic, &cdna, full_band(&genomic, &cdna), true);
        let rg = genomic.anti_complemented();
        let rc = cdna.anti_complemented();
        let mirrored = decode(&minus, &rg, &rc, full_band(&rg, &rc), true);
        assert!(approx_eq(plus.score, mirrored.score, 1e-6), "{} {}", plus.score, mirrored.score);
        let (x, y) = (plus.forward.unwrap(), mirrored.forward.unwrap());
        assert!(approx_eq(x, y, 1e-6), "{} {}", x, y);
        assert!(mirrored.features.iter().all(|f| f.strand == Strand::Minus));
        // The same path read from the other end.
        let (gl, cl) = (genomic.len() + 1, cdna.len() + 1);
        let reflected: Vec<_> = plus
            .features
            .iter()
            .rev()
            .map(|f| (f.state, gl - f.g_end, gl - f.g_start, cl - f.c_end, cl - f.c_start, f.length))
            .collect();
        let minus_coordinates: Vec<_> = mirrored
            .features
            .iter()
            .map(|f| (f.state, f.g_start, f.g_end, f.c_start, f.c_end, f.length))
            .collect();
        assert_eq!(reflected, minus_coordinates);
    }
    #[test]
    fn seeded() {
        let hmm = test_hmm();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(1100);
        let flank = gen_seq::generate_seq(&mut rng, 100);
        let gene = gen_seq::generate_gene(&mut rng, &[120, 120, 120], &[300, 300]);
        // A copy of the second exon inside the first intron.
        let mut gene_genomic = gene.genomic.clone();
        gene_genomic.splice(200..320, gene.cdna[120..240].iter().copied());
        let mut genomic = flank.clone();
        genomic.extend(gene_genomic);
        genomic.extend(flank.iter().rev());
        let genomic = Dna::new("genomic", genomic.as_slice());
        let cdna = Dna::new("cdna", gene.cdna.as_slice());
        let hsps = vec![
            Hsp {
                genomic_start: 101,
                genomic_end: 220,
                cdna_start: 1,
                cdna_end: 120,
            },
            Hsp {
                genomic_start: 521,
                genomic_end: 640,
                cdna_start: 121,
                cdna_end: 240,
            },
            Hsp {
                genomic_start: 941,
                genomic_end: 1060,
                cdna_start: 241,
                cdna_end: 360,
            },
        ];
        let seed = SeedAlignment {
            description: "cdna".to_string(),
            gb_start: 1,
            gb_end: genomic.len(),
            strand: Some(Strand::Plus),
            hsps: hsps.clone(),
        };
        seed.validate(genomic.len(), cdna.len()).unwrap();
        let band = Band::from_seed(&seed, cdna.len(), 10);
        let decode = run_checked(&hmm, &genomic, &cdna, band.clone());
        let matches: Vec<_> = decode
            .features
            .iter()
            .filter(|f| hmm.states[f.state].role == StateRole::Match)
            .map(|f| (f.g_start, f.g_end, f.c_start, f.c_end))
            .collect();
        let expected: Vec<_> = hsps
            .iter()
            .map(|h| (h.genomic_start, h.genomic_end, h.cdna_start, h.cdna_end))
            .collect();
        assert_eq!(matches, expected);
        let donors = decode
            .features
            .iter()
            .filter(|f| hmm.state_name(f.state) == "DonorU2")
            .count();
        assert_eq!(donors, 2);
        for f in decode.features.iter() {
            assert!(band.contains(f.g_end, f.c_end));
            assert!(band.contains(f.g_start - 1, f.c_start - 1));
        }
    }
    // Largest number of live tree nodes while decoding a gene padded with `pad` random bases.
    fn max_live_with_padding(pad: usize) -> usize {
        let hmm = test_hmm();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(5);
        let gene = gen_seq::generate_gene(&mut rng, &[100, 100], &[200]);
        let mut genomic = gene.genomic.clone();
        genomic.extend(gen_seq::generate_seq(&mut rng, pad));
        let genomic = Dna::new("genomic", genomic.as_slice());
        let cdna = Dna::new("cdna", gene.cdna.as_slice());
        let mut viterbi = PairViterbi::new(&hmm, &genomic, &cdna, full_band(&genomic, &cdna));
        for g in 0..=genomic.len() {
            viterbi.fill_column(g);
        }
        let max_live = viterbi.max_live_nodes();
        assert!(!viterbi.finish().is_degenerate());
        max_live
    }
    #[test]
    fn memory_stays_bounded() {
        let short = max_live_with_padding(400);
        let long = max_live_with_padding(2000);
        assert!(long <= short + short / 5, "{} {}", short, long);
    }
    #[test]
    fn seeded_commit() {
        let hmm = test_hmm();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(2718);
        let flank = gen_seq::generate_seq(&mut rng, 50);
        let gene = gen_seq::generate_gene(&mut rng, &[100, 100], &[200]);
        let mut genomic = flank.clone();
        genomic.extend(gene.genomic.iter().copied());
        genomic.extend(flank.iter().rev());
        let genomic = Dna::new("genomic", genomic.as_slice());
        let cdna = Dna::new("cdna", gene.cdna.as_slice());
        let seed = SeedAlignment {
            description: "cdna".to_string(),
            gb_start: 1,
            gb_end: genomic.len(),
            strand: Some(Strand::Plus),
            hsps: vec![
                Hsp {
                    genomic_start: 51,
                    genomic_end: 150,
                    cdna_start: 1,
                    cdna_end: 100,
                },
                Hsp {
                    genomic_start: 351,
                    genomic_end: 450,
                    cdna_start: 101,
                    cdna_end: 200,
                },
            ],
        };
        seed.validate(genomic.len(), cdna.len()).unwrap();
        // Without margin, row 0 leaves the band after the first HSP and the
        // paths between the HSPs run through a single row.
        let band = Band::from_seed(&seed, cdna.len(), 0);
        let mut viterbi = PairViterbi::new(&hmm, &genomic, &cdna, band);
        for g in 0..=genomic.len() {
            viterbi.fill_column(g);
            if let Err(why) = viterbi.check_integrity() {
                panic!("column {}: {}", g, why);
            }
        }
        let committed = viterbi.committed().to_vec();
        assert!(!committed.is_empty());
        assert_eq!(hmm.state_name(committed[0].state), "RGenomic1");
        assert_eq!((committed[0].from, committed[0].to), ((0, 0), (50, 0)));
        for pair in committed.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        let decode = viterbi.finish();
        // The committed part is the head of the final traceback. Its last
        // feature may still be extended by the segments that follow.
        let head = AlignmentFeature::from_segments(&hmm, &committed);
        let (last, done) = head.split_last().unwrap();
        assert_eq!(done, &decode.features[..done.len()]);
        let next = &decode.features[done.len()];
        assert_eq!((next.state, next.g_start, next.c_start), (last.state, last.g_start, last.c_start));
        assert!(next.g_end >= last.g_end && next.c_end >= last.c_end);
        let matches: Vec<_> = decode
            .features
            .iter()
            .filter(|f| hmm.states[f.state].role == StateRole::Match)
            .map(|f| (f.g_start, f.g_end, f.c_start, f.c_end))
            .collect();
        assert_eq!(matches, vec![(51, 150, 1, 100), (351, 450, 101, 200)]);
    }
    #[test]
    fn idempotent() {
        let hmm = test_hmm();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(31);
        let gene = gen_seq::generate_gene(&mut rng, &[80, 90], &[200]);
        let genomic = Dna::new("genomic", gene.genomic.as_slice());
        let cdna = Dna::new("cdna", gene.cdna.as_slice());
        let x = decode(&hmm, &genomic, &cdna, full_band(&genomic, &cdna), true);
        let y = decode(&hmm, &genomic, &cdna, full_band(&genomic, &cdna), true);
        assert_eq!(x, y);
    }
    #[test]
    fn unreachable_end() {
        let hmm = test_hmm();
        let genomic = Dna::new("genomic", b"ACGTACGT".as_ref());
        let cdna = Dna::new("cdna", b"ACGT".as_ref());
        let seed = SeedAlignment::boundary("x", 1, 1);
        let band = Band::from_seed(&seed, cdna.len(), 10);
        let decode = PairViterbi::new(&hmm, &genomic, &cdna, band).run();
        // RCDna1 then a single Match column still reaches the end.
        assert!(!decode.is_degenerate());
        // Nothing can leave RCDna1 without a genomic base.
        let genomic = Dna::new("genomic", b"".as_ref());
        let band = Band::full(0, 0, cdna.len());
        let decode = PairViterbi::new(&hmm, &genomic, &cdna, band).run();
        assert!(decode.is_degenerate());
        assert_eq!(decode.score, 0f64);
    }
}
