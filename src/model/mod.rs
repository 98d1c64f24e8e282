//! Pair hidden Markov models for spliced alignment.
//!
//! A model is a set of states, each of which consumes `(dg, dc)` bases of
//! the genomic and the cDNA sequence per unit, stays for a number of units
//! drawn from its duration distribution, and scores the consumed bases by
//! its sequence model (optionally divided by a null model).
//!
//! INTERNAL states have memoryless durations: the first unit pays
//! `score(1)` and every further unit pays the same extension score.
//! EXPLICIT states have an arbitrary duration table up to their cap
//! and a constant extension beyond it.
//!
//! Everything is in log space (see [`crate::score`]).
pub mod duration;
pub mod emission;
pub mod parser;
use crate::intern::{StrIdx, StringPool};
use crate::padseq::Dna;
use crate::score::*;
pub use duration::{Distribution, Piece, DURATION_MAX};
pub use emission::{Emission, SeqModel, SeqType};
use std::collections::HashMap;

/// Suffix of null model names.
pub const NULL_SUFFIX: &str = "_NULL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateType {
    Internal,
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Strand {
    Plus,
    Minus,
}

impl Strand {
    pub fn flip(self) -> Self {
        match self {
            Strand::Plus => Strand::Minus,
            Strand::Minus => Strand::Plus,
        }
    }
    pub fn as_char(self) -> char {
        match self {
            Strand::Plus => '+',
            Strand::Minus => '-',
        }
    }
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Strand::Plus),
            '-' => Some(Strand::Minus),
            _ => None,
        }
    }
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// What a state means biologically. Used for rendering alignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRole {
    Match,
    /// Genomic bases not aligned to the cDNA inside the alignment.
    GenomicGap,
    /// cDNA bases not aligned to the genome inside the alignment.
    CDnaGap,
    /// Unaligned genomic flank.
    GenomicOverhang,
    /// Unaligned cDNA end.
    CDnaOverhang,
    /// Donor, acceptor, branch point or intron body.
    Intron,
}

impl StateRole {
    pub fn from_name(name: &str, dg: usize, dc: usize) -> Self {
        const SPLICE: [&str; 5] = ["Donor", "Acc", "Intron", "Branch", "BrAcc"];
        if name == "Match" {
            StateRole::Match
        } else if name.starts_with("RGenomic") {
            StateRole::GenomicOverhang
        } else if name.starts_with("RCDna") {
            StateRole::CDnaOverhang
        } else if name == "Genomic" {
            StateRole::GenomicGap
        } else if name == "CDna" {
            StateRole::CDnaGap
        } else if SPLICE.iter().any(|p| name.starts_with(p)) {
            StateRole::Intron
        } else if dg > 0 && dc > 0 {
            StateRole::Match
        } else if dg > 0 {
            StateRole::GenomicGap
        } else {
            StateRole::CDnaGap
        }
    }
}

#[derive(Debug, Clone)]
pub struct State {
    pub name: StrIdx,
    pub state_type: StateType,
    pub strand: Strand,
    pub init: Score,
    /// Score of moving to the end of the alignment.
    pub exit: Score,
    /// Index into the durations.
    pub duration: usize,
    /// Index into the models.
    pub model: usize,
    pub null: Option<usize>,
    /// Genomic bases per unit.
    pub dg: usize,
    /// cDNA bases per unit.
    pub dc: usize,
    pub role: StateRole,
}

/// Per-state duration scores in the shape the decoders need.
#[derive(Debug, Clone, PartialEq)]
pub enum Timing {
    /// `score(d) = entry + (d-1) * ext`.
    Memoryless { entry: Score, ext: Score },
    /// `table[d] = score(d)` for `d <= cap`, then `step` to reach `cap+1`, then `ext` per unit.
    Explicit {
        table: Vec<Score>,
        step: Score,
        ext: Score,
    },
}

impl Timing {
    pub fn cap(&self) -> usize {
        match self {
            Timing::Memoryless { .. } => 1,
            Timing::Explicit { table, .. } => table.len() - 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Hmm {
    pub name: String,
    pub pool: StringPool,
    pub states: Vec<State>,
    // transitions[from * n + to].
    transitions: Vec<Score>,
    // (from, to) in the order they were declared.
    order: Vec<(usize, usize)>,
    // Whether exit scores were declared explicitly.
    explicit_exit: bool,
    predecessors: Vec<Vec<usize>>,
    pub durations: Vec<(StrIdx, Distribution)>,
    pub models: Vec<SeqModel>,
    pub use_null: bool,
    timings: Vec<Timing>,
}

impl Hmm {
    /// Assemble a model. `transitions` are `(from, to, score)` in declaration order.
    /// Checks every structural invariant the decoders rely on.
    pub fn new(
        name: String,
        pool: StringPool,
        states: Vec<State>,
        transitions: &[(usize, usize, Score)],
        explicit_exit: bool,
        durations: Vec<(StrIdx, Distribution)>,
        models: Vec<SeqModel>,
        use_null: bool,
    ) -> Result<Self, String> {
        let n = states.len();
        let mut matrix = vec![MIN_SCORE; n * n];
        let mut order = vec![];
        let mut predecessors = vec![vec![]; n];
        for &(from, to, score) in transitions.iter() {
            if from >= n || to >= n {
                return Err(format!("transition {} -> {} is out of range", from, to));
            }
            if from == to && states[from].state_type == StateType::Internal && score > MIN_SCORE {
                let name = pool.resolve(states[from].name);
                return Err(format!(
                    "INTERNAL state {} cannot transit to itself; use its duration",
                    name
                ));
            }
            matrix[from * n + to] = score;
            order.push((from, to));
            if score > MIN_SCORE && !predecessors[to].contains(&from) {
                predecessors[to].push(from);
            }
        }
        let mut timings = Vec::with_capacity(n);
        for state in states.iter() {
            let state_name = pool.resolve(state.name);
            if state.dg == 0 && state.dc == 0 {
                return Err(format!("state {} consumes nothing", state_name));
            }
            let (_, dist) = durations
                .get(state.duration)
                .ok_or_else(|| format!("state {} has no duration", state_name))?;
            let timing = match state.state_type {
                StateType::Internal => match dist.memoryless() {
                    Some((entry, ext)) => Timing::Memoryless { entry, ext },
                    None => {
                        return Err(format!(
                            "duration of INTERNAL state {} is not memoryless",
                            state_name
                        ))
                    }
                },
                StateType::Explicit => {
                    let cap = dist.cap();
                    let table: Vec<_> = (0..=cap).map(|d| dist.score(d)).collect();
                    let (step, ext) = dist.tail();
                    Timing::Explicit { table, step, ext }
                }
            };
            timings.push(timing);
            for model in std::iter::once(Some(state.model)).chain(std::iter::once(state.null)) {
                let model = match model {
                    Some(m) => m,
                    None => continue,
                };
                let model = models
                    .get(model)
                    .ok_or_else(|| format!("state {} has no model", state_name))?;
                model.validate()?;
                let region = match model.seq_type {
                    SeqType::Genomic => state.dg,
                    SeqType::Dna => state.dc,
                    SeqType::Pair if state.dg == state.dc => state.dg,
                    SeqType::Pair => 0,
                };
                if region == 0 || model.focus + region > model.span() {
                    return Err(format!(
                        "model {} cannot emit for state {} ({},{})",
                        pool.resolve(model.name),
                        state_name,
                        state.dg,
                        state.dc
                    ));
                }
            }
            if use_null && state.null.is_none() {
                return Err("Cannot process NULL model. Try without --nonull".to_string());
            }
        }
        Ok(Self {
            name,
            pool,
            states,
            transitions: matrix,
            order,
            explicit_exit,
            predecessors,
            durations,
            models,
            use_null,
            timings,
        })
    }
    pub fn num_states(&self) -> usize {
        self.states.len()
    }
    pub fn state_name(&self, s: usize) -> &str {
        self.pool.resolve(self.states[s].name)
    }
    /// Index of the state named `name`.
    pub fn state_index(&self, name: &str) -> Option<usize> {
        let idx = self.pool.get(name)?;
        self.states.iter().position(|s| s.name == idx)
    }
    pub fn transition(&self, from: usize, to: usize) -> Score {
        self.transitions[from * self.states.len() + to]
    }
    /// States with a transition into `to`, in declaration order.
    pub fn predecessors(&self, to: usize) -> &[usize] {
        &self.predecessors[to]
    }
    pub fn timing(&self, s: usize) -> &Timing {
        &self.timings[s]
    }
    /// Number of trellis columns a decoder needs to keep: one plus the
    /// farthest genomic distance any single segment end can look back.
    pub fn window(&self) -> usize {
        1 + self
            .states
            .iter()
            .zip(self.timings.iter())
            .map(|(s, t)| s.dg * t.cap())
            .max()
            .unwrap_or(0)
    }
    /// Score of one unit of state `s` ending at genomic `g` and cDNA `c`.
    pub fn emission(&self, s: usize, genomic: &Dna, cdna: &Dna, g: isize, c: isize) -> Score {
        let state = &self.states[s];
        let ga = g - state.dg as isize + 1;
        let ca = c - state.dc as isize + 1;
        let score = self.models[state.model].score(genomic, cdna, ga, ca);
        match state.null {
            Some(null) if self.use_null && score > MIN_SCORE => {
                let null = self.models[null].score(genomic, cdna, ga, ca);
                if null == MIN_SCORE {
                    MIN_SCORE
                } else {
                    score - null
                }
            }
            _ => score,
        }
    }
    /// Replace entries of every table involving N by the mean of their concrete expansions.
    pub fn ambiguate(&mut self) {
        self.models.iter_mut().for_each(|m| m.ambiguate());
    }
    /// The model as it reads the opposite strand. Scoring the result on
    /// reverse-complemented sequences gives, path by mirrored path, the
    /// same scores as this model on the original sequences.
    pub fn strand_resolved(&self, strand: Strand) -> Self {
        if strand == Strand::Plus {
            return self.clone();
        }
        let n = self.states.len();
        let mut models = vec![];
        let mut made: HashMap<(usize, usize), usize> = HashMap::new();
        let mut states = self.states.clone();
        for state in states.iter_mut() {
            let (dg, dc) = (state.dg, state.dc);
            let mut rc = |m: usize| -> usize {
                let model = &self.models[m];
                let region = match model.seq_type {
                    SeqType::Dna => dc,
                    _ => dg,
                };
                *made.entry((m, region)).or_insert_with(|| {
                    models.push(model.anti_complemented(region));
                    models.len() - 1
                })
            };
            let model = rc(state.model);
            let null = state.null.map(&mut rc);
            state.model = model;
            state.null = null;
            std::mem::swap(&mut state.init, &mut state.exit);
            state.strand = state.strand.flip();
        }
        let mut transitions = vec![MIN_SCORE; n * n];
        for from in 0..n {
            for to in 0..n {
                transitions[to * n + from] = self.transitions[from * n + to];
            }
        }
        let order: Vec<_> = self.order.iter().map(|&(f, t)| (t, f)).collect();
        let mut predecessors = vec![vec![]; n];
        for &(from, to) in order.iter() {
            if transitions[from * n + to] > MIN_SCORE && !predecessors[to].contains(&from) {
                predecessors[to].push(from);
            }
        }
        Self {
            name: self.name.clone(),
            pool: self.pool.clone(),
            states,
            transitions,
            order,
            explicit_exit: true,
            predecessors,
            durations: self.durations.clone(),
            models,
            use_null: self.use_null,
            timings: self.timings.clone(),
        }
    }
}

fn seq_type_name(t: SeqType) -> &'static str {
    match t {
        SeqType::Genomic => "GENOMIC",
        SeqType::Dna => "DNA",
        SeqType::Pair => "PAIR",
    }
}

// Probability token for a score.
fn prob_token(s: Score) -> String {
    format!("{}", score2float(s))
}

/// Writes the model in the parameter file format read by [`parser::read_hmm`].
impl std::fmt::Display for Hmm {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let ends: Vec<_> = if self.explicit_exit {
            self.states
                .iter()
                .enumerate()
                .filter(|(_, s)| s.exit > MIN_SCORE)
                .collect()
        } else {
            vec![]
        };
        writeln!(
            f,
            "<HMM> {} {} {} {} {}",
            self.name,
            self.states.len(),
            self.order.len() + ends.len(),
            self.durations.len(),
            self.models.len()
        )?;
        writeln!(f, "\n<STATES>")?;
        for state in self.states.iter() {
            let kind = match state.state_type {
                StateType::Internal => "INTERNAL",
                StateType::Explicit => "EXPLICIT",
            };
            writeln!(
                f,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                self.pool.resolve(state.name),
                kind,
                state.strand,
                format_score(state.init),
                self.pool.resolve(self.durations[state.duration].0),
                self.pool.resolve(self.models[state.model].name),
                state.dg,
                state.dc
            )?;
        }
        writeln!(f, "\n<HMM_TRANSITIONS>")?;
        for &(from, to) in self.order.iter() {
            let score = self.transition(from, to);
            writeln!(f, "{}\t{}\t{}", self.state_name(from), self.state_name(to), prob_token(score))?;
        }
        for (s, state) in ends {
            writeln!(f, "{}\tEND\t{}", self.state_name(s), prob_token(state.exit))?;
        }
        writeln!(f, "\n<STATE_DURATIONS>")?;
        for (name, dist) in self.durations.iter() {
            writeln!(f, "{}\t{}", self.pool.resolve(*name), dist.pieces().len())?;
            writeln!(f, "{}", dist)?;
        }
        writeln!(f, "\n<SEQUENCE_MODELS>")?;
        for model in self.models.iter() {
            let kind = match model.emission {
                Emission::Lut(_) => "LUT",
                Emission::Wmm(_) => "WMM",
            };
            writeln!(
                f,
                "{}\t{}\t{}\t{}\t{}\t{}",
                self.pool.resolve(model.name),
                kind,
                seq_type_name(model.seq_type),
                model.length,
                model.focus,
                crate::padseq::SYMBOLS
            )?;
            for row in model.values().chunks(crate::padseq::SYMBOLS) {
                let row: Vec<_> = row.iter().map(|&x| format_score(x)).collect();
                writeln!(f, "\t{}", row.join(" "))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    pub(crate) const TEST_MODEL: &str = include_str!("../../testdata/test.zhmm");
    pub(crate) fn test_hmm() -> Hmm {
        parser::parse_hmm("test.zhmm", TEST_MODEL, true).unwrap()
    }
    #[test]
    fn load() {
        let hmm = test_hmm();
        assert_eq!(hmm.num_states(), 12);
        assert_eq!(hmm.window(), 31);
        let m = hmm.state_index("Match").unwrap();
        let donor = hmm.state_index("DonorU2").unwrap();
        assert!(hmm.transition(m, donor) > MIN_SCORE);
        assert!(hmm.predecessors(m).contains(&hmm.state_index("AccU2").unwrap()));
        assert_eq!(hmm.states[m].role, StateRole::Match);
        assert_eq!(hmm.states[donor].role, StateRole::Intron);
        let bracc = hmm.state_index("BrAccU2").unwrap();
        assert_eq!(hmm.timing(bracc).cap(), 30);
    }
    #[test]
    fn match_emission() {
        let hmm = test_hmm();
        let m = hmm.state_index("Match").unwrap();
        let g = Dna::new("g", b"ACGT".as_ref());
        let c = Dna::new("c", b"ACCT".as_ref());
        let same = hmm.emission(m, &g, &c, 1, 1);
        assert!((same - (0.24f64 / 0.0625).ln()).abs() < 1e-4);
        let diff = hmm.emission(m, &g, &c, 3, 3);
        assert!(diff < 0f64);
    }
    #[test]
    fn minus_strand() {
        let hmm = test_hmm();
        let minus = hmm.strand_resolved(Strand::Minus);
        let n = hmm.num_states();
        for from in 0..n {
            for to in 0..n {
                assert_eq!(hmm.transition(from, to), minus.transition(to, from));
            }
        }
        for (p, m) in hmm.states.iter().zip(minus.states.iter()) {
            assert_eq!(p.init, m.exit);
            assert_eq!(p.exit, m.init);
            assert_eq!(m.strand, Strand::Minus);
        }
        let genomic = Dna::new("g", b"AAGGTAAGTCCTTTCAGGA".as_ref());
        let rev = genomic.anti_complemented();
        let len = genomic.len() as isize;
        let donor = hmm.state_index("DonorU2").unwrap();
        for g in 8..=len {
            let x = hmm.emission(donor, &genomic, &genomic, g, 0);
            let y = minus.emission(donor, &rev, &rev, len + 8 - g, 0);
            assert!((x - y).abs() < 1e-9);
        }
    }
    #[test]
    fn round_trip() {
        let hmm = test_hmm();
        let text = format!("{}", hmm);
        let reread = parser::parse_hmm("written", &text, true).unwrap();
        assert_eq!(reread.num_states(), hmm.num_states());
        for from in 0..hmm.num_states() {
            assert_eq!(hmm.states[from].exit > MIN_SCORE, reread.states[from].exit > MIN_SCORE);
            for to in 0..hmm.num_states() {
                let (x, y) = (hmm.transition(from, to), reread.transition(from, to));
                assert!(approx_eq(x, y, 1e-9), "{} {} {} {}", from, to, x, y);
            }
        }
    }
}
