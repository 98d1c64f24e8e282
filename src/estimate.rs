//! Parameter estimation from training alignments.
//!
//! Feature lists written by the decoder (`-i`) are counted state by state:
//! how often each state is entered and left, how long it stays and which
//! bases it emits. The counts are turned into a parameter file of the
//! 17-state U2/U12 topology below. A few optional hacks patch the counts
//! or the resulting model where training data are known to be thin.
use crate::error::{PairError, Result};
use crate::fasta::FastaReader;
use crate::feature::{parse_feature_lists, AlignmentFeature, Direction, FeatureList};
use crate::intern::StringPool;
use crate::model::*;
use crate::padseq::{Dna, ADENINE, AMBIGUOUS, SYMBOLS};
use crate::score::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Longest duration an EXPLICIT state is smoothed over.
pub const EXPLICIT_MAX: usize = 30;
/// Neighbour rank used to pick each kernel's bandwidth.
pub const KERNEL_NEIGHBOR: usize = 8;
pub const GENOMIC_NULL_DURATION: &str = "GenomicNull";
pub const CDNA_NULL_DURATION: &str = "CDnaNull";
/// Extension score of the durations that should never last.
const PROHIBITIVE: Score = -300f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Lut,
    Wmm,
}

#[derive(Debug, Clone, Copy)]
struct StateSpec {
    name: &'static str,
    state_type: StateType,
    dg: usize,
    dc: usize,
    kind: Kind,
    // Whether the state gets its own emission table, or just the null one.
    scoring: bool,
}

impl StateSpec {
    const fn new(name: &'static str, dg: usize, dc: usize, kind: Kind, scoring: bool) -> Self {
        Self {
            name,
            state_type: StateType::Internal,
            dg,
            dc,
            kind,
            scoring,
        }
    }
    const fn explicit(self) -> Self {
        Self {
            state_type: StateType::Explicit,
            ..self
        }
    }
    fn length(&self) -> usize {
        self.dg + self.dc
    }
    fn seq_type(&self) -> SeqType {
        match (self.dg, self.dc) {
            (_, 0) => SeqType::Genomic,
            (0, _) => SeqType::Dna,
            _ => SeqType::Pair,
        }
    }
    fn table_len(&self) -> usize {
        match self.kind {
            Kind::Lut => SYMBOLS.pow(self.length() as u32),
            Kind::Wmm => SYMBOLS * self.length(),
        }
    }
}

const TOPOLOGY: [StateSpec; 17] = [
    StateSpec::new("RGenomic1", 1, 0, Kind::Lut, false),
    StateSpec::new("RCDna1", 0, 1, Kind::Lut, false),
    StateSpec::new("Match", 1, 1, Kind::Lut, true),
    StateSpec::new("DonorU2", 8, 0, Kind::Wmm, true),
    StateSpec::new("AccU2", 6, 0, Kind::Wmm, true),
    StateSpec::new("DonorU12", 8, 0, Kind::Wmm, true),
    StateSpec::new("AccU12", 6, 0, Kind::Wmm, true),
    StateSpec::new("IntronU2", 1, 0, Kind::Lut, false),
    StateSpec::new("IntronU12", 1, 0, Kind::Lut, false),
    StateSpec::new("BranchU2", 8, 0, Kind::Wmm, false),
    StateSpec::new("BrAccU2", 1, 0, Kind::Lut, false).explicit(),
    StateSpec::new("BranchU12", 8, 0, Kind::Wmm, true),
    StateSpec::new("BrAccU12", 1, 0, Kind::Lut, false).explicit(),
    StateSpec::new("Genomic", 1, 0, Kind::Lut, false),
    StateSpec::new("CDna", 0, 1, Kind::Lut, false),
    StateSpec::new("RGenomic2", 1, 0, Kind::Lut, false),
    StateSpec::new("RCDna2", 0, 1, Kind::Lut, false),
];

/// Index of a state of the estimated topology.
pub fn state_index(name: &str) -> Option<usize> {
    TOPOLOGY.iter().position(|s| s.name == name)
}

fn index_of(name: &str) -> usize {
    match state_index(name) {
        Some(i) => i,
        None => unreachable!("{} is not in the topology", name),
    }
}

/// Optional corrections of the estimated parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hacks {
    /// Fixed initial probabilities for the overhangs and Match.
    pub init: bool,
    /// Fixed transition counts around the unaligned ends.
    pub overhang: bool,
    /// Boost A in the 3' cDNA overhang so poly-A tails stay out of Match.
    pub polya: bool,
    /// One intron length distribution for both intron classes.
    pub intron_length: bool,
    /// U12 acceptors leave like U2 acceptors.
    pub splice_exit: bool,
    /// U12 donors are entered 0.1/99.9 as often as U2 donors.
    pub splice_entry: bool,
    /// Overhangs take the durations of the background.
    pub unify_models: bool,
}

impl Hacks {
    /// Every hack except `splice_entry`.
    pub fn usual() -> Self {
        Self {
            init: true,
            overhang: true,
            polya: true,
            intron_length: true,
            splice_exit: true,
            splice_entry: false,
            unify_models: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateConfig {
    pub name: String,
    pub hacks: Hacks,
}

impl std::default::Default for EstimateConfig {
    fn default() -> Self {
        Self {
            name: "pairagon".to_string(),
            hacks: Hacks::default(),
        }
    }
}

impl EstimateConfig {
    pub fn new(hacks: Hacks) -> Self {
        Self {
            hacks,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StateCounts {
    // Number of features.
    count: u64,
    // Sum of the feature lengths.
    duration: u64,
    init: u64,
    transitions: Vec<u64>,
    // Same layout as the emission table.
    nuc: Vec<u64>,
    // frequency[d] = number of features of length d, up to EXPLICIT_MAX.
    frequency: Vec<u64>,
}

impl StateCounts {
    fn new(spec: &StateSpec) -> Self {
        Self {
            count: 0,
            duration: 0,
            init: 0,
            transitions: vec![0; TOPOLOGY.len()],
            nuc: vec![0; spec.table_len()],
            frequency: vec![0; EXPLICIT_MAX + 1],
        }
    }
    fn merge(&mut self, other: &Self) {
        self.count += other.count;
        self.duration += other.duration;
        self.init += other.init;
        add(&mut self.transitions, &other.transitions);
        add(&mut self.nuc, &other.nuc);
        add(&mut self.frequency, &other.frequency);
    }
}

fn add(xs: &mut [u64], ys: &[u64]) {
    xs.iter_mut().zip(ys.iter()).for_each(|(x, y)| *x += y);
}

/// Everything counted over the training alignments.
#[derive(Debug, Clone, PartialEq)]
pub struct Counts {
    states: Vec<StateCounts>,
    genomic_bg: [u64; SYMBOLS],
    cdna_bg: [u64; SYMBOLS],
    file_count: u64,
    alignment_count: u64,
}

impl std::default::Default for Counts {
    fn default() -> Self {
        Self::new()
    }
}

impl Counts {
    pub fn new() -> Self {
        Self {
            states: TOPOLOGY.iter().map(StateCounts::new).collect(),
            genomic_bg: [0; SYMBOLS],
            cdna_bg: [0; SYMBOLS],
            file_count: 0,
            alignment_count: 0,
        }
    }
    pub fn merge(&mut self, other: &Self) {
        for (x, y) in self.states.iter_mut().zip(other.states.iter()) {
            x.merge(y);
        }
        add(&mut self.genomic_bg, &other.genomic_bg);
        add(&mut self.cdna_bg, &other.cdna_bg);
        self.file_count += other.file_count;
        self.alignment_count += other.alignment_count;
    }
    pub fn alignment_count(&self) -> u64 {
        self.alignment_count
    }
    /// Count the background composition of one genomic sequence.
    pub fn add_genomic(&mut self, genomic: &Dna) {
        for &base in genomic.iter() {
            self.genomic_bg[base as usize] += 1;
        }
        self.file_count += 1;
    }
    /// Count one alignment. The features should be on the plus strand of
    /// `genomic` and `cdna` (see [`orient`]).
    pub fn add_alignment(&mut self, genomic: &Dna, cdna: &Dna, features: &[AlignmentFeature]) -> Result<()> {
        if features.is_empty() {
            warn!("Did not read any features for {}", cdna.name());
        }
        let mut previous: Option<usize> = None;
        for feature in features.iter() {
            check_bounds(feature, genomic, cdna)?;
            let s = feature.state;
            if s >= TOPOLOGY.len() {
                return Err(PairError::Invariant(format!("unknown state {}", feature.name)));
            }
            self.add_feature(s, feature, genomic, cdna);
            match previous {
                // Repeated INTERNAL states are a single stay.
                Some(p) if p == s && TOPOLOGY[s].state_type == StateType::Internal => {}
                Some(p) => self.states[p].transitions[s] += 1,
                None => self.states[s].init += 1,
            }
            previous = Some(s);
        }
        for &base in cdna.iter() {
            self.cdna_bg[base as usize] += 1;
        }
        self.alignment_count += 1;
        Ok(())
    }
    fn add_feature(&mut self, s: usize, f: &AlignmentFeature, genomic: &Dna, cdna: &Dna) {
        let spec = &TOPOLOGY[s];
        let counts = &mut self.states[s];
        if spec.state_type == StateType::Explicit && f.length <= EXPLICIT_MAX {
            counts.frequency[f.length] += 1;
        }
        counts.duration += f.length as u64;
        counts.count += 1;
        let base = |seq: &Dna, i: usize| seq.get_s5(i as isize) as usize;
        match (spec.seq_type(), spec.kind) {
            (SeqType::Dna, _) => {
                for c in f.c_start..=f.c_end {
                    counts.nuc[base(cdna, c)] += 1;
                }
            }
            (SeqType::Genomic, Kind::Lut) => {
                let len = spec.length();
                let mut g = f.g_start;
                while g + len <= f.g_end + 1 {
                    let word: Vec<_> = (g..g + len).map(|i| base(genomic, i)).collect();
                    if word.iter().all(|&x| x != AMBIGUOUS as usize) {
                        counts.nuc[word.iter().fold(0, |acc, x| acc * SYMBOLS + x)] += 1;
                    }
                    g += len;
                }
            }
            (SeqType::Genomic, Kind::Wmm) => {
                for j in 0..spec.length() {
                    let x = base(genomic, f.g_start + j);
                    if x != AMBIGUOUS as usize {
                        counts.nuc[j * SYMBOLS + x] += 1;
                    }
                }
            }
            (SeqType::Pair, _) => {
                for (g, c) in (f.g_start..=f.g_end).zip(f.c_start..=f.c_end) {
                    counts.nuc[SYMBOLS * base(genomic, g) + base(cdna, c)] += 1;
                }
            }
        }
    }
}

fn check_bounds(f: &AlignmentFeature, genomic: &Dna, cdna: &Dna) -> Result<()> {
    let out = f.g_end > genomic.len()
        || f.c_end > cdna.len()
        || f.g_start > f.g_end + 1
        || f.c_start > f.c_end + 1
        || f.g_start == 0
        || f.c_start == 0;
    if out {
        Err(PairError::Invariant(format!(
            "Wrong sequence for alignment {} vs {}",
            genomic.name(),
            cdna.name()
        )))
    } else {
        Ok(())
    }
}

/// Mirror a feature onto the reverse complement of sequences of
/// `g_len` and `c_len` bases.
pub fn reflect(f: &AlignmentFeature, g_len: usize, c_len: usize) -> AlignmentFeature {
    AlignmentFeature {
        g_start: g_len + 1 - f.g_end,
        g_end: g_len + 1 - f.g_start,
        c_start: c_len + 1 - f.c_end,
        c_end: c_len + 1 - f.c_start,
        strand: f.strand.flip(),
        ..f.clone()
    }
}

/// The sequences and features of `list` as the plus-strand model reads them:
/// a reversed cDNA is reverse-complemented, and a minus-strand alignment
/// is mirrored onto the reverse complement of both sequences.
pub fn orient(genomic: &Dna, cdna: &Dna, list: &FeatureList) -> Result<(Dna, Dna, Vec<AlignmentFeature>)> {
    let cdna = match list.alignment {
        Direction::Forward => cdna.clone(),
        Direction::Reverse => cdna.anti_complemented(),
    };
    match list.features.first() {
        Some(first) if first.strand == Strand::Minus => {
            for f in list.features.iter() {
                check_bounds(f, genomic, &cdna)?;
            }
            let (g_len, c_len) = (genomic.len(), cdna.len());
            let features: Vec<_> = list.features.iter().rev().map(|f| reflect(f, g_len, c_len)).collect();
            Ok((genomic.anti_complemented(), cdna.anti_complemented(), features))
        }
        _ => Ok((genomic.clone(), cdna, list.features.clone())),
    }
}

/// One genomic sequence, its cDNAs and the decoder output aligning them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSet {
    pub cdna: PathBuf,
    pub genomic: PathBuf,
    pub alignments: PathBuf,
}

fn read_list(path: &Path) -> Result<Vec<PathBuf>> {
    let text = std::fs::read_to_string(path).map_err(|e| PairError::io(path, e))?;
    Ok(text
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(PathBuf::from)
        .collect())
}

/// Zip three list files, one path per line. Extra lines of the longer lists are ignored.
pub fn read_training_sets(cdna: &Path, genomic: &Path, alignments: &Path) -> Result<Vec<TrainingSet>> {
    let (cdna, genomic, alignments) = (read_list(cdna)?, read_list(genomic)?, read_list(alignments)?);
    if cdna.len() != genomic.len() || cdna.len() != alignments.len() {
        warn!(
            "Lists have different lengths ({}, {}, {}). Using the first {}",
            cdna.len(),
            genomic.len(),
            alignments.len(),
            cdna.len().min(genomic.len()).min(alignments.len())
        );
    }
    Ok(cdna
        .into_iter()
        .zip(genomic)
        .zip(alignments)
        .map(|((cdna, genomic), alignments)| TrainingSet {
            cdna,
            genomic,
            alignments,
        })
        .collect())
}

/// Count the alignments of `lists`, in parallel.
pub fn count_lists(genomic: &Dna, cdnas: &HashMap<String, Dna>, lists: &[FeatureList]) -> Result<Counts> {
    let counts = lists
        .par_iter()
        .map(|list| {
            let cdna = cdnas.get(&list.cdna).ok_or_else(|| {
                PairError::Invariant(format!("Matching cDNA sequence cannot be found for '{}'", list.cdna))
            })?;
            let (genomic, cdna, features) = orient(genomic, cdna, list)?;
            let mut counts = Counts::new();
            counts.add_alignment(&genomic, &cdna, &features)?;
            Ok(counts)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(counts.iter().fold(Counts::new(), |mut acc, x| {
        acc.merge(x);
        acc
    }))
}

fn count_set(set: &TrainingSet) -> Result<Counts> {
    let genomic = crate::fasta::read_single(&set.genomic)?;
    let cdnas = FastaReader::open(&set.cdna)?
        .map(|record| record.map(|(id, seq)| (id.clone(), Dna::new(&id, seq))))
        .collect::<Result<HashMap<_, _>>>()?;
    let file = set.alignments.to_string_lossy();
    let text = std::fs::read_to_string(&set.alignments).map_err(|e| PairError::io(&set.alignments, e))?;
    let lists = parse_feature_lists(&file, &text, state_index)?;
    debug!("{}: {} alignments against {}", file, lists.len(), genomic.name());
    let mut counts = count_lists(&genomic, &cdnas, &lists)?;
    counts.add_genomic(&genomic);
    Ok(counts)
}

/// Count every training set and estimate a model.
pub fn estimate(sets: &[TrainingSet], config: &EstimateConfig) -> Result<Hmm> {
    info!("Reading {} training sets", sets.len());
    let counts = sets.par_iter().map(count_set).collect::<Result<Vec<_>>>()?;
    let counts = counts.iter().fold(Counts::new(), |mut acc, x| {
        acc.merge(x);
        acc
    });
    info!("Counted {} alignments", counts.alignment_count);
    build_hmm(counts, config)
}

/// Smoothed log-probabilities of durations `1..=max` from the histogram
/// `count[d]`. Each observed length gets a gaussian kernel whose width is
/// the distance to its `m`-th neighbour.
pub fn kernel_smooth(count: &[u64], max: usize, m: usize) -> Vec<Score> {
    let samples: Vec<(usize, u64)> = (1..=max)
        .filter_map(|d| count.get(d).filter(|&&c| c > 0).map(|&c| (d, c)))
        .collect();
    if samples.is_empty() {
        warn!("No duration observed. Using a uniform distribution");
        return vec![float2score(1f64 / max as f64); max];
    }
    let num_points: u64 = samples.iter().map(|x| x.1).sum();
    let floor_scale = 0.5 / (num_points as f64).powf(0.2);
    let mut sigmas = Vec::with_capacity(samples.len());
    for (i, &(len, _)) in samples.iter().enumerate() {
        let left = i.checked_sub(m).map(|j| 1 + len - samples[j].0);
        let right = samples.get(i + m).map(|&(l, _)| 1 + l - len);
        let sigma = match (left, right) {
            (Some(l), Some(r)) => l.min(r),
            (Some(l), None) => l,
            (None, Some(r)) => r,
            (None, None) => {
                debug!("Both neighbors are undefined. Switching to m={}", m - 1);
                return kernel_smooth(count, max, m - 1);
            }
        };
        sigmas.push((sigma as f64).max(floor_scale * len as f64));
    }
    let kernel = |sigma: f64, x: f64| (-0.5 * (x / sigma).powi(2)).exp() / ((2f64 * std::f64::consts::PI).sqrt() * sigma);
    let pi: Vec<f64> = (1..=max)
        .map(|d| {
            let sum: f64 = samples
                .iter()
                .zip(sigmas.iter())
                .map(|(&(len, c), &sigma)| c as f64 * kernel(sigma, d as f64 - len as f64))
                .sum();
            sum / num_points as f64
        })
        .collect();
    let total: f64 = pi.iter().sum();
    pi.iter().map(|&p| float2score(p / total)).collect()
}

// Counts patched before they become probabilities.
fn pre_hacks(counts: &mut Counts, hacks: &Hacks) {
    if hacks.intron_length {
        let (u2, u12) = (index_of("IntronU2"), index_of("IntronU12"));
        let duration = counts.states[u2].duration + counts.states[u12].duration;
        let count = counts.states[u2].count + counts.states[u12].count;
        for &s in [u2, u12].iter() {
            counts.states[s].duration = duration;
            counts.states[s].count = count;
        }
    }
    if hacks.splice_exit {
        let transitions = counts.states[index_of("AccU2")].transitions.clone();
        counts.states[index_of("AccU12")].transitions = transitions;
    }
    if hacks.splice_entry {
        let (u2, u12) = (index_of("DonorU2"), index_of("DonorU12"));
        for state in counts.states.iter_mut() {
            let entry = state.transitions[u2];
            if entry > 0 {
                state.transitions[u12] = (0.1 / 99.9 * entry as f64).ceil() as u64;
            }
        }
    }
    if hacks.overhang {
        let n = counts.alignment_count;
        let extra = [
            ("RGenomic1", "Match", 9),
            ("RGenomic1", "RCDna1", 1),
            ("RCDna1", "Match", 1),
            ("Match", "RGenomic2", n - n / 10),
            ("Match", "RCDna2", n / 10),
            ("RGenomic2", "RCDna2", 1),
            ("RCDna1", "RGenomic1", 0),
        ];
        for &(from, to, count) in extra.iter() {
            counts.states[index_of(from)].transitions[index_of(to)] = count;
        }
    }
    if hacks.polya {
        let nuc = &mut counts.states[index_of("RCDna2")].nuc;
        nuc[ADENINE as usize] += nuc[ADENINE as usize] / 2;
    }
}

fn frequencies(xs: &[u64; SYMBOLS]) -> [f64; SYMBOLS] {
    let total: u64 = xs.iter().sum();
    let mut freq = [0f64; SYMBOLS];
    if total > 0 {
        freq.iter_mut().zip(xs.iter()).for_each(|(f, &x)| *f = x as f64 / total as f64);
    }
    freq
}

// Background table of a state.
fn null_table(spec: &StateSpec, genomic: &[f64; SYMBOLS], cdna: &[f64; SYMBOLS]) -> Vec<Score> {
    let bg = |pos: usize| match spec.seq_type() {
        SeqType::Genomic => genomic,
        SeqType::Dna => cdna,
        SeqType::Pair if pos < spec.length() / 2 => genomic,
        SeqType::Pair => cdna,
    };
    let len = spec.length();
    match spec.kind {
        Kind::Lut => (0..spec.table_len())
            .map(|idx| {
                let mut rest = idx;
                let mut p = 1f64;
                for pos in (0..len).rev() {
                    p *= bg(pos)[rest % SYMBOLS];
                    rest /= SYMBOLS;
                }
                float2score(p)
            })
            .collect(),
        Kind::Wmm => (0..len)
            .flat_map(|pos| bg(pos).iter().map(|&p| float2score(p)))
            .collect(),
    }
}

// Emission table of a scoring state: counts normalized per row.
fn scoring_table(spec: &StateSpec, nuc: &[u64]) -> Vec<Score> {
    let row = match spec.kind {
        Kind::Lut => nuc.len(),
        Kind::Wmm => SYMBOLS,
    };
    nuc.chunks(row)
        .flat_map(|xs| {
            let total: u64 = xs.iter().sum();
            xs.iter().map(move |&x| match x {
                0 => MIN_SCORE,
                _ => float2score(x as f64 / total as f64),
            })
        })
        .collect()
}

fn state_duration(spec: &StateSpec, counts: &StateCounts) -> std::result::Result<Distribution, String> {
    if spec.state_type == StateType::Explicit {
        let smooth = kernel_smooth(&counts.frequency, EXPLICIT_MAX, KERNEL_NEIGHBOR);
        Distribution::new(vec![
            Piece::Defined {
                start: 1,
                end: EXPLICIT_MAX,
                scores: smooth,
            },
            Piece::Constant {
                start: EXPLICIT_MAX + 1,
                end: DURATION_MAX,
                score: PROHIBITIVE,
            },
        ])
    } else if spec.kind == Kind::Wmm {
        Distribution::new(vec![
            Piece::Constant {
                start: 1,
                end: 1,
                score: 0f64,
            },
            Piece::Constant {
                start: 2,
                end: DURATION_MAX,
                score: PROHIBITIVE,
            },
        ])
    } else {
        let mean = match counts.count {
            0 => 0f64,
            n => (counts.duration as f64 / n as f64).ceil(),
        };
        Ok(Distribution::geometric(mean))
    }
}

/// Turn the counts into a model, applying the hacks of `config`.
pub fn build_hmm(mut counts: Counts, config: &EstimateConfig) -> Result<Hmm> {
    if counts.alignment_count == 0 || counts.file_count == 0 {
        return Err(PairError::Invariant("no training alignment was read".to_string()));
    }
    let hacks = &config.hacks;
    pre_hacks(&mut counts, hacks);
    let genomic_bg = frequencies(&counts.genomic_bg);
    let cdna_bg = frequencies(&counts.cdna_bg);
    let init_total: u64 = counts.states.iter().map(|s| s.init).sum();
    let mut pool = StringPool::new();
    let mut states = Vec::with_capacity(TOPOLOGY.len());
    let mut transitions = vec![];
    let mut durations = Vec::with_capacity(TOPOLOGY.len() + 2);
    let mut models = Vec::with_capacity(2 * TOPOLOGY.len());
    for (i, (spec, c)) in TOPOLOGY.iter().zip(counts.states.iter()).enumerate() {
        let name = pool.intern(spec.name);
        let init = match init_total {
            0 => MIN_SCORE,
            total => float2score(c.init as f64 / total as f64),
        };
        states.push(State {
            name,
            state_type: spec.state_type,
            strand: Strand::Plus,
            init,
            exit: 0f64,
            duration: i,
            model: 2 * i,
            null: Some(2 * i + 1),
            dg: spec.dg,
            dc: spec.dc,
            role: StateRole::from_name(spec.name, spec.dg, spec.dc),
        });
        let row_total: u64 = c.transitions.iter().sum();
        for (to, &x) in c.transitions.iter().enumerate().filter(|x| *x.1 > 0) {
            transitions.push((i, to, float2score(x as f64 / row_total as f64)));
        }
        let duration = state_duration(spec, c).map_err(PairError::Invariant)?;
        durations.push((name, duration));
        let emission = |table: Vec<Score>| match spec.kind {
            Kind::Lut => Emission::Lut(table),
            Kind::Wmm => Emission::Wmm(table),
        };
        let null = null_table(spec, &genomic_bg, &cdna_bg);
        let scoring = spec.scoring || (hacks.polya && spec.name == "RCDna2");
        let table = if scoring {
            scoring_table(spec, &c.nuc)
        } else {
            null.clone()
        };
        let null_name = pool.intern(&format!("{}{}", spec.name, NULL_SUFFIX));
        for (name, table) in vec![(name, table), (null_name, null)] {
            models.push(SeqModel {
                name,
                seq_type: spec.seq_type(),
                length: spec.length(),
                focus: 0,
                emission: emission(table),
            });
        }
    }
    let genomic_total: u64 = counts.genomic_bg.iter().sum();
    let cdna_total: u64 = counts.cdna_bg.iter().sum();
    let genomic_null = durations.len();
    durations.push((
        pool.intern(GENOMIC_NULL_DURATION),
        Distribution::geometric((genomic_total / counts.file_count) as f64),
    ));
    let cdna_null = durations.len();
    durations.push((
        pool.intern(CDNA_NULL_DURATION),
        Distribution::geometric((cdna_total / counts.alignment_count) as f64),
    ));
    if hacks.init {
        for state in states.iter_mut() {
            state.init = match pool.resolve(state.name) {
                "RGenomic1" | "RGenomic2" => float2score(0.985),
                "RCDna1" | "RCDna2" => float2score(0.005),
                "Match" => float2score(0.010),
                _ => state.init,
            };
        }
    }
    if hacks.unify_models {
        for state in states.iter_mut() {
            match state.role {
                StateRole::GenomicOverhang => state.duration = genomic_null,
                StateRole::CDnaOverhang => state.duration = cdna_null,
                _ => {}
            }
        }
    }
    Hmm::new(config.name.clone(), pool, states, &transitions, false, durations, models, true).map_err(PairError::Invariant)
}
