//! Align a stream of cDNAs against one genomic sequence.
//!
//! Each cDNA is decoded once per combination of alignment mode (which
//! strand of the cDNA) and splice mode (which strand of the model). The
//! first combination with the strictly highest score is reported.
use crate::error::{PairError, Result};
use crate::fasta::FASTARecord;
use crate::feature::{self, Direction, LocalHeader};
use crate::model::{Hmm, Strand};
use crate::padseq::Dna;
use crate::score::*;
use crate::seed::{Band, SeedAlignment, DEFAULT_MARGIN};
use crate::viterbi::{self, Decode};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Strands of the cDNA to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentMode {
    Forward,
    Reverse,
    Both,
}

impl std::str::FromStr for AlignmentMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "forward" => Ok(AlignmentMode::Forward),
            "reverse" => Ok(AlignmentMode::Reverse),
            "both" => Ok(AlignmentMode::Both),
            _ => Err(format!("unknown alignment mode {}", s)),
        }
    }
}

impl AlignmentMode {
    fn directions(self) -> Vec<Direction> {
        match self {
            AlignmentMode::Forward => vec![Direction::Forward],
            AlignmentMode::Reverse => vec![Direction::Reverse],
            AlignmentMode::Both => vec![Direction::Forward, Direction::Reverse],
        }
    }
}

/// Strands of the model to try. `Cdna` follows the alignment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpliceMode {
    Forward,
    Reverse,
    Both,
    Cdna,
}

impl std::str::FromStr for SpliceMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "forward" => Ok(SpliceMode::Forward),
            "reverse" => Ok(SpliceMode::Reverse),
            "both" => Ok(SpliceMode::Both),
            "cdna" => Ok(SpliceMode::Cdna),
            _ => Err(format!("unknown splice mode {}", s)),
        }
    }
}

impl SpliceMode {
    fn directions(self, alignment: Direction) -> Vec<Direction> {
        match self {
            SpliceMode::Forward => vec![Direction::Forward],
            SpliceMode::Reverse => vec![Direction::Reverse],
            SpliceMode::Both => vec![Direction::Forward, Direction::Reverse],
            SpliceMode::Cdna => vec![alignment],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignConfig {
    pub alignment_mode: AlignmentMode,
    pub splice_mode: SpliceMode,
    /// Print the feature list instead of the gapped alignment.
    pub feature_list: bool,
    /// Skip the Forward pass.
    pub optimized: bool,
    pub use_null: bool,
    /// Margin around the HSPs of a seed.
    pub margin: usize,
    /// A cDNA longer than this many times the genomic window is not aligned.
    pub max_cdna_ratio: f64,
}

impl std::default::Default for AlignConfig {
    fn default() -> Self {
        Self {
            alignment_mode: AlignmentMode::Both,
            splice_mode: SpliceMode::Cdna,
            feature_list: false,
            optimized: false,
            use_null: true,
            margin: DEFAULT_MARGIN,
            max_cdna_ratio: 2f64,
        }
    }
}

impl AlignConfig {
    pub fn new(alignment_mode: AlignmentMode, splice_mode: SpliceMode) -> Self {
        Self {
            alignment_mode,
            splice_mode,
            ..Default::default()
        }
    }
    /// Every (alignment, splice) combination to run, in order.
    pub fn combinations(&self, forced: Option<Direction>) -> Vec<(Direction, Direction)> {
        let alignments = match forced {
            Some(direction) => vec![direction],
            None => self.alignment_mode.directions(),
        };
        alignments
            .into_iter()
            .flat_map(|a| {
                self.splice_mode
                    .directions(a)
                    .into_iter()
                    .map(move |s| (a, s))
            })
            .collect()
    }
}

/// The model read on both strands.
#[derive(Debug, Clone)]
pub struct StrandedModels {
    pub plus: Hmm,
    pub minus: Hmm,
}

impl StrandedModels {
    pub fn new(hmm: Hmm) -> Self {
        let minus = hmm.strand_resolved(Strand::Minus);
        Self { plus: hmm, minus }
    }
    pub fn get(&self, splice: Direction) -> &Hmm {
        match splice {
            Direction::Forward => &self.plus,
            Direction::Reverse => &self.minus,
        }
    }
}

/// The best decode of one cDNA.
#[derive(Debug, Clone)]
pub struct AlignResult {
    pub alignment: Direction,
    pub splice: Direction,
    pub decode: Decode,
    /// The cDNA as it was decoded, reverse-complemented for [`Direction::Reverse`].
    pub cdna: Dna,
}

/// The alignment mode a seed forces, if any.
pub fn forced_direction(seed: Option<&SeedAlignment>) -> Option<Direction> {
    seed.and_then(|s| s.strand).map(|strand| match strand {
        Strand::Plus => Direction::Forward,
        Strand::Minus => Direction::Reverse,
    })
}

/// Decode `cdna` against `genomic` in every configured combination and keep the best.
pub fn align_cdna(
    models: &StrandedModels,
    config: &AlignConfig,
    genomic: &Dna,
    cdna: &Dna,
    seed: Option<&SeedAlignment>,
) -> Result<AlignResult> {
    let combinations = config.combinations(forced_direction(seed));
    // Reported as forward/forward whatever the modes were.
    let degenerate = |cdna: &Dna| AlignResult {
        alignment: Direction::Forward,
        splice: Direction::Forward,
        decode: Decode::degenerate(),
        cdna: cdna.clone(),
    };
    let band = match seed {
        Some(seed) if seed.is_empty() => {
            warn!("Empty seed alignment found. Skipping {}", cdna.name());
            return Ok(degenerate(cdna));
        }
        Some(seed) => {
            seed.validate(genomic.len(), cdna.len())?;
            Band::from_seed(seed, cdna.len(), config.margin)
        }
        None => Band::full(0, genomic.len(), cdna.len()),
    };
    let window = band.g_end() - band.g_start();
    if cdna.len() as f64 > config.max_cdna_ratio * window as f64 {
        warn!(
            "{} ({}bp) is too long for a genomic window of {}bp. Skipping",
            cdna.name(),
            cdna.len(),
            window
        );
        return Ok(degenerate(cdna));
    }
    let mut best: Option<AlignResult> = None;
    for (alignment, splice) in combinations {
        info!(
            "Running alignment_mode={}, splice_mode={}",
            alignment.est_str(),
            splice.gene_str()
        );
        let hmm = models.get(splice);
        let cdna = match alignment {
            Direction::Forward => cdna.clone(),
            Direction::Reverse => cdna.anti_complemented(),
        };
        let decode = viterbi::decode(hmm, genomic, &cdna, band.clone(), !config.optimized);
        if let Some(forward) = decode.forward {
            debug!("Viterbi {:.4}, Forward {:.4}", decode.score, forward);
        }
        if decode.is_degenerate() {
            continue;
        }
        let score = best.as_ref().map(|b| b.decode.score).unwrap_or(MIN_SCORE);
        if decode.score > score {
            best = Some(AlignResult {
                alignment,
                splice,
                decode,
                cdna,
            });
        }
    }
    Ok(best.unwrap_or_else(|| degenerate(cdna)))
}

/// User plus system CPU time of this process, in seconds.
pub fn cpu_seconds() -> f64 {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) } != 0 {
        warn!("getrusage failed. CPU time is reported as 0");
        return 0f64;
    }
    let seconds = |t: libc::timeval| t.tv_sec as f64 + t.tv_usec as f64 / 1_000_000f64;
    seconds(usage.ru_utime) + seconds(usage.ru_stime)
}

/// Align every cDNA of `cdnas` and print the results. `seeds`, when given,
/// holds one seed per cDNA. Output of the cDNAs aligned before a fatal
/// error is written before the error is returned.
pub fn run<W, I>(
    wtr: &mut W,
    models: &StrandedModels,
    config: &AlignConfig,
    genomic: &Dna,
    cdnas: I,
    seeds: Option<&[SeedAlignment]>,
) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = Result<FASTARecord>>,
{
    let mut count = 0;
    for record in cdnas {
        let (id, seq) = record?;
        let cdna = Dna::new(&id, seq);
        let seed = match seeds {
            Some(seeds) => match seeds.get(count) {
                Some(seed) => Some(seed),
                None => {
                    return Err(PairError::Seed {
                        file: "seeds".to_string(),
                        msg: format!("Incorrect number of seed alignments: no seed for {}", id),
                    })
                }
            },
            None => None,
        };
        if let Some(direction) = forced_direction(seed) {
            let (strand, mode) = match direction {
                Direction::Forward => ('+', "forward"),
                Direction::Reverse => ('-', "reverse"),
            };
            writeln!(
                wtr,
                "# Seed alignment found in {} strand of cDNA. {} alignment_mode enforced",
                strand, mode
            )?;
        }
        let start = cpu_seconds();
        let result = align_cdna(models, config, genomic, &cdna, seed)?;
        let header = LocalHeader {
            genomic: (genomic.name(), genomic.len()),
            cdna: (cdna.name(), cdna.len()),
            alignment: result.alignment,
            splice: result.splice,
            seconds: (cpu_seconds() - start).max(0f64),
            score: result.decode.score,
        };
        feature::write_local_header(wtr, &header)?;
        if !result.decode.is_degenerate() {
            if config.feature_list {
                feature::write_feature_list(wtr, &result.decode.features, result.decode.forward)?;
            } else {
                let hmm = models.get(result.splice);
                feature::write_alignment(wtr, hmm, &result.decode.features, genomic, &result.cdna)?;
            }
        }
        wtr.flush()?;
        count += 1;
    }
    if let Some(seeds) = seeds {
        if seeds.len() != count {
            return Err(PairError::Seed {
                file: "seeds".to_string(),
                msg: format!(
                    "Incorrect number of seed alignments: {} seeds for {} cDNAs",
                    seeds.len(),
                    count
                ),
            });
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fasta::FastaReader;
    use crate::gen_seq;
    use crate::model::tests::test_hmm;
    use crate::model::StateRole;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    fn small_gene(seed: u64) -> gen_seq::Gene {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(seed);
        gen_seq::generate_gene(&mut rng, &[60, 60], &[150])
    }
    #[test]
    fn combinations() {
        let config = AlignConfig::default();
        let (f, r) = (Direction::Forward, Direction::Reverse);
        assert_eq!(config.combinations(None), vec![(f, f), (r, r)]);
        assert_eq!(config.combinations(Some(r)), vec![(r, r)]);
        let config = AlignConfig::new(AlignmentMode::Forward, SpliceMode::Both);
        assert_eq!(config.combinations(None), vec![(f, f), (f, r)]);
        assert_eq!("cdna".parse::<SpliceMode>(), Ok(SpliceMode::Cdna));
        assert!("sideways".parse::<AlignmentMode>().is_err());
    }
    #[test]
    fn reverse_strand_gene() {
        let models = StrandedModels::new(test_hmm());
        let gene = small_gene(12);
        let genomic = Dna::new("genomic", gene.genomic.as_slice());
        let cdna = Dna::new("cdna", gene.cdna.as_slice());
        let plus = align_cdna(&models, &AlignConfig::default(), &genomic, &cdna, None).unwrap();
        assert_eq!((plus.alignment, plus.splice), (Direction::Forward, Direction::Forward));
        let minus_genomic = genomic.anti_complemented();
        let result = align_cdna(&models, &AlignConfig::default(), &minus_genomic, &cdna, None).unwrap();
        assert_eq!((result.alignment, result.splice), (Direction::Reverse, Direction::Reverse));
        assert!(approx_eq(result.decode.score, plus.decode.score, 1e-6));
        let hmm = models.get(Direction::Reverse);
        let introns = result
            .decode
            .features
            .iter()
            .filter(|f| hmm.states[f.state].role == StateRole::Intron)
            .count();
        assert!(introns > 0);
        assert!(result.decode.features.iter().all(|f| f.strand == Strand::Minus));
    }
    #[test]
    fn too_long() {
        let models = StrandedModels::new(test_hmm());
        let genomic = Dna::new("genomic", b"ACGTACGTAC".as_ref());
        let cdna = Dna::new("cdna", vec![b'A'; 40]);
        let result = align_cdna(&models, &AlignConfig::default(), &genomic, &cdna, None).unwrap();
        assert!(result.decode.is_degenerate());
        assert_eq!(result.decode.score, 0f64);
    }
    #[test]
    fn empty_seed() {
        let models = StrandedModels::new(test_hmm());
        let gene = small_gene(3);
        let genomic = Dna::new("genomic", gene.genomic.as_slice());
        let fasta = format!(
            ">first\n{}\n>second\n{}\n",
            String::from_utf8_lossy(&gene.cdna),
            String::from_utf8_lossy(&gene.cdna)
        );
        let seeds = vec![
            SeedAlignment::boundary("first", 0, 0),
            SeedAlignment::boundary("second", 1, genomic.len()),
        ];
        let config = AlignConfig {
            feature_list: true,
            ..Default::default()
        };
        let mut out = vec![];
        let records = FastaReader::new("cdna.fa", fasta.as_bytes());
        let count = run(&mut out, &models, &config, &genomic, records, Some(&seeds)).unwrap();
        assert_eq!(count, 2);
        let text = String::from_utf8(out).unwrap();
        let scores: Vec<_> = text
            .lines()
            .filter_map(|l| l.strip_prefix("# Optimal score: "))
            .collect();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], "0.000000");
        assert!(text.contains(
            "# Note Best alignment is between forward est and forward genome, and splice sites imply forward gene"
        ));
        assert_ne!(scores[1], "0.000000");
        assert!(text.contains("# Forward score: "));
        assert!(text.lines().any(|l| l.starts_with("Match\t+\t1\t60\t1\t60\t60\t")));
    }
    #[test]
    fn empty_seed_on_minus_strand() {
        let models = StrandedModels::new(test_hmm());
        let genomic = Dna::new("genomic", b"ACGTACGTACGT".as_ref());
        let cdna = Dna::new("cdna", b"ACGT".as_ref());
        let mut seed = SeedAlignment::boundary("cdna", 0, 0);
        seed.strand = Some(Strand::Minus);
        let result = align_cdna(&models, &AlignConfig::default(), &genomic, &cdna, Some(&seed)).unwrap();
        assert!(result.decode.is_degenerate());
        assert_eq!((result.alignment, result.splice), (Direction::Forward, Direction::Forward));
    }
    #[test]
    fn cpu_time() {
        let start = cpu_seconds();
        assert!(start > 0f64);
        let models = StrandedModels::new(test_hmm());
        let gene = small_gene(21);
        let genomic = Dna::new("genomic", gene.genomic.as_slice());
        let cdna = Dna::new("cdna", gene.cdna.as_slice());
        align_cdna(&models, &AlignConfig::default(), &genomic, &cdna, None).unwrap();
        assert!(cpu_seconds() >= start);
    }
    #[test]
    fn malformed_second_cdna() {
        let models = StrandedModels::new(test_hmm());
        let gene = small_gene(9);
        let genomic = Dna::new("genomic", gene.genomic.as_slice());
        let fasta = format!(">first\n{}\n>second\n>third\nACGT\n", String::from_utf8_lossy(&gene.cdna));
        let config = AlignConfig {
            alignment_mode: AlignmentMode::Forward,
            ..Default::default()
        };
        let mut out = vec![];
        let records = FastaReader::new("cdna.fa", fasta.as_bytes());
        let result = run(&mut out, &models, &config, &genomic, records, None);
        assert!(matches!(result, Err(PairError::Fasta { .. })));
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("# Spliced alignment").count(), 1);
        assert!(text.contains("# cDNA    Sequence: first, 120bp"));
        assert!(text.lines().any(|l| l.starts_with("Exon")));
        assert!(text.lines().any(|l| l.starts_with("+Intron")));
    }
    #[test]
    fn seed_count_mismatch() {
        let models = StrandedModels::new(test_hmm());
        let genomic = Dna::new("genomic", b"ACGTACGTACGT".as_ref());
        let seeds = vec![SeedAlignment::boundary("a", 0, 0)];
        let fasta = ">a\nACGT\n>b\nACGT\n";
        let records = FastaReader::new("cdna.fa", fasta.as_bytes());
        let mut out = vec![];
        let config = AlignConfig::default();
        let result = run(&mut out, &models, &config, &genomic, records, Some(&seeds));
        assert!(matches!(result, Err(PairError::Seed { .. })));
    }
}
