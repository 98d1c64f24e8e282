//! Alignment features and the ways they are printed and read back.
use crate::error::{PairError, Result};
use crate::model::{Hmm, StateRole, Strand};
use crate::padseq::{self, Dna};
use crate::score::*;
use crate::viterbi::Segment;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// A run of one state. Coordinates are 1-based and inclusive; a range that
/// consumes nothing reads as `start = end + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentFeature {
    pub state: usize,
    pub name: String,
    pub strand: Strand,
    pub g_start: usize,
    pub g_end: usize,
    pub c_start: usize,
    pub c_end: usize,
    /// Genomic bases for states reading the genome, cDNA bases otherwise.
    pub length: usize,
    pub score: Score,
}

impl AlignmentFeature {
    /// Features of a traceback, consecutive segments of the same state merged.
    pub fn from_segments(hmm: &Hmm, segments: &[Segment]) -> Vec<Self> {
        let mut features: Vec<Self> = vec![];
        for seg in segments {
            let state = &hmm.states[seg.state];
            let length = if state.dg > 0 {
                seg.to.0 - seg.from.0
            } else {
                seg.to.1 - seg.from.1
            };
            match features.last_mut() {
                Some(last) if last.state == seg.state => {
                    last.g_end = seg.to.0;
                    last.c_end = seg.to.1;
                    last.length += length;
                    last.score += seg.score;
                }
                _ => features.push(AlignmentFeature {
                    state: seg.state,
                    name: hmm.state_name(seg.state).to_string(),
                    strand: state.strand,
                    g_start: seg.from.0 + 1,
                    g_end: seg.to.0,
                    c_start: seg.from.1 + 1,
                    c_end: seg.to.1,
                    length,
                    score: seg.score,
                }),
            }
        }
        features
    }
    pub fn genomic_len(&self) -> usize {
        self.g_end + 1 - self.g_start
    }
    pub fn cdna_len(&self) -> usize {
        self.c_end + 1 - self.c_start
    }
}

impl std::fmt::Display for AlignmentFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.name,
            self.strand,
            self.g_start,
            self.g_end,
            self.c_start,
            self.c_end,
            self.length,
            format_score(self.score)
        )
    }
}

/// Orientation of the cDNA, or of the splice signals, against the genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// How the cDNA orientation is written in the headers.
    pub fn est_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reversed",
        }
    }
    /// How the gene orientation is written in the headers.
    pub fn gene_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "REVERSED",
        }
    }
}

/// Header written once per run.
pub fn write_global_header<W: Write>(
    wtr: &mut W,
    command_line: &str,
    date: &str,
    parameter_file: &str,
) -> std::io::Result<()> {
    writeln!(wtr, "# {}", command_line)?;
    writeln!(wtr, "# Date: {}", date)?;
    writeln!(wtr, "# {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
    writeln!(wtr, "# PairHMM Parameters: {}", parameter_file)
}

/// Everything the header of one cDNA reports.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalHeader<'a> {
    pub genomic: (&'a str, usize),
    pub cdna: (&'a str, usize),
    pub alignment: Direction,
    pub splice: Direction,
    pub seconds: f64,
    pub score: Score,
}

pub fn write_local_header<W: Write>(wtr: &mut W, header: &LocalHeader) -> std::io::Result<()> {
    writeln!(wtr, "# Spliced alignment without quality value for cDNA")?;
    writeln!(wtr, "# Genomic Sequence: {}, {}bp", header.genomic.0, header.genomic.1)?;
    writeln!(wtr, "# cDNA    Sequence: {}, {}bp", header.cdna.0, header.cdna.1)?;
    let conjunction = match header.splice {
        Direction::Forward => "and",
        Direction::Reverse => "but",
    };
    writeln!(
        wtr,
        "# Note Best alignment is between {} est and forward genome, {} splice sites imply {} gene",
        header.alignment.est_str(),
        conjunction,
        header.splice.gene_str()
    )?;
    writeln!(wtr, "# Completed in {:.2} CPU seconds", header.seconds)?;
    writeln!(wtr, "# Optimal score: {:.6}", header.score)
}

/// The `-i` layout: one tab separated feature per line.
pub fn write_feature_list<W: Write>(
    wtr: &mut W,
    features: &[AlignmentFeature],
    forward: Option<Score>,
) -> std::io::Result<()> {
    if let Some(forward) = forward {
        writeln!(wtr, "# Forward score: {}", format_score(forward))?;
    }
    for feature in features {
        writeln!(wtr, "{}", feature)?;
    }
    Ok(())
}

/// One alignment read back from `-i` output.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureList {
    pub cdna: String,
    pub alignment: Direction,
    pub splice: Direction,
    pub score: Score,
    pub forward: Option<Score>,
    pub features: Vec<AlignmentFeature>,
}

/// Parse every alignment of a decoder output written with `-i`. State names are
/// resolved by `resolve`; an unknown name is an error. `file` is used in error messages.
pub fn parse_feature_lists<F>(file: &str, text: &str, resolve: F) -> Result<Vec<FeatureList>>
where
    F: Fn(&str) -> Option<usize>,
{
    let invariant = |no: usize, msg: String| PairError::Invariant(format!("{}:{}: {}", file, no + 1, msg));
    let mut lists: Vec<FeatureList> = vec![];
    for (no, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("# Spliced alignment") {
            lists.push(FeatureList {
                cdna: String::new(),
                alignment: Direction::Forward,
                splice: Direction::Forward,
                score: 0f64,
                forward: None,
                features: vec![],
            });
            continue;
        }
        let list = match lists.last_mut() {
            Some(list) => list,
            None if line.starts_with('#') => continue,
            None => return Err(invariant(no, "feature before any alignment header".to_string())),
        };
        if let Some(rest) = line.strip_prefix("# cDNA    Sequence: ") {
            let end = rest.rfind(',').unwrap_or_else(|| rest.len());
            list.cdna = rest[..end].to_string();
        } else if let Some(rest) = line.strip_prefix("# Note Best alignment is between ") {
            list.alignment = if rest.starts_with("reversed") {
                Direction::Reverse
            } else {
                Direction::Forward
            };
            list.splice = if rest.ends_with("REVERSED gene") {
                Direction::Reverse
            } else {
                Direction::Forward
            };
        } else if let Some(rest) = line.strip_prefix("# Optimal score: ") {
            list.score = parse_score(rest.trim()).ok_or_else(|| invariant(no, format!("bad score {}", rest)))?;
        } else if let Some(rest) = line.strip_prefix("# Forward score: ") {
            list.forward = Some(parse_score(rest.trim()).ok_or_else(|| invariant(no, format!("bad score {}", rest)))?);
        } else if !line.starts_with('#') {
            let feature = parse_feature(line, &resolve).map_err(|msg| invariant(no, msg))?;
            list.features.push(feature);
        }
    }
    Ok(lists)
}

fn parse_feature<F: Fn(&str) -> Option<usize>>(line: &str, resolve: &F) -> std::result::Result<AlignmentFeature, String> {
    let fields: Vec<_> = line.split_whitespace().collect();
    if fields.len() != 8 {
        return Err(format!("expected 8 fields, found {}", fields.len()));
    }
    let state = resolve(fields[0]).ok_or_else(|| format!("unknown state {}", fields[0]))?;
    let strand = fields[1]
        .chars()
        .next()
        .and_then(Strand::from_char)
        .ok_or_else(|| format!("bad strand {}", fields[1]))?;
    let mut numbers = [0usize; 5];
    for (x, field) in numbers.iter_mut().zip(&fields[2..7]) {
        *x = field.parse().map_err(|_| format!("bad coordinate {}", field))?;
    }
    let score = parse_score(fields[7]).ok_or_else(|| format!("bad score {}", fields[7]))?;
    Ok(AlignmentFeature {
        state,
        name: fields[0].to_string(),
        strand,
        g_start: numbers[0],
        g_end: numbers[1],
        c_start: numbers[2],
        c_end: numbers[3],
        length: numbers[4],
        score,
    })
}

/// Columns per line of the rendered alignment.
pub const BLOCK_WIDTH: usize = 50;
// Columns an intron takes in the rendered alignment.
const INTRON_WIDTH: usize = 10;

// A maximal run of aligned features between two introns.
#[derive(Debug, Clone)]
struct Exon {
    score: Score,
    identity: f64,
    g: (usize, usize),
    c: (usize, usize),
}

/// The est_genome layout: exons, introns and segments, followed by the
/// gapped alignment.
pub fn write_alignment<W: Write>(
    wtr: &mut W,
    hmm: &Hmm,
    features: &[AlignmentFeature],
    genomic: &Dna,
    cdna: &Dna,
) -> std::io::Result<()> {
    let role = |f: &AlignmentFeature| hmm.states[f.state].role;
    let is_overhang = |f: &&AlignmentFeature| {
        matches!(role(f), StateRole::GenomicOverhang | StateRole::CDnaOverhang)
    };
    let body: Vec<&AlignmentFeature> = features
        .iter()
        .skip_while(is_overhang)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .skip_while(is_overhang)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if body.is_empty() {
        return Ok(());
    }
    let (gname, cname) = (genomic.name(), cdna.name());
    let mut exons: Vec<Exon> = vec![];
    let mut current: Option<(Exon, usize, usize)> = None;
    let mut intron: Option<(usize, usize, Score, Strand)> = None;
    let mut introns = vec![];
    for f in body.iter() {
        if role(f) == StateRole::Intron {
            if let Some((exon, matches, columns)) = current.take() {
                exons.push(finish_exon(exon, matches, columns));
            }
            intron = Some(match intron {
                Some((start, _, score, strand)) => (start, f.g_end, score + f.score, strand),
                None => (f.g_start, f.g_end, f.score, f.strand),
            });
            continue;
        }
        if let Some(done) = intron.take() {
            introns.push(done);
        }
        let (matches, columns) = identity(role(f), f, genomic, cdna);
        current = Some(match current.take() {
            Some((mut exon, m, c)) => {
                exon.score += f.score;
                exon.g.1 = f.g_end;
                exon.c.1 = f.c_end;
                (exon, m + matches, c + columns)
            }
            None => (
                Exon {
                    score: f.score,
                    identity: 0f64,
                    g: (f.g_start, f.g_end),
                    c: (f.c_start, f.c_end),
                },
                matches,
                columns,
            ),
        });
    }
    if let Some((exon, matches, columns)) = current.take() {
        exons.push(finish_exon(exon, matches, columns));
    }
    if let Some(done) = intron.take() {
        introns.push(done);
    }
    for (i, exon) in exons.iter().enumerate() {
        writeln!(
            wtr,
            "Exon     {:>8.2} {:>5.1} {:>8} {:>8} {:<12} {:>8} {:>8} {}",
            exon.score, exon.identity, exon.g.0, exon.g.1, gname, exon.c.0, exon.c.1, cname
        )?;
        if let Some((start, end, score, strand)) = introns.get(i) {
            writeln!(
                wtr,
                "{}Intron  {:>8.2} {:>5.1} {:>8} {:>8} {}",
                strand, score, 0.0, start, end, gname
            )?;
        }
    }
    let first = body[0];
    let last = body[body.len() - 1];
    let total: Score = body.iter().map(|f| f.score).sum();
    let (matches, columns) = body
        .iter()
        .filter(|f| role(f) != StateRole::Intron)
        .map(|f| identity(role(f), f, genomic, cdna))
        .fold((0, 0), |(m, c), (x, y)| (m + x, c + y));
    writeln!(
        wtr,
        "\nSpan     {:>8.2} {:>5.1} {:>8} {:>8} {:<12} {:>8} {:>8} {}",
        total,
        percent(matches, columns),
        first.g_start,
        last.g_end,
        gname,
        first.c_start,
        last.c_end,
        cname
    )?;
    for f in body.iter().filter(|f| role(f) == StateRole::Match) {
        let (matches, columns) = identity(StateRole::Match, f, genomic, cdna);
        writeln!(
            wtr,
            "Segment  {:>8.2} {:>5.1} {:>8} {:>8} {:<12} {:>8} {:>8} {}",
            f.score,
            percent(matches, columns),
            f.g_start,
            f.g_end,
            gname,
            f.c_start,
            f.c_end,
            cname
        )?;
    }
    writeln!(wtr)?;
    write_blocks(wtr, hmm, &body, genomic, cdna)
}

fn finish_exon(mut exon: Exon, matches: usize, columns: usize) -> Exon {
    exon.identity = percent(matches, columns);
    exon
}

fn percent(matches: usize, columns: usize) -> f64 {
    if columns == 0 {
        0f64
    } else {
        100f64 * matches as f64 / columns as f64
    }
}

// (identical columns, alignment columns) of a non-intron feature.
fn identity(role: StateRole, f: &AlignmentFeature, genomic: &Dna, cdna: &Dna) -> (usize, usize) {
    match role {
        StateRole::Match => {
            let matches = (f.g_start..=f.g_end)
                .zip(f.c_start..=f.c_end)
                .filter(|&(g, c)| {
                    let x = genomic.get_s5(g as isize);
                    x != padseq::AMBIGUOUS && x == cdna.get_s5(c as isize)
                })
                .count();
            (matches, f.genomic_len())
        }
        _ => (0, f.genomic_len().max(f.cdna_len())),
    }
}

// The three rows of the rendered alignment, with the coordinate of each column.
fn render(
    hmm: &Hmm,
    body: &[&AlignmentFeature],
    genomic: &Dna,
    cdna: &Dna,
) -> (Vec<u8>, Vec<u8>, Vec<u8>, Vec<(usize, usize)>) {
    let (mut top, mut mid, mut bottom, mut pos) = (vec![], vec![], vec![], vec![]);
    let base = |dna: &Dna, i: usize| padseq::to_ascii(dna.get_s5(i as isize));
    let mut in_intron = false;
    for f in body {
        let role = hmm.states[f.state].role;
        if role == StateRole::Intron && in_intron {
            continue;
        }
        in_intron = role == StateRole::Intron;
        match role {
            StateRole::Match => {
                for (g, c) in (f.g_start..=f.g_end).zip(f.c_start..=f.c_end) {
                    let (x, y) = (base(genomic, g), base(cdna, c));
                    top.push(x);
                    mid.push(if x == y && x != b'N' { b'|' } else { b' ' });
                    bottom.push(y);
                    pos.push((g, c));
                }
            }
            StateRole::Intron => {
                let arrow = match f.strand {
                    Strand::Plus => b'>',
                    Strand::Minus => b'<',
                };
                for _ in 0..INTRON_WIDTH {
                    top.push(arrow);
                    mid.push(b' ');
                    bottom.push(b'.');
                    pos.push((f.g_end, f.c_end));
                }
            }
            _ => {
                for g in f.g_start..=f.g_end {
                    top.push(base(genomic, g));
                    mid.push(b' ');
                    bottom.push(b'-');
                    pos.push((g, f.c_end));
                }
                for c in f.c_start..=f.c_end {
                    top.push(b'-');
                    mid.push(b' ');
                    bottom.push(base(cdna, c));
                    pos.push((f.g_end, c));
                }
            }
        }
    }
    (top, mid, bottom, pos)
}

fn write_blocks<W: Write>(
    wtr: &mut W,
    hmm: &Hmm,
    body: &[&AlignmentFeature],
    genomic: &Dna,
    cdna: &Dna,
) -> std::io::Result<()> {
    let (top, mid, bottom, pos) = render(hmm, body, genomic, cdna);
    let width = genomic.name().len().max(cdna.name().len());
    let mut start = (body[0].g_start, body[0].c_start);
    for (i, columns) in pos.chunks(BLOCK_WIDTH).enumerate() {
        let range = i * BLOCK_WIDTH..i * BLOCK_WIDTH + columns.len();
        let end = columns[columns.len() - 1];
        let text = |xs: &[u8]| String::from_utf8_lossy(&xs[range.clone()]).to_string();
        writeln!(wtr, "{:<w$} {:>8} {} {}", genomic.name(), start.0, text(&top), end.0, w = width)?;
        writeln!(wtr, "{:<w$} {:>8} {}", "", "", text(&mid), w = width)?;
        writeln!(wtr, "{:<w$} {:>8} {} {}", cdna.name(), start.1, text(&bottom), end.1, w = width)?;
        writeln!(wtr)?;
        start = (end.0 + 1, end.1 + 1);
    }
    Ok(())
}
