//! Random sequences and genes, to test and benchmark the aligner.
//! Usually, it would not be used in the real-applications.
use rand::seq::SliceRandom;

/// Error rates of a simulated transcript read.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub sub: f64,
    pub del: f64,
    pub ins: f64,
}

impl Profile {
    pub fn sum(&self) -> f64 {
        self.sub + self.del + self.ins
    }
    pub fn mul(&self, x: f64) -> Self {
        Self {
            sub: self.sub * x,
            ins: self.ins * x,
            del: self.del * x,
        }
    }
}

/// Roughly the error rates of single pass EST reads.
pub const EST_PROFILE: Profile = Profile {
    sub: 0.01,
    del: 0.005,
    ins: 0.005,
};

/// The first and the last bases of a simulated intron.
pub const DONOR: &[u8] = b"GTAAGT";
pub const ACCEPTOR: &[u8] = b"TTTCAG";

#[derive(Debug, Clone, Copy)]
enum Op {
    Match,
    MisMatch,
    Del,
    In,
}

impl Op {
    fn weight(self, p: &Profile) -> f64 {
        match self {
            Op::Match => 1. - p.sum(),
            Op::MisMatch => p.sub,
            Op::Del => p.del,
            Op::In => p.ins,
        }
    }
}

const OPERATIONS: [Op; 4] = [Op::Match, Op::MisMatch, Op::Del, Op::In];

/// Copy `seq` with random substitutions, deletions and insertions.
pub fn introduce_randomness<T: rand::Rng>(seq: &[u8], rng: &mut T, p: &Profile) -> Vec<u8> {
    let mut res = vec![];
    let mut remainings: Vec<_> = seq.iter().copied().rev().collect();
    while let Some(&base) = remainings.last() {
        match *OPERATIONS.choose_weighted(rng, |e| e.weight(p)).unwrap() {
            Op::Match => res.push(base),
            Op::MisMatch => res.push(choose_base(rng, base)),
            Op::In => {
                res.push(random_base(rng));
                continue;
            }
            Op::Del => {}
        }
        remainings.pop();
    }
    res
}

pub fn generate_seq<T: rand::Rng>(rng: &mut T, len: usize) -> Vec<u8> {
    let bases = b"ACTG";
    (0..len)
        .filter_map(|_| bases.choose(rng))
        .copied()
        .collect()
}

fn choose_base<T: rand::Rng>(rng: &mut T, base: u8) -> u8 {
    let bases: Vec<u8> = b"ATCG".iter().filter(|&&e| e != base).copied().collect();
    *bases.choose(rng).unwrap()
}

fn random_base<T: rand::Rng>(rng: &mut T) -> u8 {
    *b"ATGC".choose(rng).unwrap()
}

/// A simulated gene and its spliced transcript.
#[derive(Debug, Clone)]
pub struct Gene {
    pub genomic: Vec<u8>,
    pub cdna: Vec<u8>,
    /// 1-based inclusive genomic coordinates of each exon.
    pub exons: Vec<(usize, usize)>,
}

/// A gene with the given exon and intron lengths. Each intron starts with
/// [`DONOR`] and ends with [`ACCEPTOR`]; introns must be at least 12 bases.
pub fn generate_gene<T: rand::Rng>(rng: &mut T, exons: &[usize], introns: &[usize]) -> Gene {
    assert_eq!(exons.len(), introns.len() + 1);
    let mut genomic = vec![];
    let mut cdna = vec![];
    let mut coordinates = vec![];
    for (i, &len) in exons.iter().enumerate() {
        let exon = generate_seq(rng, len);
        coordinates.push((genomic.len() + 1, genomic.len() + len));
        genomic.extend_from_slice(&exon);
        cdna.extend_from_slice(&exon);
        if let Some(&intron) = introns.get(i) {
            assert!(intron >= DONOR.len() + ACCEPTOR.len());
            genomic.extend_from_slice(DONOR);
            genomic.extend(generate_seq(rng, intron - DONOR.len() - ACCEPTOR.len()));
            genomic.extend_from_slice(ACCEPTOR);
        }
    }
    Gene {
        genomic,
        cdna,
        exons: coordinates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    #[test]
    fn gene() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(32);
        let gene = generate_gene(&mut rng, &[30, 40, 20], &[50, 60]);
        assert_eq!(gene.genomic.len(), 200);
        assert_eq!(gene.cdna.len(), 90);
        assert_eq!(gene.exons, vec![(1, 30), (81, 120), (181, 200)]);
        assert_eq!(&gene.genomic[30..36], DONOR);
        assert_eq!(&gene.genomic[74..80], ACCEPTOR);
        assert_eq!(&gene.genomic[80..120], &gene.cdna[30..70]);
    }
    #[test]
    fn randomness() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(8);
        let seq = generate_seq(&mut rng, 1000);
        let same = introduce_randomness(&seq, &mut rng, &EST_PROFILE.mul(0.));
        assert_eq!(seq, same);
        let noisy = introduce_randomness(&seq, &mut rng, &EST_PROFILE.mul(5.));
        assert_ne!(seq, noisy);
    }
}
