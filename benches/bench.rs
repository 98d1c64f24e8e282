use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use spliced::padseq::Dna;
use spliced::seed::Band;
const SEED: u64 = 1293890;
const MODEL: &str = include_str!("../testdata/test.zhmm");

fn time<F: FnMut()>(name: &str, repeat: usize, mut f: F) {
    let start = std::time::Instant::now();
    for _ in 0..repeat {
        f();
    }
    let elapsed = start.elapsed().as_secs_f64() / repeat as f64;
    println!("{}\t{:.4}s/iter", name, elapsed);
}

fn main() {
    let hmm = spliced::model::parser::parse_hmm("test.zhmm", MODEL, true).unwrap();
    let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(SEED);
    let gene = spliced::gen_seq::generate_gene(&mut rng, &[150, 200, 150], &[300, 400]);
    let prof = &spliced::gen_seq::EST_PROFILE;
    let read = spliced::gen_seq::introduce_randomness(&gene.cdna, &mut rng, prof);
    let genomic = Dna::new("genomic", gene.genomic);
    let cdna = Dna::new("cdna", read);
    let band = Band::full(0, genomic.len(), cdna.len());
    time("viterbi", 3, || {
        spliced::viterbi::decode(&hmm, &genomic, &cdna, band.clone(), false);
    });
    time("viterbi+forward", 3, || {
        spliced::viterbi::decode(&hmm, &genomic, &cdna, band.clone(), true);
    });
    let hmm = spliced::model::parser::parse_hmm("test.zhmm", MODEL, true).unwrap();
    let models = spliced::StrandedModels::new(hmm);
    let config = spliced::AlignConfig::default();
    time("align both strands", 1, || {
        spliced::align::align_cdna(&models, &config, &genomic, &cdna, None).unwrap();
    });
}
