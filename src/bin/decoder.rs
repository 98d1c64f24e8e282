use chrono::{DateTime, Local, TimeZone};
use clap::{App, Arg};
use spliced::align::{self, AlignConfig, AlignmentMode, SpliceMode, StrandedModels};
use spliced::error::{PairError, Result};
use spliced::fasta::{self, FastaReader};
use spliced::feature;
use std::io::Write;
#[macro_use]
extern crate log;

fn app() -> App<'static, 'static> {
    App::new("decoder")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Spliced alignment of cDNAs against a genomic sequence by a pair HMM.")
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Debug mode"),
        )
        .arg(
            Arg::with_name("alignment_mode")
                .long("alignment_mode")
                .takes_value(true)
                .default_value("both")
                .possible_values(&["forward", "reverse", "both"])
                .help("Strands of the cDNA to align."),
        )
        .arg(
            Arg::with_name("splice_mode")
                .long("splice_mode")
                .takes_value(true)
                .default_value("cdna")
                .possible_values(&["forward", "reverse", "both", "cdna"])
                .help("Strands of the gene to try. `cdna` follows the strand of the cDNA."),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .value_name("SEED")
                .takes_value(true)
                .help("Seed alignments, one per cDNA."),
        )
        .arg(
            Arg::with_name("feature_list")
                .short("i")
                .help("Print the state features instead of the gapped alignment."),
        )
        .arg(
            Arg::with_name("nonull")
                .long("nonull")
                .help("Do not divide emissions by the null models."),
        )
        .arg(
            Arg::with_name("optimized")
                .short("o")
                .help("Skip the Forward pass."),
        )
        .arg(
            Arg::with_name("hmm")
                .required(true)
                .value_name("HMM")
                .help("Parameter file."),
        )
        .arg(
            Arg::with_name("cdna")
                .required(true)
                .value_name("CDNA")
                .help("cDNA sequences. FASTA format."),
        )
        .arg(
            Arg::with_name("genomic")
                .required(true)
                .value_name("GENOMIC")
                .help("A genomic sequence. FASTA format."),
        )
}

// The layout of ctime(3), without the trailing newline.
fn ctime<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format("%a %b %e %H:%M:%S %Y").to_string()
}

fn decode(matches: &clap::ArgMatches) -> Result<()> {
    let alignment_mode: AlignmentMode = matches
        .value_of("alignment_mode")
        .unwrap_or("both")
        .parse()
        .map_err(PairError::Invariant)?;
    let splice_mode: SpliceMode = matches
        .value_of("splice_mode")
        .unwrap_or("cdna")
        .parse()
        .map_err(PairError::Invariant)?;
    let mut config = AlignConfig::new(alignment_mode, splice_mode);
    config.feature_list = matches.is_present("feature_list");
    config.optimized = matches.is_present("optimized");
    config.use_null = !matches.is_present("nonull");
    let (hmm, cdna, genomic) = match (
        matches.value_of("hmm"),
        matches.value_of("cdna"),
        matches.value_of("genomic"),
    ) {
        (Some(hmm), Some(cdna), Some(genomic)) => (hmm, cdna, genomic),
        _ => unreachable!(),
    };
    let model = spliced::model::parser::read_hmm(hmm, config.use_null)?;
    debug!("Loaded {} with {} states", model.name, model.num_states());
    let models = StrandedModels::new(model);
    let genomic = fasta::read_single(genomic)?;
    let seeds = match matches.value_of("seed") {
        Some(path) => Some(spliced::seed::read_seeds(path)?),
        None => None,
    };
    let cdnas = FastaReader::open(cdna)?;
    let command_line: Vec<_> = std::env::args().collect();
    let stdout = std::io::stdout();
    let mut wtr = std::io::BufWriter::new(stdout.lock());
    feature::write_global_header(&mut wtr, &command_line.join(" "), &ctime(&Local::now()), hmm)?;
    let count = align::run(&mut wtr, &models, &config, &genomic, cdnas, seeds.as_deref())?;
    wtr.flush()?;
    info!("Aligned {} cDNAs", count);
    Ok(())
}

fn main() {
    let matches = app().get_matches();
    let level = match matches.occurrences_of("verbose") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    debug!("Start");
    if let Err(why) = decode(&matches) {
        eprintln!("{}", why);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    #[test]
    fn dates() {
        let date = |secs| ctime(&Utc.timestamp_opt(secs, 0).unwrap());
        assert_eq!(date(0), "Thu Jan  1 00:00:00 1970");
        assert_eq!(date(951_782_400), "Tue Feb 29 00:00:00 2000");
        assert_eq!(date(1_700_000_000), "Tue Nov 14 22:13:20 2023");
    }
    #[test]
    fn arguments() {
        let matches = app()
            .get_matches_from_safe(vec!["decoder", "-i", "--splice_mode=both", "a.zhmm", "c.fa", "g.fa"])
            .unwrap();
        assert!(matches.is_present("feature_list"));
        assert_eq!(matches.value_of("splice_mode"), Some("both"));
        assert_eq!(matches.value_of("alignment_mode"), Some("both"));
        assert!(app()
            .get_matches_from_safe(vec!["decoder", "--alignment_mode=sideways", "a", "b", "c"])
            .is_err());
    }
}
