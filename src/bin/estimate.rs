use clap::{App, Arg};
use spliced::estimate::{self, EstimateConfig, Hacks};
use spliced::error::Result;
use std::io::Write;
use std::path::Path;
#[macro_use]
extern crate log;

const HACKS: [(&str, &str); 7] = [
    ("hinit", "Fixed initial probabilities for the overhangs and Match."),
    ("hoverhang", "Fixed transitions around the unaligned ends."),
    ("hpolya", "Keep poly-A tails in the 3' cDNA overhang."),
    ("hintron_length", "Share the intron length between U2 and U12."),
    ("hsplice_exit", "U12 acceptors leave like U2 acceptors."),
    ("hsplice_entry", "Enter U12 donors 0.1/99.9 as often as U2 donors."),
    ("hunify_models", "Overhangs take the background durations."),
];

fn app() -> App<'static, 'static> {
    let app = App::new("estimate")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Estimate pair HMM parameters from feature lists of the decoder (-i).")
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Debug mode"),
        )
        .arg(
            Arg::with_name("feature_lists")
                .required(true)
                .value_name("LIST")
                .help("List of decoder outputs, one path per line."),
        )
        .arg(
            Arg::with_name("cdna")
                .long("cdna")
                .takes_value(true)
                .required(true)
                .value_name("LIST")
                .help("List of cDNA FASTA files, one path per line."),
        )
        .arg(
            Arg::with_name("genomic")
                .long("genomic")
                .takes_value(true)
                .required(true)
                .value_name("LIST")
                .help("List of genomic FASTA files, one path per line."),
        )
        .arg(
            Arg::with_name("hack_usual")
                .long("hack_usual")
                .help("Every hack but --hsplice_entry."),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .short("t")
                .takes_value(true)
                .default_value("1")
                .help("Number of threads"),
        );
    HACKS.iter().fold(app, |app, &(name, help)| {
        app.arg(Arg::with_name(name).long(name).help(help))
    })
}

fn hacks(matches: &clap::ArgMatches) -> Hacks {
    let mut hacks = if matches.is_present("hack_usual") {
        Hacks::usual()
    } else {
        Hacks::default()
    };
    hacks.init |= matches.is_present("hinit");
    hacks.overhang |= matches.is_present("hoverhang");
    hacks.polya |= matches.is_present("hpolya");
    hacks.intron_length |= matches.is_present("hintron_length");
    hacks.splice_exit |= matches.is_present("hsplice_exit");
    hacks.splice_entry |= matches.is_present("hsplice_entry");
    hacks.unify_models |= matches.is_present("hunify_models");
    hacks
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let path = |name: &str| Path::new(matches.value_of(name).unwrap_or_default());
    let sets = estimate::read_training_sets(path("cdna"), path("genomic"), path("feature_lists"))?;
    let config = EstimateConfig::new(hacks(matches));
    debug!("{:?}", config);
    let hmm = estimate::estimate(&sets, &config)?;
    let stdout = std::io::stdout();
    let mut wtr = std::io::BufWriter::new(stdout.lock());
    write!(wtr, "{}", hmm)?;
    wtr.flush()?;
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
    let threads: usize = matches
        .value_of("threads")
        .and_then(|x| x.parse().ok())
        .unwrap_or(1);
    if let Err(why) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        debug!("{:?}", why);
    }
    if let Err(why) = run(&matches) {
        eprintln!("{}", why);
        std::process::exit(1);
    }
}
