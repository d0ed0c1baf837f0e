use clap::{value_parser, Arg, Command, ValueHint};
use demodifier_cli::input::Input;
use demodifier_cli::runner::Runner;

fn main() -> anyhow::Result<()> {
    let matches = Command::new("demodifier")
        .version(clap::crate_version!())
        .about(
            "Screen peptide identifications for modification-induced alternate taxonomy \
             (deamidation, reamidation, pyro-Glu)",
        )
        .arg(
            Arg::new("input")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to identified peptides: CSV (incl. Mascot exports with a preamble) \
                     or tab-separated MaxQuant `.txt`",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("parameters")
                .short('p')
                .long("parameters")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where results will be written. Overrides the directory \
                     specified in the configuration file (default = next to the input)",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of rows to process in parallel (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("url")
                .long("url")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Unipept pept2lca endpoint")
                .value_hint(ValueHint::Url),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::SetTrue)
                .help("Log every row and Unipept request"),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let verbose = matches.get_one::<bool>("verbose").copied().unwrap_or(false);
    let default_filter = match verbose {
        true => "error,demodifier=debug,demodifier_core=debug,demodifier_cli=debug",
        false => "error,demodifier=info,demodifier_core=info,demodifier_cli=info",
    };
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("DEMODIFIER_LOG", default_filter))
        .init();

    let input = Input::from_arguments(matches)?;

    let runner = input.build().and_then(Runner::new)?;
    runner.run()
}
