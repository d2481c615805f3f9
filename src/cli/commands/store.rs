use clap::{Arg, ArgMatches, Command};

/// Persistence options extracted from the command line.
pub struct Options {
    pub data_dir: String,
}

impl Options {
    #[must_use]
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let data_dir = matches
            .get_one::<String>("data-dir")
            .cloned()
            .unwrap_or_else(|| "./data".to_string());
        Self { data_dir }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new("data-dir")
            .long("data-dir")
            .help("Directory holding the registry and pending-challenge documents")
            .default_value("./data")
            .env("PORDISTO_DATA_DIR"),
    )
}
