//! Some of the fields on `Opt` require careful handling currently managed
//! through getters. In order to restrict direct access to those
//! getter-accessed fields, we tuck it away in this module.
use std::path::PathBuf;
use structopt::StructOpt;

/// Something about the macros used by `structopt` mean the return from
/// `from_args()` is <unknown> in code editors without a type ascription or some
/// other
/// hint. This function provides such a hint.
pub fn parse_args() -> Opt {
    Opt::from_args()
}

#[derive(StructOpt, Debug)]
pub enum Command {
    /// Onboard a new package from a git repository.
    Add {
        #[structopt(long)]
        url: String,
        #[structopt(long)]
        owner: String,
    },
    /// Remove a package (ownership-checked).
    Remove {
        name: String,
        #[structopt(long)]
        owner: String,
    },
    /// Print a package's info view.
    Info {
        name: String,
        #[structopt(long, help = "Include the most recent reconciliation errors.")]
        with_errors: bool,
    },
    /// Search packages by keyword substring.
    Search { keywords: String },
    /// Replace a package's category list.
    Categories { name: String, categories: Vec<String> },
    /// Enqueue a single package for reconciliation.
    Update { name: String },
    /// Enqueue every known package for reconciliation.
    Sweep,
}

#[derive(StructOpt)]
pub struct Opt {
    #[structopt(
        long,
        parse(from_os_str),
        env = "MOORAGE_DB_PATH",
        default_value = "moorage.db",
        help = "Path to the sqlite catalog database."
    )]
    pub db_path: PathBuf,

    #[structopt(
        long,
        env = "MOORAGE_DOWNLOAD_URL",
        help = "The url template used when computing a version's downloadUrl. \
        Must contain a `{ref}` placeholder."
    )]
    download_url: Option<String>,

    #[structopt(
        long,
        default_value = "1800",
        env = "MOORAGE_POLL_INTERVAL_SECS",
        help = "Interval, in seconds, between automatic sweeps of the catalog."
    )]
    pub poll_interval_secs: u64,

    #[structopt(subcommand)]
    pub command: Command,
}

impl Opt {
    /// Returns the value of the `download_url` field verbatim when set.
    ///
    /// When left unset, falls back to a template that serves the ref
    /// verbatim as a path segment.
    pub fn download_url(&self) -> String {
        self.download_url
            .clone()
            .unwrap_or_else(|| "https://example.com/dl/{ref}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_default() {
        let opt = Opt {
            db_path: Default::default(),
            download_url: None,
            poll_interval_secs: 1800,
            command: Command::Sweep,
        };

        assert_eq!("https://example.com/dl/{ref}", opt.download_url());
    }

    #[test]
    fn test_download_url_explicit() {
        let opt = Opt {
            db_path: Default::default(),
            download_url: Some("https://dl.example.org/{ref}.tar.gz".to_string()),
            poll_interval_secs: 1800,
            command: Command::Sweep,
        };

        assert_eq!(
            "https://dl.example.org/{ref}.tar.gz",
            opt.download_url()
        );
    }
}
