//! Application related stuff

use clap::Parser;

lazy_static! {
    /// The global application options.
    pub static ref OPTIONS: Options = Options::parse();
}

/// System wide options.
#[derive(Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Options {
    /// Number of threads to use for photon emission.
    #[clap(
        long = "nthreads",
        short = 't',
        value_name = "NUM",
        default_value_t = 0,
        help = "Use specified number of threads for photon emission (0 = all logical CPUs)."
    )]
    n_threads: usize,

    /// Total photon budget to apportion among the lights.
    #[clap(
        long = "photons",
        short = 'p',
        value_name = "NUM",
        default_value_t = 100_000,
        help = "Total photon budget to apportion among the lights."
    )]
    pub photons: usize,

    /// Base seed for the per-light sample sequences.
    #[clap(
        long = "seed",
        short = 's',
        value_name = "NUM",
        default_value_t = 0,
        help = "Base seed for the per-light sample sequences."
    )]
    pub seed: u64,

    /// Jitter photon origins within each light's radius.
    #[clap(
        long = "penumbra",
        help = "Jitter photon origins within each light's radius for soft shadows."
    )]
    pub penumbra: bool,

    /// Suppress all text output other than error messages.
    #[clap(long, help = "Suppress all text output other than error messages.")]
    pub quiet: bool,
}

impl Options {
    /// Returns the number of threads to use.
    pub fn threads(&self) -> usize {
        let max_threads = num_cpus::get();
        match self.n_threads {
            0 => max_threads,
            n if n > max_threads => {
                warn!("Num threads > max logical CPUs {}", max_threads);
                max_threads
            }
            n => n,
        }
    }
}
