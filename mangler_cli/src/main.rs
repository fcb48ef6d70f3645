use mangler_core::{
    Clock, Corpus, CoverageTiming, Dictionary, FuzzInput, InMemoryCorpus, Mangler, MutateConfig,
    SystemClock,
};

use clap::Parser;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Seed files or directories providing base inputs and splice material
    #[clap(short, long)]
    seed: Vec<PathBuf>,
    /// Directory mutated variants are written to, named by content hash
    #[clap(short, long)]
    out_dir: Option<PathBuf>,
    /// Number of mutated variants to produce
    #[clap(short = 'n', long, default_value_t = 1000)]
    count: u64,
    /// TOML file with mutation settings
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    #[clap(long)]
    max_input_size: Option<usize>,
    #[clap(long)]
    mutations_per_run: Option<u64>,
    #[clap(long)]
    only_printable: bool,
    /// Dictionary file: one double-quoted entry per line, # comments
    #[clap(long)]
    dictionary: Option<PathBuf>,
    #[clap(long, default_value_t = 0)]
    rng_seed: u64,
    /// Pretend the target ran this slowly; higher means more mutations
    #[clap(long, default_value_t = 0)]
    slow_factor: u8,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let mut config = match &cli.config_file {
        Some(config_path) => {
            println!("Loading configuration from specified path: {config_path:?}");
            MutateConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("config.toml");
            if default_config_path.exists() {
                println!(
                    "No config file specified via CLI, loading default: {default_config_path:?}",
                );
                MutateConfig::load_from_file(&default_config_path)?
            } else {
                MutateConfig::default()
            }
        }
    };

    if let Some(max_input_size) = cli.max_input_size {
        config.max_input_size = max_input_size;
    }
    if let Some(mutations_per_run) = cli.mutations_per_run {
        config.mutations_per_run = mutations_per_run;
    }
    if cli.only_printable {
        config.only_printable = true;
    }
    config.validate()?;

    println!("Effective configuration: {config:#?}");

    let mut corpus = InMemoryCorpus::new();
    for path in &cli.seed {
        if path.is_file() {
            corpus.add(std::fs::read(path)?);
        } else if path.is_dir() {
            for entry in std::fs::read_dir(path)? {
                let file_path = entry?.path();
                if file_path.is_file() {
                    corpus.add(std::fs::read(&file_path)?);
                }
            }
        } else {
            eprintln!("Warning: seed path {path:?} does not exist, skipping.");
        }
    }
    println!("Loaded {} seed input(s).", corpus.len());

    let dictionary = match &cli.dictionary {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read dictionary {:?}: {}", path, e))?;
            let dict = Dictionary::parse(&text)
                .map_err(|e| anyhow::anyhow!("Failed to parse dictionary {:?}: {}", path, e))?;
            println!("Loaded {} dictionary entrie(s).", dict.len());
            dict
        }
        None => Dictionary::new(),
    };

    if let Some(out_dir) = &cli.out_dir {
        std::fs::create_dir_all(out_dir)?;
    }

    let clock = SystemClock;
    let timing = CoverageTiming::new(clock.now_millis());
    let mangler = Mangler::new(&config, &dictionary, &corpus, &timing);
    let mut rng = ChaCha8Rng::seed_from_u64(cli.rng_seed);

    println!("Producing {} mutated variant(s)...", cli.count);
    let start_time = Instant::now();
    let mut written = 0u64;
    let mut total_bytes = 0u64;

    for i in 0..cli.count {
        let mut input = match corpus.random_input(&mut rng) {
            Some(base) => FuzzInput::from_bytes(base, config.max_input_size),
            None => FuzzInput::new(config.max_input_size),
        };

        mangler.mangle(&mut input, &mut rng, cli.slow_factor);
        total_bytes += input.size() as u64;

        if let Some(out_dir) = &cli.out_dir {
            let name = format!("{:x}.bin", md5::compute(input.bytes()));
            std::fs::write(out_dir.join(name), input.bytes())?;
            written += 1;
        }

        if i > 0 && i % (cli.count / 100).max(1) == 0 {
            let elapsed = start_time.elapsed().as_secs_f32();
            let per_sec = if elapsed > 0.0 {
                (i + 1) as f32 / elapsed
            } else {
                0.0
            };
            print!(
                "\rIter: {}/{}, Avg size: {}, Variants/sec: {per_sec:.2}   ",
                i + 1,
                cli.count,
                total_bytes / (i + 1),
            );
            use std::io::Write;
            std::io::stdout().flush()?;
        }
    }

    let elapsed_total = start_time.elapsed();
    println!("\nFinished in {elapsed_total:.2?}.");
    println!(
        "Variants produced: {}, written to disk: {written}, average size: {} bytes",
        cli.count,
        total_bytes / cli.count.max(1),
    );

    Ok(())
}
