use hdp_lda::corpus::read_corpus;
use hdp_lda::{HdpLda, HdpOptions, Vocabulary};

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use log::info;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};

/// Hierarchical Dirichlet process topic model (HDP-LDA)
#[derive(Parser, Debug)]
#[command(
    version,
    about = "HDP-LDA",
    long_about = "Hierarchical Dirichlet process topic model by collapsed Gibbs sampling\n\
		  on the Chinese restaurant franchise. The number of topics is inferred.\n\
		  The corpus has one document per line (plain or `.gz`).\n\
		  Concentrations not given are drawn once from Gamma(1, 1)."
)]
struct Cli {
    #[arg(short = 'f', long = "file", help = "corpus file, one document per line")]
    file: Box<str>,

    #[arg(long, help = "document-level concentration (new tables)")]
    alpha: Option<f64>,

    #[arg(long, help = "franchise-level concentration (new topics)")]
    gamma: Option<f64>,

    #[arg(long, default_value_t = 0.5, help = "Dirichlet pseudocount of the base measure")]
    base: f64,

    #[arg(short = 'i', long = "iter", default_value_t = 10, help = "number of Gibbs sweeps")]
    num_iter: usize,

    #[arg(long, default_value_t = 42, help = "random seed")]
    seed: u64,

    #[arg(long, default_value_t = false, help = "keep stopwords")]
    keep_stopwords: bool,

    #[arg(long, default_value_t = 20, help = "number of terms reported per topic")]
    top: usize,

    #[arg(long, default_value_t = false, help = "verify all count caches after every sweep")]
    check: bool,

    #[arg(long, help = "write the final seating arrangement (json)")]
    save_state: Option<Box<str>>,

    #[arg(short = 'v', long, default_value_t = false, help = "verbose logging")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let corpus = read_corpus(&cli.file)?;
    if corpus.is_empty() {
        bail!("no documents in {}", cli.file);
    }

    let mut voca = Vocabulary::new(!cli.keep_stopwords);
    let docs: Vec<Vec<usize>> = corpus.iter().map(|d| voca.doc_to_ids(d)).collect();
    info!("read {} documents from {}", docs.len(), cli.file);

    // concentrations are fixed for the whole run
    let mut rng = SmallRng::seed_from_u64(cli.seed);
    let prior = Gamma::new(1.0, 1.0).map_err(|e| anyhow!("gamma prior: {}", e))?;
    let alpha = cli.alpha.unwrap_or_else(|| prior.sample(&mut rng));
    let gamma = cli.gamma.unwrap_or_else(|| prior.sample(&mut rng));

    let options = HdpOptions {
        alpha,
        gamma,
        base: cli.base,
        num_iter: cli.num_iter,
        seed: cli.seed,
        show_progress: !cli.verbose,
        check_invariants: cli.check,
    };

    let mut model = HdpLda::new(docs, voca.size(), options)?;

    println!(
        "corpus={} words={} alpha={:.6} gamma={:.6} base={:.6}",
        corpus.len(),
        voca.size(),
        alpha,
        gamma,
        cli.base
    );

    model.run()?;

    for (rank, dist) in model.worddist().iter().enumerate() {
        println!("\n-- topic: {} (id {})", rank, dist.topic);
        for (v, p) in dist.top_words(cli.top) {
            println!("{}: {:.6}", voca.term(v).unwrap_or("?"), p);
        }
    }

    if let Some(path) = cli.save_state.as_deref() {
        model.save_state(path)?;
    }

    Ok(())
}
