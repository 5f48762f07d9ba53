use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use kmer_seed::align::{self, LinearCost, SearchOpt};
use kmer_seed::index::{self, AmbiguityPolicy, IndexMeta, IndexOpt, IndexParams, KmerIndex};
use kmer_seed::io::Reference;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "kmer-seed", author, version, about = "K-mer inverted index and seed scoring", arg_required_else_help = true)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a k-mer index of the reference
    Index {
        /// Reference FASTA file
        reference: PathBuf,
        /// k-mer length
        #[arg(short = 'k', long = "kmer-length", default_value_t = 30)]
        k: usize,
        /// Minimizer width; index only minimizers of each k-mer
        #[arg(short = 'w', long = "minimizer-width")]
        minimizer_width: Option<usize>,
        /// Index canonical (strand-independent) k-mers
        #[arg(long)]
        canonical: bool,
        /// Index k-mers containing ambiguous bases instead of skipping them
        #[arg(long = "keep-ambiguous")]
        keep_ambiguous: bool,
        /// Output index path (default: reference base name with .kidx)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short = 't', long = "threads", default_value_t = 1)]
        threads: usize,
        /// Log progress every N k-mers per contig (0 disables)
        #[arg(long = "progress-every", default_value_t = 1_000_000)]
        progress_every: usize,
    },
    /// Look up the positions of a k-mer in one contig
    Query {
        #[arg(short = 'i', long = "index")]
        index: PathBuf,
        #[arg(short = 'c', long = "contig")]
        contig: String,
        kmer: String,
    },
    /// Seed a query sequence against the index and score candidate windows
    Search {
        #[arg(short = 'i', long = "index")]
        index: PathBuf,
        /// Reference FASTA the index was built from
        #[arg(short = 'r', long = "reference")]
        reference: PathBuf,
        /// Query sequence
        query: String,
        #[arg(long = "max-mismatches", default_value_t = 2)]
        max_mismatches: usize,
        /// Also keep candidates whose global alignment cost is at most this
        #[arg(long = "max-cost")]
        max_cost: Option<u64>,
        #[arg(long = "mismatch", default_value_t = 1)]
        mismatch_cost: u32,
        #[arg(long = "gap", default_value_t = 1)]
        gap_cost: u32,
        #[arg(long = "stride", default_value_t = 1)]
        stride: usize,
        /// Search the forward strand only
        #[arg(long = "forward-only")]
        forward_only: bool,
        #[arg(short = 't', long = "threads", default_value_t = 1)]
        threads: usize,
    },
    /// Score two sequences (Hamming distance and global alignment)
    Score {
        a: String,
        b: String,
        #[arg(long = "mismatch", default_value_t = 1)]
        mismatch_cost: u32,
        #[arg(long = "gap", default_value_t = 1)]
        gap_cost: u32,
        #[arg(long = "max-mismatches")]
        max_mismatches: Option<usize>,
    },
    /// Print index parameters and per-contig statistics
    Stats {
        #[arg(short = 'i', long = "index")]
        index: PathBuf,
    },
}

fn setup_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Index {
            reference,
            k,
            minimizer_width,
            canonical,
            keep_ambiguous,
            output,
            threads,
            progress_every,
        } => {
            let ambiguity = if keep_ambiguous { AmbiguityPolicy::Keep } else { AmbiguityPolicy::Skip };
            let params = IndexParams::new(k)
                .with_minimizer_width(minimizer_width)
                .with_canonical(canonical)
                .with_ambiguity(ambiguity);
            let mut opt = IndexOpt::new(params);
            opt.threads = threads;
            opt.progress_every = progress_every;
            run_index(&reference, output, opt)
        }
        Commands::Query { index, contig, kmer } => run_query(&index, &contig, &kmer),
        Commands::Search {
            index,
            reference,
            query,
            max_mismatches,
            max_cost,
            mismatch_cost,
            gap_cost,
            stride,
            forward_only,
            threads,
        } => {
            let opt = SearchOpt {
                max_mismatches,
                max_cost,
                cost: LinearCost::new(mismatch_cost, gap_cost),
                stride,
                both_strands: !forward_only,
            };
            run_search(&index, &reference, &query, opt, threads)
        }
        Commands::Score { a, b, mismatch_cost, gap_cost, max_mismatches } => {
            run_score(&a, &b, LinearCost::new(mismatch_cost, gap_cost), max_mismatches)
        }
        Commands::Stats { index } => run_stats(&index),
    }
}

fn load_index(path: &Path) -> Result<KmerIndex> {
    KmerIndex::load_from_file(path).with_context(|| format!("cannot load index '{}'", path.display()))
}

fn run_index(reference: &Path, output: Option<PathBuf>, opt: IndexOpt) -> Result<()> {
    let refseq = Reference::from_path(reference)
        .with_context(|| format!("cannot read reference FASTA '{}'", reference.display()))?;
    if refseq.is_empty() {
        bail!("FASTA file '{}' contains no sequences", reference.display());
    }
    if refseq.total_len() == 0 {
        bail!("FASTA file '{}' contains only empty sequences", reference.display());
    }
    info!("reference: {} ({} sequences, {} bp)", reference.display(), refseq.len(), refseq.total_len());

    let mut idx = KmerIndex::new(opt.params.clone())?;
    idx.build(&refseq, &opt)?;
    idx.set_meta(IndexMeta {
        reference_file: Some(reference.display().to_string()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
    });

    let out_path = output.unwrap_or_else(|| index::artifact_path(reference));
    idx.save_to_file(&out_path)
        .with_context(|| format!("cannot write index to '{}'", out_path.display()))?;
    println!("index saved: {}", out_path.display());
    Ok(())
}

fn run_query(index_path: &Path, contig: &str, kmer: &str) -> Result<()> {
    let idx = load_index(index_path)?;
    let positions = idx.query(contig, kmer.as_bytes())?;
    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    for p in positions {
        writeln!(out, "{}", p)?;
    }
    Ok(())
}

fn run_search(index_path: &Path, reference: &Path, query: &str, opt: SearchOpt, threads: usize) -> Result<()> {
    let idx = load_index(index_path)?;
    let refseq = Reference::from_path(reference)
        .with_context(|| format!("cannot read reference FASTA '{}'", reference.display()))?;
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let hits = pool.install(|| align::search(&idx, &refseq, query.as_bytes(), &opt))?;
    info!("{} candidate(s) passed scoring", hits.len());

    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    writeln!(out, "#contig\tstart\tend\tstrand\tseeds\tmismatches\tcost\tcigar")?;
    for h in &hits {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            h.contig,
            h.start,
            h.end,
            h.strand.symbol(),
            h.seeds,
            h.mismatches,
            h.cost,
            h.cigar
        )?;
    }
    Ok(())
}

fn run_score(a: &str, b: &str, cost: LinearCost, max_mismatches: Option<usize>) -> Result<()> {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() == b.len() {
        let max = max_mismatches.unwrap_or(a.len());
        println!("hamming\t{}", align::hamming_distance(a, b, max)?);
    }
    let aln = align::global_align_path(a, b, &cost);
    println!("global_cost\t{}", aln.cost);
    println!("cigar\t{}", aln.cigar);
    Ok(())
}

fn run_stats(index_path: &Path) -> Result<()> {
    let idx = load_index(index_path)?;
    let p = idx.params();
    println!("k\t{}", p.k);
    match p.minimizer_width {
        Some(w) => println!("minimizer_width\t{}", w),
        None => println!("minimizer_width\t-"),
    }
    println!("canonical\t{}", p.canonical);
    println!("ambiguity\t{:?}", p.ambiguity);
    println!("source\t{}", idx.source_descriptor());
    let meta = idx.meta();
    if let Some(ts) = &meta.build_timestamp {
        println!("built\t{}", ts);
    }
    for c in idx.contigs() {
        println!("contig\t{}\t{}\t{}\t{}", c.name, c.len, c.num_keys(), c.num_positions());
    }
    let s = idx.stats();
    println!("total\t{}\t{}\t{}", s.contigs, s.keys, s.positions);
    Ok(())
}
