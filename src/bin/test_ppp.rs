//! Test toolkit for ppp
//!
//! Usage:
//!   test_ppp random-actions [OPTIONS]
//!   test_ppp --help

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ppp::action_generator::{check_invariants, snapshot, ActionExecutor, ActionGenerator};
use ppp::manager::{HybridManager, PPP_DIR};
use rand::RngCore;
use std::time::{Duration, Instant};

/// Verbosity level for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Normal,
    Verbose,
}

/// Logger that buffers output and can dump on failure
struct Logger {
    buffer: Vec<String>,
    verbosity: LogLevel,
    buffering: bool,
}

impl Logger {
    fn new(verbosity: LogLevel, buffering: bool) -> Self {
        Self {
            buffer: Vec::new(),
            verbosity,
            buffering,
        }
    }

    fn log(&mut self, msg: String) {
        self.log_at_level(LogLevel::Normal, msg);
    }

    fn verbose(&mut self, msg: String) {
        self.log_at_level(LogLevel::Verbose, msg);
    }

    fn log_at_level(&mut self, level: LogLevel, msg: String) {
        if self.buffering {
            self.buffer.push(msg);
        } else if level == LogLevel::Normal || self.verbosity == LogLevel::Verbose {
            println!("{}", msg);
        }
    }

    fn dump(&self) {
        for msg in &self.buffer {
            println!("{}", msg);
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[derive(Parser, Debug)]
#[command(name = "test_ppp")]
#[command(about = "Test toolkit for ppp")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Random property-based testing against a scratch project
    #[command(name = "random-actions")]
    RandomActions {
        /// Seed for deterministic RNG
        #[arg(long)]
        seed: Option<u64>,

        /// Use entropy for random seed (non-deterministic)
        #[arg(long)]
        seed_from_entropy: bool,

        /// Number of iterations to run (each with a different seed)
        #[arg(long, default_value = "1", conflicts_with = "seconds")]
        iters: usize,

        /// Run for this many seconds instead of a fixed number of iterations
        #[arg(long, conflicts_with = "iters")]
        seconds: Option<u64>,

        /// Number of actions to generate per iteration
        #[arg(long, default_value = "40")]
        actions_per_iter: usize,

        /// Print the action sequence and every check
        #[arg(long, short)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::RandomActions {
            seed,
            seed_from_entropy,
            iters,
            seconds,
            actions_per_iter,
            verbose,
        } => run_random_actions(seed, seed_from_entropy, iters, seconds, actions_per_iter, verbose),
    }
}

fn run_random_actions(
    seed: Option<u64>,
    seed_from_entropy: bool,
    iters: usize,
    seconds: Option<u64>,
    actions_per_iter: usize,
    verbose: bool,
) -> Result<()> {
    // Everything after this point is deterministic in base_seed
    let base_seed = if seed_from_entropy {
        let entropy_seed = rand::thread_rng().next_u64();
        println!("Sampled entropy seed: {}", entropy_seed);
        println!("(Use --seed {} to reproduce this run)\n", entropy_seed);
        entropy_seed
    } else {
        seed.unwrap_or(42)
    };

    let deadline = seconds.map(|s| (Instant::now(), Duration::from_secs(s)));
    if let Some(s) = seconds {
        println!("Stress test mode: running for {} seconds\n", s);
    }

    let verbosity = if verbose {
        LogLevel::Verbose
    } else {
        LogLevel::Normal
    };
    // Buffer in multi-iteration runs so only a failing iteration is printed
    let buffering = !verbose && (iters > 1 || seconds.is_some());

    let mut iter = 0usize;
    loop {
        match deadline {
            Some((start, limit)) if start.elapsed() >= limit => break,
            None if iter >= iters => break,
            _ => {}
        }
        iter += 1;
        let iter_seed = base_seed.wrapping_add(iter as u64 - 1);

        let mut logger = Logger::new(verbosity, buffering);
        logger.log(format!("=== Iteration {} (seed {}) ===", iter, iter_seed));

        match run_iteration(iter_seed, actions_per_iter, &mut logger) {
            Ok(()) => {
                logger.clear();
                if !buffering {
                    println!("Iteration {} passed", iter);
                }
            }
            Err(e) => {
                logger.dump();
                eprintln!("\nIteration {} failed: {:#}", iter, e);
                eprintln!("Reproduce with: test_ppp random-actions --seed {} --verbose", iter_seed);
                std::process::exit(1);
            }
        }
    }

    println!("\nAll {} iterations passed (base seed {})", iter, base_seed);
    Ok(())
}

fn run_iteration(seed: u64, num_actions: usize, logger: &mut Logger) -> Result<()> {
    let dir = tempfile::TempDir::new().context("Failed to create scratch directory")?;
    let manager = HybridManager::init(dir.path().join(PPP_DIR), "random")?;
    let executor = ActionExecutor::new(&manager);

    let mut generator = ActionGenerator::new(seed);
    let actions = generator.generate_sequence(num_actions);
    for (step, action) in actions.iter().enumerate() {
        logger.verbose(format!("  {:>3}. {}", step + 1, action));
        executor
            .execute(action)
            .with_context(|| format!("step {}: {}", step + 1, action))?;
        check_invariants(&manager).with_context(|| format!("after step {}: {}", step + 1, action))?;
    }

    let actual = snapshot(&manager)?;
    let expected = generator.state();
    if actual.issues != expected.issues {
        anyhow::bail!(
            "issue state diverged\nexpected: {:#?}\nactual: {:#?}",
            expected.issues,
            actual.issues
        );
    }
    if actual.sprints != expected.sprints {
        anyhow::bail!(
            "sprint state diverged\nexpected: {:#?}\nactual: {:#?}",
            expected.sprints,
            actual.sprints
        );
    }
    logger.verbose(format!(
        "  final state: {} issues, {} sprints",
        actual.issues.len(),
        actual.sprints.len()
    ));
    Ok(())
}
