//! Simulate command - drive worker threads against an in-process host
//!
//! Each worker mixes blocking reads, deferred writes, fire-and-forget proc
//! calls and retained objects. Afterwards the main context is asked for the
//! totals, which must match what the workers issued.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tether_hostcall::{Dispatcher, HostConfig, HostThread, Retained};
use tether_runtime::{Engine, MemoryEngine, ProcOutcome, Value};

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of worker threads
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Operations per worker
    #[arg(long, default_value_t = 1000)]
    pub ops: usize,

    /// Override the configured tick interval (milliseconds)
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Objects each worker keeps retained at once
    #[arg(long, default_value_t = 16)]
    pub keep: usize,
}

/// Counts reported by one worker
#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    reads: usize,
    writes: usize,
    calls: usize,
    naps: usize,
    retained: usize,
    errors: usize,
    non_null_calls: usize,
}

impl WorkerStats {
    fn merge(mut self, other: WorkerStats) -> Self {
        self.reads += other.reads;
        self.writes += other.writes;
        self.calls += other.calls;
        self.naps += other.naps;
        self.retained += other.retained;
        self.errors += other.errors;
        self.non_null_calls += other.non_null_calls;
        self
    }
}

/// What the main context saw once the workers were done
#[derive(Debug)]
struct Totals {
    bumps: f32,
    naps: f32,
    last_writes: Vec<f32>,
    held: usize,
    tick: u64,
}

fn bump(engine: &mut MemoryEngine, var: &str) -> tether_runtime::Result<()> {
    let world = engine.globals();
    let name = engine.intern(var);
    let current = engine.read_var(&world, name)?.get_number()?;
    engine.write_var(&world, name, &Value::number(current + 1.0))
}

fn build_engine(workers: usize) -> tether_runtime::Result<MemoryEngine> {
    let mut engine = MemoryEngine::new();
    engine.define_type("/obj/crate", &["label"]);
    engine.define_global("bumps", Value::number(0.0))?;
    engine.define_global("naps", Value::number(0.0))?;
    for i in 0..workers {
        engine.define_global(&format!("w{}", i), Value::number(-1.0))?;
    }
    engine.define_proc("bump", |engine, _, _| {
        bump(engine, "bumps")?;
        Ok(ProcOutcome::Return(Value::number(1.0)))
    });
    engine.define_proc("nap", |_, _, _| Ok(ProcOutcome::sleep(|engine| bump(engine, "naps"))));
    Ok(engine)
}

fn run_worker(index: usize, ops: usize, keep: usize, dispatcher: Dispatcher, progress: ProgressBar) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let world = Value::Object(0);
    let own_var = format!("w{}", index);
    let crate_path = Value::String("/obj/crate".to_string());
    let mut kept: VecDeque<Retained> = VecDeque::with_capacity(keep);

    for op in 0..ops {
        let outcome = match op % 5 {
            0 => {
                stats.reads += 1;
                dispatcher.read_number(&world, "bumps").map(drop)
            }
            1 => {
                stats.writes += 1;
                dispatcher.write_var(&world, &own_var, &Value::number(op as f32))
            }
            2 => {
                stats.calls += 1;
                dispatcher.call_global("bump", &[]).map(|v| {
                    if !v.is_null() {
                        stats.non_null_calls += 1;
                    }
                })
            }
            3 => {
                stats.retained += 1;
                dispatcher
                    .new_object(&crate_path, &[])
                    .and_then(|obj| Retained::new(&dispatcher, obj))
                    .map(|held| {
                        if kept.len() == keep {
                            kept.pop_front();
                        }
                        kept.push_back(held);
                    })
            }
            _ => {
                stats.naps += 1;
                dispatcher.call_global("nap", &[]).map(drop)
            }
        };
        if let Err(e) = outcome {
            log::debug!("worker {}: op {} failed: {}", index, op, e);
            stats.errors += 1;
        }
        progress.inc(1);
    }

    // last write wins only if deferred writes stay in order
    if dispatcher
        .write_var(&world, &own_var, &Value::number(ops as f32))
        .is_err()
    {
        stats.errors += 1;
    }
    stats
}

fn collect_totals(dispatcher: &Dispatcher, workers: usize) -> Result<Totals> {
    // wake sleeping procs, then read everything in one visit
    dispatcher.end_tick()?;
    let world = Value::Object(0);
    let totals = dispatcher.sync(move |host| {
        let bumps = host.read_var(&world, "bumps")?.get_number()?;
        let naps = host.read_var(&world, "naps")?.get_number()?;
        let last_writes = (0..workers)
            .map(|i| host.read_var(&world, &format!("w{}", i))?.get_number())
            .collect::<tether_runtime::Result<Vec<_>>>()?;
        Ok(Totals {
            bumps,
            naps,
            last_writes,
            held: host.refs().len(),
            tick: host.tick().epoch(),
        })
    })?;
    Ok(totals)
}

pub fn run(args: SimulateArgs, mut config: HostConfig, format: OutputFormat, use_color: bool, quiet: bool) -> Result<()> {
    if let Some(ms) = args.tick_ms {
        config.host.tick_interval_ms = ms;
    }
    if config.tick_interval().is_none() {
        // temporaries would never expire otherwise
        config.host.tick_interval_ms = 10;
    }
    let workers = args.workers.max(1);
    let total_ops = (workers * args.ops) as u64;

    // fail early with a readable error rather than inside the owner thread
    build_engine(workers)?;
    let host = HostThread::spawn(&config, move || build_engine(workers).unwrap_or_default())?;
    let dispatcher = host.dispatcher().clone();

    let progress = if quiet || matches!(format, OutputFormat::Json) {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(total_ops);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} ops ({per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let started = Instant::now();
    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            let progress = progress.clone();
            let (ops, keep) = (args.ops, args.keep);
            std::thread::Builder::new()
                .name(format!("tether-worker-{}", i))
                .spawn(move || run_worker(i, ops, keep, dispatcher, progress))
        })
        .collect::<std::io::Result<_>>()?;

    let mut stats = WorkerStats::default();
    for handle in handles {
        match handle.join() {
            Ok(worker) => stats = stats.merge(worker),
            Err(_) => bail!("worker thread panicked"),
        }
    }
    let elapsed = started.elapsed();
    progress.finish_and_clear();

    let totals = collect_totals(&dispatcher, workers)?;
    host.shutdown();

    let mut failures = Vec::new();
    if stats.errors > 0 {
        failures.push(format!("{} operations failed", stats.errors));
    }
    if stats.non_null_calls > 0 {
        failures.push(format!("{} off-main proc calls returned a value", stats.non_null_calls));
    }
    if totals.bumps as usize != stats.calls {
        failures.push(format!("bumps {} != calls issued {}", totals.bumps, stats.calls));
    }
    if totals.naps as usize != stats.naps {
        failures.push(format!("naps resumed {} != naps issued {}", totals.naps, stats.naps));
    }
    for (i, last) in totals.last_writes.iter().enumerate() {
        if *last as usize != args.ops {
            failures.push(format!("w{} = {}, deferred writes applied out of order", i, last));
        }
    }

    report(&args, &stats, &totals, elapsed, &failures, format, use_color)?;
    if !failures.is_empty() {
        bail!("simulation found {} problem(s)", failures.len());
    }
    Ok(())
}

fn report(
    args: &SimulateArgs,
    stats: &WorkerStats,
    totals: &Totals,
    elapsed: Duration,
    failures: &[String],
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let total = args.workers.max(1) * args.ops;
    let per_sec = total as f64 / elapsed.as_secs_f64().max(f64::EPSILON);

    match format {
        OutputFormat::Text => {
            println!("Simulated {} ops on {} workers in {:.2?} ({:.0} ops/s)", total, args.workers.max(1), elapsed, per_sec);
            println!("  reads:     {}", stats.reads);
            println!("  writes:    {}", stats.writes);
            println!("  calls:     {} (bumps seen: {})", stats.calls, totals.bumps);
            println!("  naps:      {} (resumed: {})", stats.naps, totals.naps);
            println!("  retained:  {}", stats.retained);
            println!("  ticks:     {}", totals.tick);
            println!("  held refs: {}", totals.held);
            if failures.is_empty() {
                let ok = "All invariants held";
                if use_color {
                    println!("{}", style(ok).green());
                } else {
                    println!("{}", ok);
                }
            } else {
                for failure in failures {
                    if use_color {
                        println!("  {}", style(failure).red());
                    } else {
                        println!("  FAIL {}", failure);
                    }
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "success": failures.is_empty(),
                "workers": args.workers.max(1),
                "ops": total,
                "elapsed_ms": elapsed.as_millis() as u64,
                "ops_per_sec": per_sec,
                "reads": stats.reads,
                "writes": stats.writes,
                "calls": stats.calls,
                "naps": stats.naps,
                "retained": stats.retained,
                "ticks": totals.tick,
                "held_refs": totals.held,
                "failures": failures,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_simulation_balances() {
        let mut config = HostConfig::default();
        config.host.tick_interval_ms = 2;
        let host = HostThread::spawn(&config, || build_engine(2).unwrap()).unwrap();
        let dispatcher = host.dispatcher().clone();

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let dispatcher = dispatcher.clone();
                std::thread::spawn(move || run_worker(i, 50, 4, dispatcher, ProgressBar::hidden()))
            })
            .collect();
        let stats = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .fold(WorkerStats::default(), WorkerStats::merge);

        let totals = collect_totals(&dispatcher, 2).unwrap();
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.non_null_calls, 0);
        assert_eq!(totals.bumps as usize, stats.calls);
        assert_eq!(totals.naps as usize, stats.naps);
        assert_eq!(totals.last_writes, vec![50.0, 50.0]);
    }
}
