//! Doctor command - check configuration and a live host round trip

use std::path::Path;

use anyhow::Result;
use clap::Args;
use console::{style, Emoji};
use tether_hostcall::{HostConfig, HostThread};
use tether_runtime::{MemoryEngine, StrId, Value};

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Only check the configuration, without starting a host
    #[arg(long)]
    pub skip_host: bool,
}

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");
static WARN: Emoji<'_, '_> = Emoji("⚠ ", "[WARN] ");

struct CheckResult {
    name: String,
    status: CheckStatus,
    details: Option<String>,
}

enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            details: Some(details.into()),
        }
    }
}

fn check_version() -> CheckResult {
    CheckResult::new("tether version", CheckStatus::Ok, env!("CARGO_PKG_VERSION"))
}

fn check_config(path: &Path) -> (CheckResult, HostConfig) {
    let name = format!("host config ({})", path.display());
    if !path.exists() {
        return (
            CheckResult::new(&name, CheckStatus::Warning, "not found - run: tether init"),
            HostConfig::default(),
        );
    }
    match HostConfig::load(path) {
        Ok(config) => {
            let ticks = match config.tick_interval() {
                Some(period) => format!("ticks every {} ms", period.as_millis()),
                None => "ticks driven by the embedder".to_string(),
            };
            (CheckResult::new(&name, CheckStatus::Ok, ticks), config)
        }
        Err(e) => (
            CheckResult::new(&name, CheckStatus::Error, e.to_string()),
            HostConfig::default(),
        ),
    }
}

fn check_engine() -> MemoryEngine {
    let mut engine = MemoryEngine::new();
    if let Err(e) = engine.define_global("canary", Value::number(1.0)) {
        log::warn!("failed to declare canary var: {}", e);
    }
    engine
}

/// Bring up a host and exercise each routing class once
fn check_host(config: &HostConfig) -> Vec<CheckResult> {
    let host = match HostThread::spawn(config, check_engine) {
        Ok(host) => host,
        Err(e) => return vec![CheckResult::new("host start", CheckStatus::Error, e.to_string())],
    };
    let dispatcher = host.dispatcher().clone();
    let mut checks = Vec::new();

    let version = match dispatcher.version() {
        Ok(version) => version.to_string(),
        Err(e) => return vec![CheckResult::new("host start", CheckStatus::Error, e.to_string())],
    };
    checks.push(CheckResult::new("host start", CheckStatus::Ok, format!("engine {}", version)));

    // the world object is the first thing a MemoryEngine allocates
    let world = Value::Object(0);
    let on_main = {
        let world = world.clone();
        dispatcher.sync(move |host| host.read_var(&world, "canary"))
    };
    let off_main = dispatcher.read_var(&world, "canary");
    checks.push(match (on_main, off_main) {
        (Ok(a), Ok(b)) if a == b => CheckResult::new("blocking read", CheckStatus::Ok, format!("canary = {}", a)),
        (a, b) => CheckResult::new(
            "blocking read",
            CheckStatus::Error,
            format!("main {:?} vs worker {:?}", a, b),
        ),
    });

    let deferred = dispatcher.write_var(&world, "canary", &Value::number(2.0));
    let applied = dispatcher.read_number(&world, "canary");
    checks.push(match (deferred, applied) {
        (Ok(()), Ok(n)) if n == 2.0 => CheckResult::new("deferred write", CheckStatus::Ok, "applied in order"),
        (Ok(()), Ok(n)) => CheckResult::new("deferred write", CheckStatus::Error, format!("read back {}", n)),
        (Err(e), _) | (_, Err(e)) => CheckResult::new("deferred write", CheckStatus::Error, e.to_string()),
    });

    let missing = dispatcher.resolve("doctor.never.interned");
    checks.push(if missing == StrId::NONE {
        CheckResult::new("string resolver", CheckStatus::Ok, "lookup-only")
    } else {
        CheckResult::new("string resolver", CheckStatus::Error, format!("unknown string resolved to {}", missing))
    });

    host.shutdown();
    checks
}

pub fn run(args: DoctorArgs, config_path: &Path, format: OutputFormat, use_color: bool, quiet: bool) -> Result<()> {
    let (config_check, config) = check_config(config_path);
    let mut checks = vec![check_version(), config_check];
    if !args.skip_host {
        checks.extend(check_host(&config));
    }

    let mut has_errors = false;
    let mut has_warnings = false;

    match format {
        OutputFormat::Text => {
            if !quiet {
                println!("tether doctor\n");
                println!("Checks");
                println!("──────");
            }

            for check in &checks {
                let (emoji, color_fn): (_, fn(&str) -> console::StyledObject<&str>) = match check.status {
                    CheckStatus::Ok => (CHECK, |s| style(s).green()),
                    CheckStatus::Warning => {
                        has_warnings = true;
                        (WARN, |s| style(s).yellow())
                    }
                    CheckStatus::Error => {
                        has_errors = true;
                        (CROSS, |s| style(s).red())
                    }
                };

                let status_str = match check.status {
                    CheckStatus::Ok => "OK",
                    CheckStatus::Warning => "WARN",
                    CheckStatus::Error => "FAIL",
                };

                if quiet && matches!(check.status, CheckStatus::Ok) {
                    continue;
                }

                let details = check.details.as_deref().unwrap_or(status_str);
                if use_color {
                    println!("  {}{}: {}", emoji, check.name, color_fn(details));
                } else {
                    println!("  [{}] {}: {}", status_str, check.name, details);
                }
            }

            if !quiet {
                println!();
                if has_errors {
                    println!("Some checks failed.");
                } else if has_warnings {
                    println!("All critical checks passed with some warnings.");
                } else {
                    println!("All checks passed!");
                }
            }
        }
        OutputFormat::Json => {
            let results: Vec<_> = checks
                .iter()
                .map(|c| {
                    let status = match c.status {
                        CheckStatus::Ok => "ok",
                        CheckStatus::Warning => {
                            has_warnings = true;
                            "warning"
                        }
                        CheckStatus::Error => {
                            has_errors = true;
                            "error"
                        }
                    };
                    serde_json::json!({
                        "name": c.name,
                        "status": status,
                        "details": c.details,
                    })
                })
                .collect();

            let output = serde_json::json!({
                "success": !has_errors,
                "warnings": has_warnings,
                "checks": results,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if has_errors {
        std::process::exit(1);
    }

    Ok(())
}
