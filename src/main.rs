//! BETLEDGER — settlement & confidence engine
//!
//! Entry point. Loads configuration, initialises structured logging and
//! runs one command against the ledger file:
//!
//! ```text
//! betledger settle  <outcomes.json>
//! betledger verify  <outcomes.json>
//! betledger apply   <outcomes.json> <wager-key>...
//! betledger summary
//! betledger blend   <candidate.json>
//! ```

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use betledger::confidence::estimators::EstimatorRegistry;
use betledger::confidence::form::FormAnalyzer;
use betledger::confidence::{Candidate, ConfidenceBlender};
use betledger::config::AppConfig;
use betledger::engine::{assemble, Accountant, Reconciler, SettlementEngine, WagerKey};
use betledger::storage::{BetStore, JsonFileStore};
use betledger::types::OutcomeBook;

const USAGE: &str = "usage: betledger <settle|verify|apply|summary|blend> [args]
  settle  <outcomes.json>                 grade pending wagers
  verify  <outcomes.json>                 report drift in graded wagers
  apply   <outcomes.json> <wager-key>...  write the selected corrections
  summary                                 record and P&L
  blend   <candidate.json>                score one candidate pick";

#[derive(Debug)]
enum Command {
    Settle { outcomes: String },
    Verify { outcomes: String },
    Apply { outcomes: String, keys: Vec<WagerKey> },
    Summary,
    Blend { candidate: String },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let arg = |i: usize, what: &str| -> Result<String> {
            args.get(i)
                .cloned()
                .with_context(|| format!("{} requires {what}\n{USAGE}", args[0]))
        };
        let Some(name) = args.first() else {
            bail!("{USAGE}");
        };

        match name.as_str() {
            "settle" => Ok(Command::Settle {
                outcomes: arg(1, "an outcomes file")?,
            }),
            "verify" => Ok(Command::Verify {
                outcomes: arg(1, "an outcomes file")?,
            }),
            "apply" => {
                let outcomes = arg(1, "an outcomes file")?;
                let keys = args[2..]
                    .iter()
                    .map(|k| k.parse::<WagerKey>())
                    .collect::<Result<Vec<_>>>()?;
                if keys.is_empty() {
                    bail!("apply requires at least one wager key\n{USAGE}");
                }
                Ok(Command::Apply { outcomes, keys })
            }
            "summary" => Ok(Command::Summary),
            "blend" => Ok(Command::Blend {
                candidate: arg(1, "a candidate file")?,
            }),
            other => bail!("Unknown command: {other}\n{USAGE}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cfg = AppConfig::load_or_default(&AppConfig::path_from_env())?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let mut store = JsonFileStore::new(&cfg.storage.path);
    let engine = SettlementEngine::new(cfg.engine.clone());

    match command {
        Command::Settle { outcomes } => {
            let outcomes = Arc::new(load_outcomes(&outcomes)?);
            let assembly = assemble(&store.load_all()?);
            for v in &assembly.violations {
                warn!(error = %v, "Skipping invalid stored wager");
            }

            let legs_by_key: Vec<_> = assembly.wagers.iter().map(|w| (w.key(), w.legs().to_vec())).collect();
            let batch = engine.settle_all_concurrent(assembly.wagers, outcomes).await;

            for settlement in &batch.settled {
                let Some((_, legs)) = legs_by_key.iter().find(|(k, _)| *k == settlement.key) else {
                    continue;
                };
                let audit = settlement.forced_void_audit(legs);
                let mut legs = legs.clone();
                settlement.apply_to(&mut legs);
                store.write_audited(&legs, &audit)?;
            }
            for (key, e) in &batch.deferred {
                info!(wager = %key, reason = %e, "Deferred until the result is final");
            }
            println!("{}", serde_json::to_string_pretty(&batch.settled)?);
        }

        Command::Verify { outcomes } => {
            let outcomes = load_outcomes(&outcomes)?;
            let report = Reconciler::new(engine).verify(&store.load_all()?, &outcomes);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Apply { outcomes, keys } => {
            let outcomes = load_outcomes(&outcomes)?;
            let reconciler = Reconciler::new(engine);
            let report = reconciler.verify(&store.load_all()?, &outcomes);

            let selected = report.select(&keys);
            for key in keys.iter().filter(|k| !selected.iter().any(|d| d.wager == **k)) {
                warn!(wager = %key, "No discrepancy for this wager, nothing to apply");
            }

            let applied = reconciler.apply(&mut store, &selected)?;
            info!(
                corrected = applied.corrected_count,
                stale = applied.stale.len(),
                "Corrections applied"
            );
            println!("{}", serde_json::to_string_pretty(&applied.audit)?);
        }

        Command::Summary => {
            let assembly = assemble(&store.load_all()?);
            for v in &assembly.violations {
                warn!(error = %v, "Excluding invalid stored wager from summary");
            }
            let summary = Accountant::summarize(&assembly.wagers);
            println!("{summary}");
        }

        Command::Blend { candidate } => {
            let json = std::fs::read_to_string(&candidate)
                .with_context(|| format!("Failed to read candidate from {candidate}"))?;
            let candidate: Candidate = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse candidate from {candidate}"))?;

            let blender = ConfidenceBlender::new(
                FormAnalyzer::new(cfg.form.clone()),
                EstimatorRegistry::from_config(&cfg.estimators),
                cfg.confidence.form_weight,
            );
            let result = blender.score(&candidate).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

/// Read an outcomes file: a JSON list of event outcomes.
fn load_outcomes(path: &str) -> Result<OutcomeBook> {
    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read outcomes from {path}"))?;
    let book: OutcomeBook =
        serde_json::from_str(&json).with_context(|| format!("Failed to parse outcomes from {path}"))?;
    info!(path, events = book.len(), "Outcomes loaded");
    Ok(book)
}

/// Initialise the `tracing` subscriber. Logs go to stderr so command
/// output on stdout stays machine-readable.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("betledger=info"));

    let json_logging = std::env::var("BETLEDGER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
