#![warn(missing_docs)]
//! abkit CLI Library
//!
//! Command-line front end for the analysis engine. Variants are given as
//! `LABEL=VISITORS:CONVERSIONS` arguments or a JSON file of variant inputs.
//!
//! ```text
//! abkit analyze A=10000:500 B=10000:600 --bayes
//! abkit sequential A=4000:200 B=4000:240 --look 2
//! abkit sample-size --baseline 5 --mde 10
//! ```

mod config;

pub use config::*;

use abkit_ipc::run_stdio;
use abkit_report::{AnalysisReport, OutputFormat, render};
use abkit_stats::{
    AnalysisEngine, ConfidenceLevel, HypothesisType, SampleSizeInput, SpendingFunction,
    TestSettings, VariantInput, VariantLabel, VariantRecord, analyze_bayesian, plan_looks,
    validate_inputs,
};
use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use rayon::ThreadPoolBuilder;
use std::io::Write;
use std::path::{Path, PathBuf};

/// abkit CLI arguments
#[derive(Parser, Debug)]
#[command(name = "abkit")]
#[command(author, version, about = "abkit - statistical analysis for A/B tests")]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, csv, human (default from config)
    #[arg(long, global = true)]
    pub format: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Configuration file (discovered from the current directory if omitted)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Number of threads for posterior simulation
    /// 0 = use all available cores (default), 1 = single-threaded
    #[arg(long, short = 'j', default_value = "0", global = true)]
    pub threads: usize,
}

/// Variant sources and test settings shared by the analysis commands
#[derive(Args, Debug, Clone)]
pub struct VariantArgs {
    /// Variants as LABEL=VISITORS:CONVERSIONS (e.g. A=10000:500)
    pub variants: Vec<String>,

    /// JSON file with an array of {"label", "visitors", "conversions"}
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Confidence level: 90, 95 or 99
    #[arg(long)]
    pub confidence: Option<u8>,

    /// Hypothesis: one-sided or two-sided
    #[arg(long)]
    pub hypothesis: Option<String>,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Frequentist comparison of every arm against the first, with warnings and winner
    Analyze {
        #[command(flatten)]
        variants: VariantArgs,

        /// Also run the posterior simulation for every comparison
        #[arg(long)]
        bayes: bool,

        /// Also evaluate sequential stopping rules at this look (first two arms)
        #[arg(long)]
        look: Option<u32>,
    },
    /// Posterior simulation of the second arm against the first
    Bayes {
        #[command(flatten)]
        variants: VariantArgs,

        /// Posterior draws
        #[arg(long)]
        simulations: Option<usize>,

        /// Fixed seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Sequential stopping rules at one look for the first two arms
    Sequential {
        #[command(flatten)]
        variants: VariantArgs,

        /// Current look
        #[arg(long)]
        look: u32,

        /// Planned looks
        #[arg(long)]
        looks: Option<u32>,

        /// Boundary family: pocock or obrien-fleming
        #[arg(long)]
        spending: Option<String>,
    },
    /// Visitors needed per variant
    SampleSize {
        /// Baseline conversion rate (%)
        #[arg(long)]
        baseline: f64,

        /// Relative minimum detectable effect (%)
        #[arg(long)]
        mde: f64,

        /// Target power (%)
        #[arg(long)]
        power: Option<f64>,

        /// Confidence level: 90, 95 or 99
        #[arg(long)]
        confidence: Option<u8>,

        /// Hypothesis: one-sided or two-sided
        #[arg(long)]
        hypothesis: Option<String>,

        /// Number of variants
        #[arg(long, default_value = "2")]
        variants: u32,

        /// Daily visitors, for a duration estimate
        #[arg(long)]
        daily: Option<u64>,

        /// Print the per-look plan of the configured sequential design
        #[arg(long)]
        sequential: bool,
    },
    /// Serve offload requests as length-prefixed JSON frames on stdin/stdout
    Worker,
    /// Print a default abkit.toml
    Init,
}

/// Run the abkit CLI with process arguments.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the abkit CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // stderr keeps stdout free for reports and worker frames
    let filter = if cli.verbose {
        "abkit=debug"
    } else {
        "abkit=info"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    if cli.threads > 0 {
        ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let config = match &cli.config {
        Some(path) => AbkitConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => AbkitConfig::discover().unwrap_or_default(),
    };
    let format: OutputFormat = match &cli.format {
        Some(f) => f.parse().map_err(anyhow::Error::msg)?,
        None => config.output.format.parse().unwrap_or_default(),
    };

    match &cli.command {
        Commands::Worker => {
            tracing::info!("worker listening on stdin");
            run_stdio(std::io::stdin(), std::io::stdout(), config.cache.results)?;
            Ok(())
        }
        Commands::Init => emit(&cli, &AbkitConfig::default_toml()),
        Commands::Analyze {
            variants,
            bayes,
            look,
        } => {
            let inputs = collect_inputs(variants)?;
            let settings = resolve_settings(variants, &config)?;
            let mut engine = AnalysisEngine::new(config.cache_config());
            let analysis = engine.analyze(&inputs, &settings)?;

            let mut report = AnalysisReport::from_analysis(&analysis);
            if *bayes {
                let bayes_config = config.bayesian_config();
                let mut active = analysis.variants.iter().filter(|r| r.is_active());
                if let Some(control) = active.next() {
                    for test in active {
                        let result = analyze_bayesian(control, test, &bayes_config);
                        report = report.with_bayesian(control.label(), test.label(), result);
                    }
                }
            }
            if let Some(look) = look {
                let (control, test) = first_two_active(&analysis.variants)?;
                let mut design = config.sequential_design();
                design.confidence_level = settings.confidence_level;
                let status = engine.sequential_status(control, test, &design, *look)?;
                report = report.with_sequential(status);
            }

            emit(&cli, &render(&report, format)?)
        }
        Commands::Bayes {
            variants,
            simulations,
            seed,
        } => {
            let records = validate_inputs(&collect_inputs(variants)?)?;
            let (control, test) = first_two_active(&records)?;
            let mut bayes_config = config.bayesian_config();
            if let Some(n) = simulations {
                bayes_config.simulations = *n;
            }
            if seed.is_some() {
                bayes_config.seed = *seed;
            }

            let result = analyze_bayesian(control, test, &bayes_config);
            let text = match format {
                OutputFormat::Json | OutputFormat::Csv => serde_json::to_string_pretty(&result)?,
                OutputFormat::Human => format!(
                    "{} vs {}\n  P(improvement): {:.1}%\n  expected lift: {:+.2}%\n  95% credible interval: [{:+.2}%, {:+.2}%]\n  expected loss: {:.4}%\n",
                    test.label(),
                    control.label(),
                    result.probability_of_improvement * 100.0,
                    result.expected_lift_percent,
                    result.credible_interval_95[0],
                    result.credible_interval_95[1],
                    result.expected_loss
                ),
            };
            emit(&cli, &text)
        }
        Commands::Sequential {
            variants,
            look,
            looks,
            spending,
        } => {
            let settings = resolve_settings(variants, &config)?;
            let records = validate_inputs(&collect_inputs(variants)?)?;
            let (control, test) = first_two_active(&records)?;

            let mut design = config.sequential_design();
            design.confidence_level = settings.confidence_level;
            if let Some(k) = looks {
                design.total_looks = *k;
            }
            if let Some(s) = spending {
                design.spending = s.parse::<SpendingFunction>().map_err(anyhow::Error::msg)?;
            }

            let mut engine = AnalysisEngine::new(config.cache_config());
            let status = engine.sequential_status(control, test, &design, *look)?;
            let text = match format {
                OutputFormat::Json | OutputFormat::Csv => serde_json::to_string_pretty(&status)?,
                OutputFormat::Human => {
                    let decision = if status.can_stop_for_efficacy {
                        "stop for efficacy"
                    } else if status.can_stop_for_futility {
                        "stop for futility"
                    } else {
                        "continue"
                    };
                    format!(
                        "look {}/{} ({}, t = {:.2})\n  p: {:.4}  power: {:.1}%\n  efficacy boundary: {:.4}\n  futility boundary: {:.4}\n  decision: {}\n",
                        status.current_look,
                        status.total_looks,
                        design.spending,
                        status.information_fraction,
                        status.p_value,
                        status.power,
                        status.alpha_boundary,
                        status.beta_boundary,
                        decision
                    )
                }
            };
            emit(&cli, &text)
        }
        Commands::SampleSize {
            baseline,
            mde,
            power,
            confidence,
            hypothesis,
            variants,
            daily,
            sequential,
        } => {
            let confidence_level = match confidence {
                Some(c) => ConfidenceLevel::try_from(*c).map_err(anyhow::Error::msg)?,
                None => config.analysis.confidence_level,
            };
            let hypothesis_type = match hypothesis {
                Some(h) => h.parse::<HypothesisType>().map_err(anyhow::Error::msg)?,
                None => config.analysis.hypothesis,
            };
            let input = SampleSizeInput {
                baseline_rate: *baseline,
                minimum_detectable_effect: *mde,
                confidence_level,
                power: power.unwrap_or(config.sequential.target_power),
                hypothesis_type,
                variants: *variants,
            };

            let mut engine = AnalysisEngine::new(config.cache_config());
            let estimate = engine.sample_size(&input)?;

            if *sequential {
                let mut design = config.sequential_design();
                design.confidence_level = confidence_level;
                design.target_power = input.power;
                let plan = plan_looks(&design, *baseline, *mde)?;
                let text = match format {
                    OutputFormat::Json | OutputFormat::Csv => serde_json::to_string_pretty(&plan)?,
                    OutputFormat::Human => {
                        let mut text = format!(
                            "fixed design: {} per variant\n{} x{:.3}: max {} per variant, {} per look\n",
                            plan.fixed_sample_size,
                            design.spending,
                            plan.inflation_factor,
                            plan.max_sample_size,
                            plan.per_look_sample_size
                        );
                        for l in &plan.looks {
                            text.push_str(&format!(
                                "  look {}: {} per variant  efficacy {:.5}  futility {:.4}\n",
                                l.look, l.cumulative_per_variant, l.alpha_boundary, l.beta_boundary
                            ));
                        }
                        text
                    }
                };
                return emit(&cli, &text);
            }

            let days = daily.and_then(|d| estimate.estimated_days(d));
            let text = match format {
                OutputFormat::Json | OutputFormat::Csv => serde_json::to_string_pretty(&serde_json::json!({
                    "estimate": estimate,
                    "estimatedDays": days,
                }))?,
                OutputFormat::Human => {
                    let mut text = format!(
                        "{} visitors per variant, {} total (expected rate {:.3}%)\n",
                        estimate.per_variant, estimate.total, estimate.expected_rate
                    );
                    if let Some(days) = days {
                        text.push_str(&format!("about {} days at the given traffic\n", days));
                    }
                    text
                }
            };
            emit(&cli, &text)
        }
    }
}

/// Parse `LABEL=VISITORS:CONVERSIONS`
pub fn parse_variant(spec: &str) -> anyhow::Result<VariantInput> {
    let (label, counts) = spec
        .split_once('=')
        .with_context(|| format!("Expected LABEL=VISITORS:CONVERSIONS, got {:?}", spec))?;
    let (visitors, conversions) = counts
        .split_once(':')
        .with_context(|| format!("Expected VISITORS:CONVERSIONS, got {:?}", counts))?;

    let label: VariantLabel = label.parse().map_err(anyhow::Error::msg)?;
    let visitors: f64 = visitors
        .trim()
        .parse()
        .with_context(|| format!("Invalid visitor count {:?}", visitors))?;
    let conversions: f64 = conversions
        .trim()
        .parse()
        .with_context(|| format!("Invalid conversion count {:?}", conversions))?;

    Ok(VariantInput {
        label,
        visitors,
        conversions,
    })
}

fn load_inputs(path: &Path) -> anyhow::Result<Vec<VariantInput>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid variant file {}", path.display()))
}

fn collect_inputs(args: &VariantArgs) -> anyhow::Result<Vec<VariantInput>> {
    let mut inputs = match &args.file {
        Some(path) => load_inputs(path)?,
        None => Vec::new(),
    };
    for spec in &args.variants {
        inputs.push(parse_variant(spec)?);
    }
    if inputs.is_empty() {
        bail!("No variants given; pass LABEL=VISITORS:CONVERSIONS or --file");
    }
    Ok(inputs)
}

fn resolve_settings(args: &VariantArgs, config: &AbkitConfig) -> anyhow::Result<TestSettings> {
    let mut settings = config.test_settings();
    if let Some(c) = args.confidence {
        settings.confidence_level = ConfidenceLevel::try_from(c).map_err(anyhow::Error::msg)?;
    }
    if let Some(h) = &args.hypothesis {
        settings.hypothesis_type = h.parse().map_err(anyhow::Error::msg)?;
    }
    Ok(settings)
}

fn first_two_active(records: &[VariantRecord]) -> anyhow::Result<(&VariantRecord, &VariantRecord)> {
    let mut active = records.iter().filter(|r| r.is_active());
    match (active.next(), active.next()) {
        (Some(control), Some(test)) => Ok((control, test)),
        _ => bail!("At least two variants with visitors are required"),
    }
}

fn emit(cli: &Cli, text: &str) -> anyhow::Result<()> {
    match &cli.output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            if !text.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variant() {
        let input = parse_variant("b=10000:600").unwrap();
        assert_eq!(input.label, VariantLabel::B);
        assert_eq!(input.visitors, 10_000.0);
        assert_eq!(input.conversions, 600.0);

        assert!(parse_variant("B10000:600").is_err());
        assert!(parse_variant("B=10000").is_err());
        assert!(parse_variant("E=10:1").is_err());
        assert!(parse_variant("A=ten:1").is_err());
    }

    #[test]
    fn test_fractional_counts_reach_validation() {
        let input = parse_variant("A=100.5:3").unwrap();
        let other = parse_variant("B=100:3").unwrap();
        assert!(validate_inputs(&[input, other]).is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "abkit", "analyze", "A=10000:500", "B=10000:600", "--bayes", "--confidence", "99",
            "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.format.as_deref(), Some("json"));
        match cli.command {
            Commands::Analyze {
                variants, bayes, ..
            } => {
                assert_eq!(variants.variants.len(), 2);
                assert_eq!(variants.confidence, Some(99));
                assert!(bayes);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["abkit", "sample-size", "--baseline", "5", "--mde", "10"])
            .unwrap();
        assert!(matches!(cli.command, Commands::SampleSize { variants: 2, .. }));
    }

    #[test]
    fn test_resolve_settings_overrides_config() {
        let args = VariantArgs {
            variants: Vec::new(),
            file: None,
            confidence: Some(90),
            hypothesis: Some("one-sided".to_string()),
        };
        let settings = resolve_settings(&args, &AbkitConfig::default()).unwrap();
        assert_eq!(settings.confidence_level, ConfidenceLevel::Ninety);
        assert_eq!(settings.hypothesis_type, HypothesisType::OneSided);

        let bad = VariantArgs {
            confidence: Some(80),
            ..args
        };
        assert!(resolve_settings(&bad, &AbkitConfig::default()).is_err());
    }

    #[test]
    fn test_first_two_active_skips_empty_arms() {
        let records = [
            VariantRecord::new(VariantLabel::A, 0, 0).unwrap(),
            VariantRecord::new(VariantLabel::B, 100, 5).unwrap(),
            VariantRecord::new(VariantLabel::C, 100, 7).unwrap(),
        ];
        let (control, test) = first_two_active(&records).unwrap();
        assert_eq!((control.label(), test.label()), (VariantLabel::B, VariantLabel::C));
        assert!(first_two_active(&records[..2]).is_err());
    }
}
