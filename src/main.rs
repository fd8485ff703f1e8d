// Portrait photo compliance checker

use clap::{Parser, Subcommand};
use pasfoto::models::{AutoFixResult, ComplianceResult, FaceMetrics, FormatMatchResult, Severity};
use pasfoto::processing::ImageProcessor;
use pasfoto::{ComplianceError, PhotoValidator, Settings};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Check portrait photos against passport and visa photo formats
#[derive(Parser)]
#[command(name = "pasfoto")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a photo, optionally auto-fixing it
    Check {
        image: PathBuf,
        /// Format id; detected from the image size when omitted
        #[arg(short, long)]
        format: Option<String>,
        /// Face measurements as a JSON file
        #[arg(long)]
        face_metrics: Option<PathBuf>,
        /// Apply one jurisdiction's rule overrides to every format
        #[arg(long)]
        jurisdiction: Option<String>,
        #[arg(long)]
        pass_threshold: Option<f64>,
        /// Try to correct fixable issues
        #[arg(long)]
        auto_fix: bool,
        /// Where to write the corrected photo
        #[arg(short, long, requires = "auto_fix")]
        output: Option<PathBuf>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rank the known formats for an image size
    Formats { width: u32, height: u32 },
    /// List catalog rules
    Rules {
        #[arg(long, value_parser = parse_severity)]
        severity: Option<Severity>,
    },
}

fn parse_severity(value: &str) -> Result<Severity, String> {
    match value.to_ascii_lowercase().as_str() {
        "minor" => Ok(Severity::Minor),
        "major" => Ok(Severity::Major),
        "critical" => Ok(Severity::Critical),
        other => Err(format!("unknown severity '{}' (minor, major, critical)", other)),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the command succeeded in the compliance sense.
fn run(cli: Cli) -> Result<bool, ComplianceError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Check {
            image,
            format,
            face_metrics,
            jurisdiction,
            pass_threshold,
            auto_fix,
            output,
            json,
        } => {
            // CLI flags override the settings file
            if jurisdiction.is_some() {
                settings.jurisdiction = jurisdiction;
            }
            if let Some(threshold) = pass_threshold {
                settings.pass_threshold = threshold;
            }
            settings.auto_fix |= auto_fix;

            let validator = PhotoValidator::from_settings(settings)?;
            let metrics = face_metrics.as_deref().map(load_face_metrics).transpose()?;
            let (img, result) = validator.validate_file(&image, format.as_deref(), metrics.as_ref())?;

            if !validator.settings().auto_fix || result.overall_pass {
                print_result(&result, json)?;
                return Ok(result.overall_pass);
            }

            let fixed = validator.auto_fix(&img, &result)?;
            if let Some(path) = &output {
                if fixed.success {
                    ImageProcessor::save_image(&fixed.corrected_image, path)?;
                }
            }
            print_fix(&fixed, json, output.as_deref())?;
            Ok(fixed.after_validation.overall_pass)
        }
        Commands::Formats { width, height } => {
            let validator = PhotoValidator::from_settings(settings)?;
            let scores = validator.format_scores(width, height);
            print_formats(width, height, &scores);
            Ok(validator.detect_format(width, height).is_some())
        }
        Commands::Rules { severity } => {
            let validator = PhotoValidator::from_settings(settings)?;
            let catalog = validator.rule_catalog();
            let info = catalog.version_info();
            println!(
                "Rule catalog {} ({}), jurisdictions: {}",
                info.version,
                info.document_reference,
                info.jurisdictions.join(", ")
            );
            let rules = match severity {
                Some(severity) => catalog.get_rules_by_severity(severity),
                None => catalog.all_rules().iter().collect(),
            };
            for rule in rules {
                println!(
                    "  {:<12} {:<9} {:<22} {}",
                    rule.rule_id,
                    rule.severity.label(),
                    rule.name,
                    rule.threshold.describe()
                );
            }
            Ok(true)
        }
    }
}

fn load_face_metrics(path: &Path) -> Result<FaceMetrics, ComplianceError> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| ComplianceError::ConfigError(format!("Invalid face metrics {}: {}", path.display(), e)))
}

fn pass_label(passes: bool) -> &'static str {
    if passes {
        "PASSED"
    } else {
        "FAILED"
    }
}

fn print_result(result: &ComplianceResult, json: bool) -> Result<(), ComplianceError> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("\n===============================================");
    println!("      PHOTO COMPLIANCE REPORT: {}", result.format_id);
    println!("===============================================\n");
    println!(
        "  Dimensions: {} ({:.1})",
        pass_label(result.dimension_check.passes),
        result.dimension_check.score
    );
    println!(
        "  Position:   {} ({:.1})",
        pass_label(result.position_check.passes),
        result.position_check.positioning_score
    );
    println!(
        "  Background: {} ({:.1})",
        pass_label(result.background_check.passes),
        result.background_check.score
    );
    println!(
        "  Quality:    {} ({:.1}, {:?})",
        pass_label(result.quality_check.passes),
        result.quality_check.score,
        result.quality_check.metrics.grade()
    );

    if !result.issues.is_empty() {
        println!("\nISSUES:");
        for (i, issue) in result.issues.iter().enumerate() {
            println!(
                "  {}. [{}] {}{}",
                i + 1,
                issue.severity.label(),
                issue.message,
                if issue.auto_fixable { " (auto-fixable)" } else { "" }
            );
            println!("     -> {}", issue.suggestion);
        }
    }

    println!("\nOVERALL: {}", result.summary());
    Ok(())
}

fn print_fix(fixed: &AutoFixResult, json: bool, output: Option<&Path>) -> Result<(), ComplianceError> {
    if json {
        println!("{}", serde_json::to_string_pretty(fixed)?);
        return Ok(());
    }

    print_result(&fixed.before_validation, false)?;
    println!("\nAUTO-FIX:");
    for correction in &fixed.applied_corrections {
        println!(
            "  {} via {} ({:?}){}",
            correction.operation,
            correction.method_name,
            correction.method,
            if correction.changed_image { "" } else { " - no change" }
        );
    }
    for warning in &fixed.warnings {
        println!("  warning: {}", warning);
    }
    println!(
        "  score {:.1} -> {:.1} (estimated ceiling {:.1})",
        fixed.before_validation.overall_score, fixed.after_validation.overall_score, fixed.estimated_max_score
    );
    for recommendation in &fixed.recommendations {
        println!("  recommendation: {}", recommendation);
    }
    if let (Some(path), true) = (output, fixed.success) {
        println!("  corrected photo written to {}", path.display());
    }
    println!("\nAFTER: {}", fixed.after_validation.summary());
    Ok(())
}

fn print_formats(width: u32, height: u32, scores: &[FormatMatchResult]) {
    println!("Formats for {}x{}:", width, height);
    for score in scores {
        println!(
            "  {:<16} {:.2} {} [{}]",
            score.format_id,
            score.confidence,
            if score.matched { "match" } else { "-" },
            score.matched_criteria.join(", ")
        );
        for error in &score.validation_errors {
            println!("      {}", error);
        }
    }
}
