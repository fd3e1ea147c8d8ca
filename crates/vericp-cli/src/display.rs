//! Human-readable output for the CLI

use console::style;
use std::time::Duration;
use vericp_types::{CopyOperationResult, CopyOutcome, LocationClass, StrategyDecision};

/// Print one line per finished file
pub fn print_result(result: &CopyOperationResult) {
    let verification = match result.verification_passed {
        Some(true) => style(format!("{} passed", result.verification_mode)).green(),
        Some(false) => style(format!("{} FAILED", result.verification_mode)).red(),
        None => style(result.verification_mode.to_string()).dim(),
    };
    let strategy = result.strategy.map_or("-", |s| s.as_str());

    match (&result.outcome, &result.failure) {
        (CopyOutcome::Ok, _) => println!(
            "{} {} -> {} [{}, {}] {} in {}",
            style("✓").green().bold(),
            style(result.source.display()).cyan(),
            style(result.destination.display()).cyan(),
            strategy,
            verification,
            format_bytes(result.bytes_transferred),
            format_duration(result.elapsed)
        ),
        (CopyOutcome::Cancelled, _) => println!(
            "{} {} cancelled; destination unchanged",
            style("⊘").yellow().bold(),
            style(result.source.display()).cyan()
        ),
        (CopyOutcome::Error, failure) => {
            println!(
                "{} {} -> {} [{}]",
                style("✗").red().bold(),
                style(result.source.display()).cyan(),
                style(result.destination.display()).cyan(),
                strategy
            );
            if let Some(failure) = failure {
                println!("    {}", style(failure).red());
            }
        }
    }
}

/// Print the totals of a run
pub fn print_summary(results: &[CopyOperationResult], elapsed: Duration) {
    let ok = results.iter().filter(|r| r.is_success()).count();
    let cancelled = results
        .iter()
        .filter(|r| r.outcome == CopyOutcome::Cancelled)
        .count();
    let failed = results.len() - ok - cancelled;
    let bytes: u64 = results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.bytes_transferred)
        .sum();

    println!();
    println!("{}", style("Copy Summary:").bold().underlined());
    println!("  Files copied: {}", style(ok).green());
    println!(
        "  Failed: {}",
        if failed > 0 {
            style(failed).red()
        } else {
            style(failed).green()
        }
    );
    if cancelled > 0 {
        println!("  Cancelled: {}", style(cancelled).yellow());
    }
    println!("  Bytes copied: {}", style(format_bytes(bytes)).green());
    println!("  Duration: {}", style(format_duration(elapsed)).blue());
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        println!(
            "  Transfer rate: {}",
            style(format!("{:.2} MB/s", bytes as f64 / secs / 1024.0 / 1024.0)).blue()
        );
    }
}

/// Print a strategy decision
pub fn print_decision(decision: &StrategyDecision) {
    println!("{}", style("Strategy Decision:").bold().underlined());
    println!("  Source: {} ({})", decision.source.display(), decision.source_class);
    println!(
        "  Destination: {} ({})",
        decision.destination.display(),
        decision.destination_class
    );
    println!("  Size: {}", format_bytes(decision.length));
    println!(
        "  Strategy: {} (rule {})",
        style(decision.strategy).green().bold(),
        decision.rule
    );
    println!("  Unit size: {}", format_bytes(decision.unit_size));
    println!("  Verification: {}", decision.verification_mode);
    println!("  Policy: {}", decision.policy);
    println!(
        "  Digest: {}",
        decision.digest.map_or("none", |d| d.as_str())
    );
}

/// Print a location class with a short explanation
pub fn print_class(path: &std::path::Path, class: LocationClass, free: Option<u64>) {
    let explanation = match class {
        LocationClass::LocalFixed => "fixed local disk",
        LocationClass::LocalRemovable => "removable local media",
        LocationClass::NetworkMapped => "mapped network share",
        LocationClass::Unresolvable => "unmapped share or unknown volume; copies are refused",
    };
    println!(
        "{} {}: {} ({})",
        style("•").blue().bold(),
        style(path.display()).cyan(),
        style(class).bold(),
        explanation
    );
    if let Some(free) = free {
        println!("  Free space: {}", format_bytes(free));
    }
}

/// Format a byte count with binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format a duration for humans
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
