use batch_converter_core::batch::BatchRun;
use batch_converter_core::history::HistoryRecord;
use batch_converter_core::intake::{format_size, truncate_name};
use batch_converter_core::stats::StatsCounters;

const NAME_WIDTH: usize = 30;

/// Per-batch summary printed after conversion.
pub fn print_summary(run: &BatchRun) {
    println!("\n--- Summary ---");
    println!(
        "Files converted: {} | Errors: {}",
        run.succeeded,
        run.failed()
    );

    if run.succeeded > 0 {
        println!("Total output: {}", format_size(run.total_output_bytes()));
    }

    for r in run.successes() {
        println!(
            "  OK    {} → {} ({})",
            truncate_name(&r.source_name, NAME_WIDTH),
            r.output_name,
            format_size(r.byte_size)
        );
    }
    for r in run.failures() {
        if let Some(err) = r.error() {
            println!("  ERROR {}: {}", truncate_name(&r.source_name, NAME_WIDTH), err);
        }
    }
}

pub fn print_history(records: &[HistoryRecord]) {
    if records.is_empty() {
        println!("No conversions recorded.");
        return;
    }
    for r in records {
        println!(
            "{}  {} → {}",
            format_timestamp(r.timestamp_millis),
            truncate_name(&r.original_name, NAME_WIDTH),
            r.format.to_uppercase()
        );
    }
}

pub fn print_stats(stats: &StatsCounters) {
    println!("Conversions:       {}", stats.total_conversions);
    println!("Files processed:   {}", stats.files_processed);
    println!("Time saved (est.): {} min", stats.time_saved_estimate);
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13:20");
    }
}
