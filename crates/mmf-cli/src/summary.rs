use std::path::Path;

use console::Style;
use mmf_core::error::Warning;
use mmf_core::matrix::checks::{MatrixStats, SampleStats};
use mmf_core::pipeline::config::{ExperimentConfig, PatternSource};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    warning: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            warning: Style::new().yellow().bold(),
        }
    }
}

fn underline(title: &str) -> String {
    "\u{2550}".repeat(title.chars().count())
}

pub fn print_experiment_summary(title: &str, config: &ExperimentConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to(title));
    println!("  {}", s.title.apply_to(underline(title)));
    println!();

    println!("  {}", s.header.apply_to("Geometry"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Frame"),
        s.value.apply_to(config.frame)
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Patterns"),
        s.value.apply_to(format!(
            "{0}x{0} (N = {1})",
            config.pattern_size,
            config.pattern_count()
        ))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Threshold"),
        s.value.apply_to(config.threshold)
    );
    println!();

    println!("  {}", s.header.apply_to("Inputs"));
    match config.pattern_source {
        PatternSource::Captured => {
            println!(
                "    {:<14}{}",
                s.label.apply_to("Patterns H1"),
                s.path.apply_to(config.paths.patterns_h1.display())
            );
            println!(
                "    {:<14}{}",
                s.label.apply_to("Patterns H2"),
                s.path.apply_to(config.paths.patterns_h2.display())
            );
        }
        PatternSource::Synthetic => {
            println!(
                "    {:<14}{}",
                s.label.apply_to("Patterns"),
                s.method.apply_to("synthetic Sylvester")
            );
        }
    }
    println!(
        "    {:<14}{}",
        s.label.apply_to("Speckles H1"),
        s.path.apply_to(config.paths.speckles_h1.display())
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Speckles H2"),
        s.path.apply_to(config.paths.speckles_h2.display())
    );
    println!();

    println!("  {}", s.header.apply_to("Conventions"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Speckles"),
        s.method.apply_to(config.speckle_encoding)
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Baseline"),
        s.method.apply_to(config.baseline)
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Output"),
        s.method.apply_to(config.output_mode)
    );
    println!();

    println!("  {}", s.header.apply_to("Storage"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Output dir"),
        s.path.apply_to(config.paths.output_dir.display())
    );
    match &config.paths.temp_dir {
        Some(temp) => println!(
            "    {:<14}{}",
            s.label.apply_to("Temp dir"),
            s.path.apply_to(temp.display())
        ),
        None => println!(
            "    {:<14}{}",
            s.label.apply_to("Temp dir"),
            s.disabled.apply_to("same as output")
        ),
    }
    println!(
        "    {:<14}{}",
        s.label.apply_to("Format"),
        s.value.apply_to(config.storage.format)
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Margin"),
        s.value.apply_to(format!("{:.2}x", config.storage.space_margin))
    );
    println!();
}

/// Print advisory warnings in a distinct style; silent when there are none.
pub fn print_warnings(warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }
    let s = Styles::new();
    println!("  {}", s.warning.apply_to(format!("Warnings ({})", warnings.len())));
    for w in warnings {
        println!("    {} {}", s.warning.apply_to("!"), w);
    }
    println!();
}

/// One labelled artifact line.
pub fn print_artifact(label: &str, path: &Path) {
    let s = Styles::new();
    println!(
        "  {:<14}{}",
        s.label.apply_to(label),
        s.path.apply_to(path.display())
    );
}

fn stats_line(s: &Styles, label: &str, stats: &SampleStats) {
    println!(
        "    {:<14}{}",
        s.label.apply_to(label),
        s.value.apply_to(format!(
            "n={} min={} max={} mean={:.3} distinct={}",
            stats.count, stats.min, stats.max, stats.mean, stats.distinct
        ))
    );
}

pub fn print_matrix_stats(stats: &MatrixStats) {
    let s = Styles::new();
    println!();
    println!("  {}", s.path.apply_to(stats.path.display()));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Shape"),
        s.value.apply_to(format!("{} x {}", stats.rows, stats.cols))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Dtype"),
        s.method.apply_to(stats.dtype)
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("File size"),
        s.value.apply_to(format!(
            "{:.1} MB",
            stats.file_bytes as f64 / (1024.0 * 1024.0)
        ))
    );
    for region in &stats.regions {
        let label = format!("{} [{},{}]", region.label, region.row, region.col);
        stats_line(&s, &label, &region.stats);
    }
    stats_line(&s, "sampled", &stats.sample);
    println!();
}
