use console::Style;
use sisr_core::pipeline::{CalibrationReport, PipelineConfig, PipelineReport};
use sisr_core::report::StageReport;
use sisr_core::store::file_name;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    error: Style,
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
            error: Style::new().red().bold(),
        }
    }
}

pub fn print_pipeline_summary(config: &PipelineConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("SISR Pipeline"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(13)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(config.input.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Stages"),
        s.method.apply_to(&config.stages)
    );
    println!();

    println!("  {}", s.header.apply_to("Combine"));
    for (label, options) in [
        ("Dark", &config.combine.dark),
        ("Flat", &config.combine.flat),
        ("Stack", &config.combine.stack),
    ] {
        let clip = options
            .sigma_clip
            .as_ref()
            .map(|c| format!(", clip {}\u{03c3}", c.sigma))
            .unwrap_or_default();
        println!(
            "    {:<12}{}",
            s.label.apply_to(label),
            s.method.apply_to(format!("{}{clip}", options.method))
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Flat norm"),
        s.value.apply_to(config.flat.normalize)
    );
    println!();

    println!("  {}", s.header.apply_to("Reduction"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Background"),
        s.method.apply_to(&config.reduction.background)
    );
    if config.reduction.artifacts.enabled {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Artifacts"),
            s.value.apply_to(format!("sigclip {}", config.reduction.artifacts.sigclip))
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Artifacts"),
            s.disabled.apply_to("disabled")
        );
    }
    println!();

    if config.stages.solve {
        println!("  {}", s.header.apply_to("Plate solve"));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Solver"),
            s.path.apply_to(config.solve.executable.display())
        );
        match &config.solve.search {
            Some(hint) => println!(
                "    {:<12}{}",
                s.label.apply_to("Search"),
                s.value.apply_to(format!("{} {} r={}\u{00b0}", hint.ra, hint.dec, hint.radius))
            ),
            None => println!(
                "    {:<12}{}",
                s.label.apply_to("Search"),
                s.disabled.apply_to("blind")
            ),
        }
        println!();
    }

    if config.stages.align {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Alignment"),
            s.method.apply_to(config.align.method)
        );
        println!();
    }
}

pub fn print_stage_report(report: &StageReport) {
    let s = Styles::new();
    let failed_style = if report.failed.is_empty() { &s.value } else { &s.error };
    println!(
        "  {:<14}{} produced, {} skipped, {} failed",
        s.header.apply_to(report.stage),
        s.value.apply_to(report.produced.len()),
        s.value.apply_to(report.skipped.len()),
        failed_style.apply_to(report.failed.len())
    );
    for failure in &report.failed {
        println!(
            "    {} {}",
            s.error.apply_to(file_name(&failure.path)),
            s.label.apply_to(&failure.reason)
        );
    }
}

fn print_calibration(s: &Styles, title: &str, reports: &[CalibrationReport]) {
    if reports.is_empty() {
        println!("  {:<14}{}", s.header.apply_to(title), s.disabled.apply_to("none"));
        return;
    }
    println!("  {}", s.header.apply_to(title));
    for report in reports {
        let status = match (&report.error, report.reused) {
            (Some(e), _) => s.error.apply_to(e.clone()),
            (None, true) => s.label.apply_to("reused".to_string()),
            (None, false) if report.product.is_some() => s.method.apply_to("written".to_string()),
            (None, false) => s.disabled.apply_to("in memory".to_string()),
        };
        println!("    {:<12}{}", s.label.apply_to(file_name(&report.dir)), status);
    }
}

pub fn print_pipeline_report(report: &PipelineReport) {
    let s = Styles::new();
    println!();
    print_calibration(&s, "Master darks", &report.darks);
    print_calibration(&s, "Flatfields", &report.flats);
    println!();

    for group in &report.groups {
        println!("  {}", s.title.apply_to(&group.name));
        if let Some(error) = &group.error {
            println!("    {}", s.error.apply_to(error));
        }
        for stage in &group.stages {
            print!("  ");
            print_stage_report(stage);
        }
        if let Some(reason) = &group.blocked {
            println!("    {}", s.disabled.apply_to(reason));
        }
        if let Some(stack) = &group.stack {
            println!("    {:<12}{}", s.label.apply_to("Stack"), s.path.apply_to(stack.display()));
        }
        if let Some(diag) = &group.diagnostics {
            println!("    {:<12}{}", s.label.apply_to("Diagnostics"), s.value.apply_to(diag));
        }
        println!();
    }

    if report.is_complete() {
        println!("  {}", s.method.apply_to("Pipeline complete"));
    } else {
        println!("  {}", s.error.apply_to("Pipeline finished with failures"));
    }
}
