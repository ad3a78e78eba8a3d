use anyhow::{bail, Result};
use chrono::Local;
use env_logger::Env;
use std::env;
use std::path::PathBuf;

use recaudo_insights::kpis::{cartera, colocacion, pipeline, recaudo};
use recaudo_insights::{
    export_file_name, format_cop, summarize, write_csv, write_kpis_json, AgingBucket,
    DashboardConfig, DashboardError, Domain, DomainKpis, KpiReport, Loader, Period, VERSION,
};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("❌ {:#}", e);
        let code = match e.downcast_ref::<DashboardError>() {
            Some(DashboardError::MissingData { .. }) => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}

fn run(args: &[String]) -> Result<()> {
    let command = args.first().map(String::as_str).unwrap_or("help");
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return Ok(());
    }

    let config = DashboardConfig::load()?;
    let loader = Loader::new(&config);
    let rest = &args[1..];

    match command {
        "files" => run_files(&loader, rest),
        "load" => run_load(&loader, rest),
        "kpis" => run_kpis(&loader, &config, rest),
        "export" => run_export(&loader, rest),
        "clear-cache" => run_clear_cache(&loader, rest),
        other => {
            print_usage();
            bail!("unknown command '{}'", other)
        }
    }
}

fn print_usage() {
    println!("📊 recaudo-insights {}", VERSION);
    println!("{}", RULE);
    println!("Usage:");
    println!("  recaudo-insights files [domain]");
    println!("  recaudo-insights load <domain> [YYYY-MM|YYYY]");
    println!("  recaudo-insights kpis <domain> [YYYY-MM|YYYY] [--json <path>]");
    println!("  recaudo-insights export <domain> [YYYY-MM|YYYY] [--out <dir>]");
    println!("  recaudo-insights clear-cache [domain]");
    println!();
    println!("Domains: recaudo, cartera, pipeline, colocacion");
    println!("Config:  $DASHBOARD_CONFIG (default dashboard.json), $DASHBOARD_DATA_DIR");
}

// ============================================================================
// ARGUMENTS
// ============================================================================

/// Positional args plus the value of each `--flag <value>`
struct Args<'a> {
    positional: Vec<&'a str>,
    flags: Vec<(&'a str, &'a str)>,
}

impl<'a> Args<'a> {
    fn parse(args: &'a [String]) -> Result<Self> {
        let mut positional = Vec::new();
        let mut flags = Vec::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if let Some(flag) = arg.strip_prefix("--") {
                match iter.next() {
                    Some(value) => flags.push((flag, value.as_str())),
                    None => bail!("--{} needs a value", flag),
                }
            } else {
                positional.push(arg.as_str());
            }
        }
        Ok(Args { positional, flags })
    }

    fn flag(&self, name: &str) -> Option<&'a str> {
        self.flags.iter().find(|(f, _)| *f == name).map(|(_, v)| *v)
    }

    fn domain(&self) -> Result<Domain> {
        match self.positional.first() {
            Some(d) => d.parse::<Domain>().map_err(anyhow::Error::msg),
            None => bail!("missing domain (recaudo, cartera, pipeline or colocacion)"),
        }
    }

    fn optional_domain(&self) -> Result<Option<Domain>> {
        if self.positional.is_empty() {
            Ok(None)
        } else {
            self.domain().map(Some)
        }
    }

    fn period(&self) -> Result<Option<Period>> {
        match self.positional.get(1) {
            Some(p) => Ok(Some(p.parse::<Period>().map_err(anyhow::Error::msg)?)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_files(loader: &Loader, rest: &[String]) -> Result<()> {
    let args = Args::parse(rest)?;
    let domains = match args.optional_domain()? {
        Some(d) => vec![d],
        None => Domain::ALL.to_vec(),
    };

    for domain in domains {
        let files = loader.discover(domain)?;
        println!("\n📂 {} ({} files)", domain.name(), files.len());
        for f in files {
            let snapshot = loader.cache().snapshot_path(&f, &loader.options_for(domain));
            let cached = if snapshot.exists() {
                "💾"
            } else {
                "  "
            };
            let period = f.period.map(|p| p.to_string()).unwrap_or_default();
            println!("   {} {:<8} {}", cached, period, f.file_name());
        }
    }
    Ok(())
}

fn run_load(loader: &Loader, rest: &[String]) -> Result<()> {
    let args = Args::parse(rest)?;
    let domain = args.domain()?;
    let load = match args.period()? {
        Some(p) => loader.load_period(domain, &p)?,
        None => loader.load_domain(domain)?,
    };

    println!("\n📊 {}", domain.name());
    println!("{}", RULE);
    println!("✓ {} rows, {} columns", load.table.len(), load.table.columns().len());
    println!("✓ {} files ({} from cache)", load.files.len(), load.cache_hits());
    for f in &load.files {
        let report = &f.report;
        let mark = if report.is_clean() { "✓" } else { "⚠️ " };
        println!("   📄 {} → {} rows {}", f.source.file_name(), f.rows, mark);
        if report.duplicates_removed > 0 {
            println!("      🗑️  {} duplicates removed", report.duplicates_removed);
        }
        for (col, n) in &report.invalid_dates {
            println!("      ⚠️  {}: {} invalid dates", col, n);
        }
        for (col, n) in &report.invalid_numbers {
            println!("      ⚠️  {}: {} invalid numbers", col, n);
        }
        for (col, n) in &report.negative_money {
            println!("      ⚠️  {}: {} negative amounts dropped", col, n);
        }
    }
    for e in load.schema_errors() {
        println!("⚠️  {}", e);
    }
    for s in &load.skipped {
        println!("❌ skipped {}: {}", s.path.display(), s.reason);
    }
    println!("\nColumns: {}", load.table.column_names().join(", "));
    Ok(())
}

fn run_kpis(loader: &Loader, config: &DashboardConfig, rest: &[String]) -> Result<()> {
    let args = Args::parse(rest)?;
    let domain = args.domain()?;
    let report = summarize(loader, config, domain, args.period()?)?;

    print_report(&report);

    if let Some(path) = args.flag("json") {
        write_kpis_json(&report, &PathBuf::from(path))?;
        println!("\n💾 KPI report saved to {}", path);
    }
    Ok(())
}

fn run_export(loader: &Loader, rest: &[String]) -> Result<()> {
    let args = Args::parse(rest)?;
    let domain = args.domain()?;
    let load = match args.period()? {
        Some(p) => loader.load_period(domain, &p)?,
        None => loader.load_domain(domain)?,
    };

    let dir = PathBuf::from(args.flag("out").unwrap_or("exports"));
    let path = dir.join(export_file_name(domain, Local::now().naive_local()));
    let rows = write_csv(&load.table, &path)?;
    println!("✅ {} rows exported to {}", rows, path.display());
    Ok(())
}

fn run_clear_cache(loader: &Loader, rest: &[String]) -> Result<()> {
    let args = Args::parse(rest)?;
    let domains = match args.optional_domain()? {
        Some(d) => vec![d],
        None => Domain::ALL.to_vec(),
    };

    let mut total = 0;
    for domain in domains {
        let removed = loader.cache().clear(domain)?;
        println!("🗑️  {}: {} snapshots removed", domain.name(), removed);
        total += removed;
    }
    println!("✓ {} snapshots removed", total);
    Ok(())
}

// ============================================================================
// OUTPUT
// ============================================================================

fn pct(v: Option<f64>) -> String {
    v.map(|p| format!("{:+.1}%", p)).unwrap_or_else(|| "n/a".to_string())
}

fn print_report(report: &KpiReport) {
    let period = report
        .period
        .map(|p| p.label())
        .unwrap_or_else(|| "todos los registros".to_string());
    println!("\n📈 {} - {}", report.domain.name(), period);
    println!("{}", RULE);

    match &report.kpis {
        DomainKpis::Recaudo { kpis, comparison } => print_recaudo(kpis, comparison.as_ref()),
        DomainKpis::Cartera { kpis, comparison } => print_cartera(kpis, comparison),
        DomainKpis::Pipeline { kpis } => print_pipeline(kpis),
        DomainKpis::Colocacion { kpis } => print_colocacion(kpis),
    }

    println!("\nFiles: {}", report.files.join(", "));
    for w in &report.warnings {
        println!("⚠️  {}", w);
    }
}

fn print_recaudo(kpis: &recaudo::RecaudoKpis, comparison: Option<&recaudo::RecaudoComparison>) {
    println!("Registros:      {}", kpis.records);
    println!("Total recaudo:  {}", format_cop(kpis.total_recaudo));
    for bucket in AgingBucket::ALL {
        if let Some(total) = kpis.bucket_total(bucket) {
            println!("  {:<16} {}", bucket.label(), format_cop(total));
        }
    }
    if let Some(n) = kpis.noventa_plus {
        println!("  90+ días         {}", format_cop(n));
    }
    if let Some(days) = kpis.days_overdue {
        println!("Días vencidos:  promedio {:.1} (min {}, max {})", days.mean, days.min, days.max);
    }
    if let Some(cmp) = comparison {
        println!(
            "vs mes anterior: {} ({})",
            format_cop(cmp.total_recaudo.previous),
            pct(cmp.total_recaudo.pct_change)
        );
    }
    if !kpis.top_zonas.is_empty() {
        println!("\nTop zonas:");
        for z in &kpis.top_zonas {
            println!("  {:<24} {}", z.key, z.count);
        }
    }
}

fn print_cartera(kpis: &cartera::CarteraKpis, comparison: &[cartera::CompanyComparison]) {
    println!("Registros:      {}", kpis.records);
    println!("Total cartera:  {}", format_cop(kpis.totals.total_cuota));
    println!("Índice mora:    {:.2}%", kpis.indices.mora);

    println!("\n{:<22} {:>16} {:>9} {:>9}", "Empresa", "Total", "Corr.", "Mora");
    for c in &kpis.companies {
        println!(
            "{:<22} {:>16} {:>8.2}% {:>8.2}%",
            c.company.name(),
            format_cop(c.totals.total_cuota),
            c.indices.corriente,
            c.indices.mora
        );
    }

    if !comparison.is_empty() {
        println!("\nvs mes anterior:");
        for c in comparison {
            println!(
                "  {:<22} {:>16} ({:+.1}%)",
                c.company.name(),
                format_cop(c.variation),
                c.variation_pct
            );
        }
    }

    if !kpis.zones.is_empty() {
        println!("\nZonas de mayor riesgo:");
        for z in kpis.zones.iter().take(5) {
            println!(
                "  {:<20} score {:>7.2} (confianza {:.2}, {} registros)",
                z.zone, z.normalized_score, z.confidence, z.records
            );
        }
    }
}

fn print_pipeline(kpis: &pipeline::PipelineKpis) {
    for s in &kpis.summary.states {
        println!("  {:<10} {:>6} {:>6.1}%", s.state, s.count, s.pct);
    }
    println!("Aprobación:     {:.1}%", kpis.approval_rate);
    println!("Excluidos:      {}", kpis.excluded);
    if let Some(cmp) = &kpis.comparison {
        println!(
            "vs {}: total {:+} ({}), aprobados {:+}",
            cmp.period,
            cmp.total.delta,
            pct(cmp.total.pct_change),
            cmp.approved.delta
        );
    }
    if let Some(ytd) = &kpis.ytd {
        println!(
            "YTD {} (hasta mes {}): {} creados vs {} ({}), aprobación {:.1}% vs {:.1}% ({:+.1} pp)",
            ytd.year,
            ytd.through_month,
            ytd.created.current,
            ytd.created.previous,
            pct(ytd.created.pct_change),
            ytd.approval_rate,
            ytd.approval_rate_previous,
            ytd.approval_rate_delta
        );
    }
}

fn print_colocacion(kpis: &colocacion::ColocacionKpis) {
    println!(
        "YTD {} (hasta mes {}): {} unidades, {}",
        kpis.year,
        kpis.cut_month,
        kpis.ytd_units.current,
        format_cop(kpis.ytd_total.current)
    );
    println!(
        "YTD {}:          {} unidades, {} ({})",
        kpis.year - 1,
        kpis.ytd_units.previous,
        format_cop(kpis.ytd_total.previous),
        pct(kpis.ytd_total.pct_change)
    );
    println!("Ticket promedio: {}", format_cop(kpis.ticket_promedio));

    for (label, cmp) in [
        ("mes anterior", &kpis.vs_previous_month),
        ("mismo mes año anterior", &kpis.vs_prior_year),
    ] {
        println!(
            "vs {} ({}): {} unidades ({:+}), {} ({})",
            label,
            cmp.previous.period,
            cmp.current.units,
            cmp.units.delta,
            format_cop(cmp.current.total),
            pct(cmp.total.pct_change)
        );
    }

    for (dimension, rows) in &kpis.by_dimension {
        println!("\n{}:", dimension);
        for r in rows.iter().take(5) {
            println!("  {:<24} {:>6} {:>16}", r.key, r.units, format_cop(r.total));
        }
    }
}
