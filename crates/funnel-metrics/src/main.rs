mod bootstrap;
mod report;

use anyhow::{bail, Context, Result};
use funnel_core::models::CategoryPath;
use funnel_core::settings::{OutputFormat, Settings};
use funnel_data::analysis::{analyze_events, AnalysisRequest};

fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("funnel-metrics v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Actor: {}, Format: {}, Top: {}%, Parallel: {}",
        settings.actor,
        settings.format,
        settings.top_percent,
        !settings.sequential
    );

    let Some(data_path) = settings
        .data_path
        .clone()
        .or_else(bootstrap::discover_data_path)
    else {
        bail!("no event data found; pass --data-path or create ~/.funnel-metrics/data");
    };

    let brand_category = match settings.brand_category.as_deref() {
        Some(raw) => Some(
            CategoryPath::parse(raw)
                .with_context(|| format!("invalid --brand-category {raw:?}"))?,
        ),
        None => None,
    };

    let request = AnalysisRequest {
        data_path,
        actor_mode: settings.actor,
        metrics: settings.metrics_config(),
        brand_category,
    };

    let report = analyze_events(&request)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match settings.format {
        OutputFormat::Text => report::render_text(&report, &mut out)?,
        OutputFormat::Json => report::render_json(&report, &mut out)?,
    }

    Ok(())
}
