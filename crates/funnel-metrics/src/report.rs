//! Plain-text and JSON rendering of an [`AnalysisReport`].

use std::io::Write;

use funnel_core::formatting::{
    format_count, format_currency, format_metric_percent, format_metric_value, format_number,
};
use funnel_data::analysis::AnalysisReport;
use funnel_data::funnel::FunnelStage;

const RULE_WIDTH: usize = 64;

/// Write the report as the pretty-printed JSON form of [`AnalysisReport`].
pub fn render_json(report: &AnalysisReport, out: &mut impl Write) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)?;
    Ok(())
}

/// Write the report as plain tables.
pub fn render_text(report: &AnalysisReport, out: &mut impl Write) -> anyhow::Result<()> {
    let meta = &report.metadata;
    let m = &report.metrics;

    heading(out, "Funnel summary")?;
    row(out, "Data", &meta.data_path)?;
    row(out, "Actor key", &meta.actor_mode.to_string())?;
    row(
        out,
        "Records",
        &format!(
            "{} ({} skipped lines, {} files)",
            format_count(meta.records_loaded as u64),
            format_count(meta.skipped_lines as u64),
            meta.files_read
        ),
    )?;
    row(out, "Actors", &format_count(m.actor_count))?;
    row(out, "Complete funnels", &format_count(m.complete_actor_count))?;
    row(out, "Completed funnel count", &format_count(m.total_completed_funnels))?;
    row(out, "Completion rate", &format_metric_percent(&m.funnel_completion_rate, 2))?;
    row(out, "Cart → purchase", &format_metric_percent(&m.cart_to_purchase_rate, 2))?;
    row(
        out,
        "Avg views before commit",
        &format_metric_value(&m.average_views_before_commit, 2),
    )?;
    row(
        out,
        "Event share",
        &format!(
            "view {} / cart {} / purchase {}",
            format_metric_percent(&m.event_share.view, 1),
            format_metric_percent(&m.event_share.cart, 1),
            format_metric_percent(&m.event_share.purchase, 1)
        ),
    )?;

    heading(out, "Stages")?;
    for stage in FunnelStage::ALL {
        let count = m.stage_distribution.get(&stage).copied().unwrap_or(0);
        row(out, stage.label(), &format_count(count))?;
    }

    heading(out, "Conversion by category")?;
    if m.conversion_rate_by_category.is_empty() {
        writeln!(out, "  (no categorized events)")?;
    } else {
        writeln!(
            out,
            "  {:<36} {:>10} {:>8} {:>10} {:>10}",
            "Category", "Views", "Carts", "Purchases", "Rate"
        )?;
        for (category, conv) in &m.conversion_rate_by_category {
            writeln!(
                out,
                "  {:<36} {:>10} {:>8} {:>10} {:>10}",
                category.to_string(),
                format_count(conv.views),
                format_count(conv.carts),
                format_count(conv.purchases),
                format_metric_percent(&conv.rate, 2)
            )?;
        }
    }
    if m.uncategorized_events > 0 {
        writeln!(
            out,
            "  {} events without a category",
            format_count(m.uncategorized_events)
        )?;
    }

    let rc = &m.revenue_concentration;
    heading(out, "Revenue concentration")?;
    row(out, "Purchasing actors", &format_count(rc.purchasing_actors))?;
    row(
        out,
        &format!("Top {}%", rc.top_percent),
        &format!(
            "{} actors, {} ({})",
            format_count(rc.top_actor_count),
            format_currency(rc.top_revenue),
            format_metric_percent(&rc.top_share, 1)
        ),
    )?;
    row(
        out,
        "Rest",
        &format!(
            "{} actors, {} ({})",
            format_count(rc.purchasing_actors - rc.top_actor_count),
            format_currency(rc.rest_revenue),
            format_metric_percent(&rc.rest_share, 1)
        ),
    )?;
    row(out, "Total revenue", &format_currency(rc.total_revenue))?;

    heading(out, "Top brand by average purchase price")?;
    let leaders = report.brand_prices.leaders();
    if leaders.is_empty() {
        writeln!(out, "  (no branded purchases)")?;
    } else {
        for (category, brand) in leaders {
            writeln!(
                out,
                "  {:<36} {:<16} {:>12} ({} purchases)",
                category.to_string(),
                brand.brand,
                format_currency(brand.average_price),
                format_count(brand.purchases)
            )?;
        }
    }

    writeln!(out)?;
    writeln!(
        out,
        "Generated {} in {}s",
        meta.generated_at,
        format_number(meta.load_time_seconds + meta.compute_time_seconds, 2)
    )?;
    Ok(())
}

fn heading(out: &mut impl Write, title: &str) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{title}")?;
    writeln!(out, "{}", "─".repeat(RULE_WIDTH))
}

fn row(out: &mut impl Write, label: &str, value: &str) -> std::io::Result<()> {
    writeln!(out, "  {:<28} {}", label, value)
}
