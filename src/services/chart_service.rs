use chrono::{DateTime, Duration, SecondsFormat, Utc};
use plotters::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{ChartSettings, Settings};
use crate::models::{ChangeBar, PriceObservation, PricePoint, PriceSeries};
use crate::services::history_service;
use crate::utils::errors::RenderError;
use crate::utils::html::{escape_html, escape_script_json};
use crate::utils::{format_change, format_price, Table};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
const SNAPSHOT_SIZE: (u32, u32) = (1000, 480);
/// Series with at most this many points are drawn with markers
const MARKER_THRESHOLD: usize = 3;

/// What a successful render produced
#[derive(Debug, Clone)]
pub struct DashboardSummary {
    pub output_path: PathBuf,
    pub series_count: usize,
    pub point_count: usize,
}

/// Group history rows into one series per asset, in order of first appearance.
/// Rows recorded in a currency other than the configured one get their own series.
pub fn build_series(history: &[PriceObservation], settings: &Settings) -> Vec<PriceSeries> {
    let mut series: Vec<PriceSeries> = Vec::new();

    for observation in history {
        let position = series
            .iter()
            .position(|s| s.asset_id == observation.asset_id && s.currency == observation.currency);

        let index = match position {
            Some(index) => index,
            None => {
                let base_label = settings.label_for(&observation.asset_id);
                let label = if observation.currency == settings.currency {
                    base_label.to_string()
                } else {
                    format!("{} ({})", base_label, observation.currency.to_uppercase())
                };
                series.push(PriceSeries {
                    asset_id: observation.asset_id.clone(),
                    label,
                    color: settings.color_for(&observation.asset_id).map(str::to_string),
                    currency: observation.currency.clone(),
                    points: Vec::new(),
                });
                series.len() - 1
            }
        };

        series[index].points.push(PricePoint {
            timestamp: observation.timestamp,
            price: observation.price,
        });
    }

    series
}

/// Average percentage change across all series at every timestamp
pub fn change_bars(series: &[PriceSeries]) -> Vec<ChangeBar> {
    let mut by_timestamp: BTreeMap<DateTime<Utc>, (f64, usize)> = BTreeMap::new();

    for s in series {
        for (point, change) in s.points.iter().zip(s.pct_changes()) {
            let entry = by_timestamp.entry(point.timestamp).or_insert((0.0, 0));
            entry.0 += change;
            entry.1 += 1;
        }
    }

    by_timestamp
        .into_iter()
        .map(|(timestamp, (sum, count))| ChangeBar {
            timestamp,
            avg_pct: sum / count as f64,
        })
        .collect()
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Plotly figure (`{data, layout}`) for the price series, their moving
/// averages and the average change bars
pub fn build_figure(
    series: &[PriceSeries],
    bars: &[ChangeBar],
    chart: &ChartSettings,
    currency: &str,
) -> Value {
    let mut traces = Vec::new();

    for s in series {
        let x: Vec<String> = s.points.iter().map(|p| format_timestamp(&p.timestamp)).collect();
        let mode = if s.points.len() <= MARKER_THRESHOLD {
            "lines+markers"
        } else {
            "lines"
        };

        let mut line = json!({ "width": 2 });
        if let Some(color) = &s.color {
            line["color"] = json!(color);
        }

        traces.push(json!({
            "type": "scatter",
            "name": s.label,
            "legendgroup": s.asset_id,
            "meta": { "role": "price", "asset_id": s.asset_id, "currency": s.currency },
            "x": x,
            "y": s.prices(),
            "mode": mode,
            "line": line,
        }));

        for window in &chart.ma_windows {
            traces.push(json!({
                "type": "scatter",
                "name": format!("{} MA{}", s.label, window),
                "legendgroup": s.asset_id,
                "meta": { "role": "moving_average", "asset_id": s.asset_id, "window": window },
                "x": x,
                "y": s.moving_average(*window),
                "mode": "lines",
                "line": { "width": 1, "dash": "dot" },
            }));
        }
    }

    if !bars.is_empty() {
        traces.push(json!({
            "type": "bar",
            "name": "Δ% average",
            "meta": { "role": "change" },
            "x": bars.iter().map(|b| format_timestamp(&b.timestamp)).collect::<Vec<_>>(),
            "y": bars.iter().map(|b| b.avg_pct).collect::<Vec<_>>(),
            "yaxis": "y2",
            "opacity": 0.25,
        }));
    }

    let grid = "rgba(255,255,255,0.06)";
    json!({
        "data": traces,
        "layout": {
            "title": { "text": chart.title },
            "plot_bgcolor": chart.theme_bg,
            "paper_bgcolor": chart.theme_bg,
            "font": { "color": chart.theme_fg },
            "legend": { "orientation": "h", "y": -0.2 },
            "margin": { "l": 40, "r": 20, "t": 60, "b": 100 },
            "height": 580,
            "xaxis": { "type": "date", "gridcolor": grid },
            "yaxis": { "title": { "text": format!("Price ({})", currency.to_uppercase()) }, "gridcolor": grid },
            "yaxis2": {
                "title": { "text": "Δ% (bar)" },
                "overlaying": "y",
                "side": "right",
                "gridcolor": grid,
                "showgrid": false,
            },
        },
    })
}

/// "Latest values" table: last price and change vs. the previous point
pub fn latest_table(series: &[PriceSeries]) -> Table {
    let mut table = Table::new(vec!["Asset", "Last price", "Δ% vs previous"]);
    for s in series {
        if let Some(last) = s.last() {
            table.add_row(vec![
                s.label.clone(),
                format_price(last.price, &s.currency),
                format_change(s.last_change()),
            ]);
        }
    }
    table
}

fn parse_hex_color(hex: &str) -> Option<RGBColor> {
    let hex = hex.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

fn plot_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::Plot(e.to_string())
}

/// Static SVG of the price series, for readers without JavaScript
pub fn render_static_svg(
    series: &[PriceSeries],
    chart_settings: &ChartSettings,
    currency: &str,
) -> Result<String, RenderError> {
    let points: Vec<&PricePoint> = series.iter().flat_map(|s| s.points.iter()).collect();
    if points.is_empty() {
        return Err(RenderError::Plot("no points to draw".to_string()));
    }

    let min_price = points.iter().map(|p| p.price).fold(f64::INFINITY, f64::min);
    let max_price = points.iter().map(|p| p.price).fold(f64::NEG_INFINITY, f64::max);

    // Add some padding to the price range
    let price_range = (max_price - min_price).max(1e-8);
    let padding = price_range * 0.1;
    let y_min = (min_price - padding).max(0.0);
    let y_max = max_price + padding;

    let mut x_min = points.iter().map(|p| p.timestamp).min().unwrap_or_else(Utc::now);
    let mut x_max = points.iter().map(|p| p.timestamp).max().unwrap_or(x_min);
    if x_max <= x_min {
        x_min = x_min - Duration::hours(1);
        x_max = x_max + Duration::hours(1);
    }

    let background = parse_hex_color(&chart_settings.theme_bg).unwrap_or(WHITE);
    let foreground = parse_hex_color(&chart_settings.theme_fg).unwrap_or(BLACK);
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, SNAPSHOT_SIZE).into_drawing_area();
        root.fill(&background).map_err(plot_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                &chart_settings.title,
                ("sans-serif", 24).into_font().color(&foreground),
            )
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)
            .map_err(plot_err)?;

        chart
            .configure_mesh()
            .y_desc(format!("Price ({})", currency.to_uppercase()))
            .x_desc("Time")
            .x_label_formatter(&|t: &DateTime<Utc>| t.format("%m-%d %H:%M").to_string())
            .axis_style(foreground)
            .label_style(("sans-serif", 12).into_font().color(&foreground))
            .light_line_style(foreground.mix(0.05))
            .bold_line_style(foreground.mix(0.1))
            .draw()
            .map_err(plot_err)?;

        for (i, s) in series.iter().enumerate() {
            let color = s
                .color
                .as_deref()
                .and_then(parse_hex_color)
                .unwrap_or_else(|| {
                    let (r, g, b) = Palette99::pick(i).rgb();
                    RGBColor(r, g, b)
                });

            chart
                .draw_series(LineSeries::new(
                    s.points.iter().map(|p| (p.timestamp, p.price)),
                    color.stroke_width(2),
                ))
                .map_err(plot_err)?
                .label(s.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));

            if s.points.len() <= MARKER_THRESHOLD {
                chart
                    .draw_series(
                        s.points
                            .iter()
                            .map(|p| Circle::new((p.timestamp, p.price), 3, color.filled())),
                    )
                    .map_err(plot_err)?;
            }
        }

        chart
            .configure_series_labels()
            .background_style(background.mix(0.8))
            .border_style(foreground)
            .label_font(("sans-serif", 12).into_font().color(&foreground))
            .draw()
            .map_err(plot_err)?;

        root.present().map_err(plot_err)?;
    }

    Ok(svg)
}

/// Complete, self-contained dashboard page
pub fn render_html(
    settings: &Settings,
    series: &[PriceSeries],
    bars: &[ChangeBar],
    generated_at: DateTime<Utc>,
) -> Result<String, RenderError> {
    let chart = &settings.chart;
    let figure = build_figure(series, bars, chart, &settings.currency);
    let figure_json = escape_script_json(&serde_json::to_string(&figure)?);
    let table_html = latest_table(series).render_html();

    let snapshot = if chart.static_snapshot {
        match render_static_svg(series, chart, &settings.currency) {
            Ok(svg) => format!("<noscript>\n{}\n</noscript>", svg),
            Err(e) => {
                warn!("Static chart snapshot skipped: {}", e);
                String::new()
            }
        }
    } else {
        String::new()
    };

    let title = escape_html(&chart.title);
    let bg = escape_html(&chart.theme_bg);
    let fg = escape_html(&chart.theme_fg);

    Ok(format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>{title}</title>
<script src="{cdn}" charset="utf-8"></script>
<style>
  body{{margin:0;background:{bg};color:{fg};font-family:system-ui,-apple-system,Segoe UI,Roboto,Arial,sans-serif}}
  .wrap{{max-width:1100px;margin:24px auto;padding:0 16px}}
  .card{{background:#15192b;border:1px solid #26304a;border-radius:14px;padding:14px;box-shadow:0 10px 24px rgba(0,0,0,.25)}}
  h1{{font-size:1.4rem;margin:0 0 12px}}
  table.latest{{width:100%;border-collapse:collapse}}
  table.latest th,table.latest td{{text-align:left;padding:6px 8px;border-bottom:1px solid #26304a}}
  footer{{opacity:.7;margin:18px 0}}
</style>
</head>
<body>
  <div class="wrap">
    <h1>{title}</h1>
    <div class="card">
      <div id="price-chart"></div>
      {snapshot}
    </div>
    <div class="card" style="margin-top:14px">
      {table_html}
    </div>
    <footer>Generated {generated} UTC</footer>
  </div>
<script id="price-figure" type="application/json">{figure_json}</script>
<script>
  (function () {{
    var figure = JSON.parse(document.getElementById("price-figure").textContent);
    if (window.Plotly) {{
      Plotly.newPlot("price-chart", figure.data, figure.layout, {{responsive: true}});
    }}
  }})();
</script>
</body>
</html>
"#,
        title = title,
        cdn = PLOTLY_CDN,
        bg = bg,
        fg = fg,
        snapshot = snapshot,
        table_html = table_html,
        generated = generated_at.format("%Y-%m-%d %H:%M:%S"),
        figure_json = figure_json,
    ))
}

/// Write `content` next to `path` first, then move it into place
fn write_atomically(path: &Path, content: &str) -> Result<(), RenderError> {
    let io_err = |source: std::io::Error| RenderError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dashboard.html".to_string());
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    fs::write(&tmp_path, content).map_err(io_err)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_err(e));
    }
    Ok(())
}

/// Load the history at `settings.csv_path` and write the dashboard to
/// `settings.html_output_path`. The history file is only read.
pub fn render_dashboard(settings: &Settings) -> Result<DashboardSummary, RenderError> {
    let history = history_service::load_history(&settings.csv_path)?;
    let series = build_series(&history, settings);
    let bars = change_bars(&series);
    debug!("Built {} series and {} change bars", series.len(), bars.len());

    let html = render_html(settings, &series, &bars, Utc::now())?;
    write_atomically(&settings.html_output_path, &html)?;

    let summary = DashboardSummary {
        output_path: settings.html_output_path.clone(),
        series_count: series.len(),
        point_count: series.iter().map(|s| s.points.len()).sum(),
    };
    info!(
        "🎨 Dashboard written to {} ({} series, {} points)",
        summary.output_path.display(),
        summary.series_count,
        summary.point_count
    );

    Ok(summary)
}
