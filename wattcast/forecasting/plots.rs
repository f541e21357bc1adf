use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::ForecastResult,
    importance::ImportanceRecord,
    interpret::{InterpretationOutcome, ShapSummary},
};

/// Bars drawn per chart when none is configured.
pub const DEFAULT_PLOT_FEATURES: usize = 10;

/// File name of the coefficient chart.
pub const IMPORTANCE_PLOT: &str = "feature_importance.svg";

/// File name of the attribution chart.
pub const SHAP_PLOT: &str = "shap_summary.svg";

const WIDTH: f64 = 960.0;
const ROW_HEIGHT: f64 = 32.0;
const LABEL_WIDTH: f64 = 180.0;
const VALUE_WIDTH: f64 = 110.0;
const PADDING: f64 = 24.0;
const TITLE_HEIGHT: f64 = 48.0;
const AXIS_HEIGHT: f64 = 40.0;

const INCREASES: &str = "#22c55e";
const DECREASES: &str = "#ef4444";
const ATTRIBUTION: &str = "#4f46e5";

/// One horizontal bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    /// Feature name shown left of the bar.
    pub label: String,
    /// Signed length.
    pub value: f64,
    /// Fill colour.
    pub color: &'static str,
}

/// Horizontal bar chart rendered as a standalone SVG document.
#[derive(Debug, Clone, PartialEq)]
pub struct BarChart {
    /// Heading above the bars.
    pub title: String,
    /// Caption under the value axis.
    pub axis_label: String,
    /// Bars top to bottom.
    pub bars: Vec<Bar>,
}

impl BarChart {
    /// Signed coefficients of the strongest `limit` ranked features, green when
    /// the feature increases consumption and red when it decreases it.
    #[must_use]
    pub fn coefficients(records: &[ImportanceRecord], limit: usize) -> Self {
        let bars = records
            .iter()
            .take(limit)
            .map(|record| Bar {
                label: record.feature.clone(),
                value: record.coefficient,
                color: if record.coefficient >= 0.0 {
                    INCREASES
                } else {
                    DECREASES
                },
            })
            .collect::<Vec<_>>();
        Self {
            title: format!("Top {} Feature Importance (Ridge Regression Coefficients)", bars.len()),
            axis_label: "Coefficient Value".into(),
            bars,
        }
    }

    /// Mean absolute attributions of the strongest `limit` features.
    #[must_use]
    pub fn attributions(summary: &ShapSummary, limit: usize) -> Self {
        Self {
            title: format!(
                "SHAP Feature Importance - Ridge Regression ({} samples)",
                summary.sample_size
            ),
            axis_label: "mean(|SHAP value|)".into(),
            bars: summary
                .features
                .iter()
                .take(limit)
                .map(|importance| Bar {
                    label: importance.feature.clone(),
                    value: importance.mean_abs,
                    color: ATTRIBUTION,
                })
                .collect(),
        }
    }

    /// Renders the chart; the zero line sits where the value range crosses it.
    #[must_use]
    pub fn render(&self) -> String {
        #[allow(clippy::cast_precision_loss)]
        let rows = self.bars.len().max(1) as f64;
        let height = rows.mul_add(ROW_HEIGHT, TITLE_HEIGHT + AXIS_HEIGHT + PADDING);
        let plot_left = PADDING + LABEL_WIDTH;
        let plot_width = WIDTH - plot_left - VALUE_WIDTH - PADDING;

        let (low, high) = self
            .bars
            .iter()
            .filter(|bar| bar.value.is_finite())
            .fold((0.0_f64, 0.0_f64), |(low, high), bar| {
                (low.min(bar.value), high.max(bar.value))
            });
        let span = if high - low > 0.0 { high - low } else { 1.0 };
        let to_x = |value: f64| ((value - low) / span).mul_add(plot_width, plot_left);
        let zero = to_x(0.0);
        let plot_bottom = rows.mul_add(ROW_HEIGHT, TITLE_HEIGHT);

        let mut svg = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{height}" viewBox="0 0 {WIDTH} {height}" font-family="sans-serif">"#
        );
        let _ = writeln!(
            svg,
            r##"  <rect x="0" y="0" width="{WIDTH}" height="{height}" fill="#ffffff"/>"##
        );
        let _ = writeln!(
            svg,
            r#"  <text x="{}" y="{}" text-anchor="middle" font-size="16" font-weight="bold">{}</text>"#,
            WIDTH / 2.0,
            TITLE_HEIGHT / 2.0 + 6.0,
            escape(&self.title)
        );

        for (row, bar) in self.bars.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let top = (row as f64).mul_add(ROW_HEIGHT, TITLE_HEIGHT);
            let centre = top + ROW_HEIGHT / 2.0;
            let value = if bar.value.is_finite() { bar.value } else { 0.0 };
            let end = to_x(value);
            let (x, width) = if end >= zero {
                (zero, end - zero)
            } else {
                (end, zero - end)
            };
            let _ = writeln!(svg, r#"  <g class="bar">"#);
            let _ = writeln!(
                svg,
                r#"    <text x="{}" y="{}" text-anchor="end" font-size="12">{}</text>"#,
                plot_left - 8.0,
                centre + 4.0,
                escape(&bar.label)
            );
            let _ = writeln!(
                svg,
                r#"    <rect x="{x:.2}" y="{:.2}" width="{width:.2}" height="{:.2}" fill="{}" fill-opacity="0.7"><title>{}: {:.4}</title></rect>"#,
                top + 4.0,
                ROW_HEIGHT - 8.0,
                bar.color,
                escape(&bar.label),
                bar.value
            );
            let _ = writeln!(
                svg,
                r#"    <text x="{:.2}" y="{}" font-size="11">{:.4}</text>"#,
                x + width + 6.0,
                centre + 4.0,
                bar.value
            );
            let _ = writeln!(svg, "  </g>");
        }

        let _ = writeln!(
            svg,
            r#"  <line x1="{zero:.2}" y1="{TITLE_HEIGHT}" x2="{zero:.2}" y2="{plot_bottom}" stroke="black" stroke-width="0.8"/>"#
        );
        let _ = writeln!(
            svg,
            r#"  <text x="{:.2}" y="{}" text-anchor="middle" font-size="12" font-weight="bold">{}</text>"#,
            plot_left + plot_width / 2.0,
            plot_bottom + AXIS_HEIGHT - 12.0,
            escape(&self.axis_label)
        );
        svg.push_str("</svg>\n");
        svg
    }
}

/// Writes the coefficient chart, plus the attribution chart when attributions
/// were computed, into `dir`. Returns the written paths.
pub fn write_plots(
    dir: &Path,
    records: &[ImportanceRecord],
    interpretation: &InterpretationOutcome,
    limit: usize,
) -> ForecastResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let path = dir.join(IMPORTANCE_PLOT);
    fs::write(&path, BarChart::coefficients(records, limit).render())?;
    written.push(path);

    if let InterpretationOutcome::Computed(summary) = interpretation {
        let path = dir.join(SHAP_PLOT);
        fs::write(&path, BarChart::attributions(summary, limit).render())?;
        written.push(path);
    }
    Ok(written)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{importance, interpret::ShapImportance, model::FittedModel};
    use indexmap::IndexMap;
    use tempfile::tempdir;

    fn records() -> Vec<ImportanceRecord> {
        let coefficients: IndexMap<String, f64> = (0..12)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                (format!("f{i:02}"), sign * f64::from(i + 1))
            })
            .collect();
        importance::rank(&FittedModel::from_parts(0.0, coefficients, 1.0).unwrap())
    }

    #[test]
    fn coefficient_chart_keeps_top_features_and_colours_by_sign() {
        let chart = BarChart::coefficients(&records(), DEFAULT_PLOT_FEATURES);
        assert_eq!(chart.bars.len(), 10);
        assert_eq!(chart.bars[0].label, "f11");
        assert_eq!(chart.bars[0].color, DECREASES);
        assert_eq!(chart.bars[1].label, "f10");
        assert_eq!(chart.bars[1].color, INCREASES);
        assert!(chart.title.starts_with("Top 10 "));

        let svg = chart.render();
        assert!(svg.starts_with("<svg "));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(svg.matches(r#"<g class="bar">"#).count(), 10);
        assert!(!svg.contains(">f00<"));
    }

    #[test]
    fn labels_are_escaped() {
        let chart = BarChart {
            title: "a < b".into(),
            axis_label: "x & y".into(),
            bars: vec![Bar {
                label: "T<\"1\">".into(),
                value: f64::NAN,
                color: ATTRIBUTION,
            }],
        };
        let svg = chart.render();
        assert!(svg.contains("a &lt; b"));
        assert!(svg.contains("x &amp; y"));
        assert!(svg.contains("T&lt;&quot;1&quot;&gt;"));
        assert!(!svg.contains("NaN\""));
    }

    #[test]
    fn attribution_chart_is_written_only_when_computed() {
        let dir = tempdir().unwrap();
        let skipped = InterpretationOutcome::SkippedByDesign {
            reason: "not built".into(),
        };
        let written = write_plots(&dir.path().join("plots"), &records(), &skipped, 5).unwrap();
        assert_eq!(written, vec![dir.path().join("plots").join(IMPORTANCE_PLOT)]);
        assert!(!dir.path().join("plots").join(SHAP_PLOT).exists());

        let computed = InterpretationOutcome::Computed(ShapSummary {
            sample_size: 50,
            seed: 42,
            features: vec![
                ShapImportance {
                    feature: "hour_sin".into(),
                    mean_abs: 12.5,
                },
                ShapImportance {
                    feature: "rv1".into(),
                    mean_abs: 0.5,
                },
            ],
        });
        let written = write_plots(dir.path(), &records(), &computed, 5).unwrap();
        assert_eq!(written.len(), 2);
        let svg = fs::read_to_string(dir.path().join(SHAP_PLOT)).unwrap();
        assert!(svg.contains("hour_sin"));
        assert!(svg.contains("50 samples"));
        assert_eq!(svg.matches(r#"<g class="bar">"#).count(), 2);
    }
}
