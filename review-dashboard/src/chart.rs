//! Horizontal bar charts rendered as inline SVG

use crate::reviews::AggregateView;
use serde::Serialize;

const WIDTH: f64 = 640.0;
const LABEL_WIDTH: f64 = 160.0;
const BAR_HEIGHT: f64 = 26.0;
const BAR_GAP: f64 = 8.0;
const MARGIN: f64 = 16.0;
const AXIS_HEIGHT: f64 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub label: String,
    pub value: f64,
}

/// Chart-ready form of an aggregate view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub color: String,
    pub bars: Vec<Bar>,
}

impl BarChart {
    pub fn new(
        title: impl Into<String>,
        x_label: impl Into<String>,
        y_label: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            color: "skyblue".to_string(),
            bars: Vec::new(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Bars in aggregate order; the first bar is drawn at the bottom
    pub fn with_aggregate(mut self, view: &AggregateView) -> Self {
        self.bars = view
            .entries
            .iter()
            .map(|e| Bar {
                label: e.category.clone(),
                value: e.mean_score,
            })
            .collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Render to a standalone SVG element. Empty charts render a placeholder.
    pub fn to_svg(&self) -> String {
        let plot_width = WIDTH - LABEL_WIDTH - 2.0 * MARGIN;
        let rows = self.bars.len().max(1) as f64;
        let plot_height = rows * (BAR_HEIGHT + BAR_GAP);
        let height = plot_height + AXIS_HEIGHT + 2.0 * MARGIN;

        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" role="img" aria-label="{title}">"#,
            w = WIDTH,
            h = height,
            title = escape(&self.title)
        );

        if self.bars.is_empty() {
            svg.push_str(&format!(
                r#"<text x="{x}" y="{y}" text-anchor="middle" class="empty">No data</text>"#,
                x = WIDTH / 2.0,
                y = MARGIN + plot_height / 2.0
            ));
            svg.push_str("</svg>");
            return svg;
        }

        // Axis always spans zero so negative scores grow leftwards
        let min = self.bars.iter().map(|b| b.value).fold(0.0_f64, f64::min);
        let max = self.bars.iter().map(|b| b.value).fold(0.0_f64, f64::max);
        let span = if max - min > f64::EPSILON { max - min } else { 1.0 };
        let scale = |v: f64| LABEL_WIDTH + MARGIN + (v - min) / span * plot_width;
        let zero_x = scale(0.0);

        // Drawn top-down, so reverse to put the first bar at the bottom
        for (row, bar) in self.bars.iter().rev().enumerate() {
            let y = MARGIN + row as f64 * (BAR_HEIGHT + BAR_GAP);
            let end_x = scale(bar.value);
            let (x, width) = if end_x >= zero_x {
                (zero_x, end_x - zero_x)
            } else {
                (end_x, zero_x - end_x)
            };

            svg.push_str(&format!(
                r#"<text x="{lx}" y="{ty}" text-anchor="end" class="label">{label}</text>"#,
                lx = LABEL_WIDTH + MARGIN - 6.0,
                ty = y + BAR_HEIGHT * 0.7,
                label = escape(&bar.label)
            ));
            svg.push_str(&format!(
                r#"<rect x="{x:.2}" y="{y}" width="{width:.2}" height="{h}" fill="{color}"><title>{label}: {value}</title></rect>"#,
                h = BAR_HEIGHT,
                color = escape(&self.color),
                label = escape(&bar.label),
                value = bar.value
            ));
        }

        let axis_y = MARGIN + plot_height;
        svg.push_str(&format!(
            r#"<line x1="{x}" y1="{top}" x2="{x}" y2="{axis_y}" class="zero"/>"#,
            x = zero_x,
            top = MARGIN
        ));
        svg.push_str(&format!(
            r#"<text x="{x0}" y="{ty}" class="tick">{min:.2}</text><text x="{x1}" y="{ty}" text-anchor="end" class="tick">{max:.2}</text>"#,
            x0 = LABEL_WIDTH + MARGIN,
            x1 = LABEL_WIDTH + MARGIN + plot_width,
            ty = axis_y + 14.0
        ));
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" text-anchor="middle" class="axis">{label}</text>"#,
            x = LABEL_WIDTH + MARGIN + plot_width / 2.0,
            y = axis_y + 32.0,
            label = escape(&self.x_label)
        ));
        svg.push_str(&format!(
            r#"<text x="12" y="{y}" transform="rotate(-90 12 {y})" text-anchor="middle" class="axis">{label}</text>"#,
            y = MARGIN + plot_height / 2.0,
            label = escape(&self.y_label)
        ));
        svg.push_str("</svg>");
        svg
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reviews::AggregateEntry;

    fn view(entries: &[(&str, f64)]) -> AggregateView {
        AggregateView {
            entries: entries
                .iter()
                .map(|(category, mean)| AggregateEntry {
                    category: category.to_string(),
                    mean_score: *mean,
                    count: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn test_empty_chart_renders_placeholder() {
        let chart = BarChart::new(
            "Average Sentiment by Delivery Status",
            "Sentiment Score",
            "Delivery Status",
        )
        .with_aggregate(&AggregateView::default());

        assert!(chart.is_empty());
        let svg = chart.to_svg();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("No data"));
        assert!(!svg.contains("<rect"));
    }

    #[test]
    fn test_bars_follow_aggregate_order() {
        let chart = BarChart::new("t", "x", "y")
            .with_aggregate(&view(&[("Late", -0.2), ("On time", 0.6)]));
        assert_eq!(chart.bars[0].label, "Late");
        assert_eq!(chart.bars[1].value, 0.6);

        let svg = chart.to_svg();
        assert_eq!(svg.matches("<rect").count(), 2);
        // Highest score drawn first (top of the chart)
        assert!(svg.find("On time").unwrap() < svg.find("Late").unwrap());
    }

    #[test]
    fn test_labels_are_escaped() {
        let chart =
            BarChart::new("t", "x", "y").with_aggregate(&view(&[("Boots <XL> & more", 0.1)]));
        let svg = chart.to_svg();
        assert!(svg.contains("Boots &lt;XL&gt; &amp; more"));
        assert!(!svg.contains("<XL>"));
    }

    #[test]
    fn test_single_zero_bar_does_not_divide_by_zero() {
        let chart = BarChart::new("t", "x", "y").with_aggregate(&view(&[("Flat", 0.0)]));
        let svg = chart.to_svg();
        assert!(!svg.contains("NaN"));
        assert!(!svg.contains("inf"));
    }
}
