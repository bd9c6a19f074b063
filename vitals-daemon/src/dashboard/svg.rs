//! SVG sparkline rendering.
//!
//! Draws one fixed-size polyline per series snapshot. When the ring is not
//! yet full the line is right-aligned so fresh data always touches the right
//! edge.

/// Sparkline canvas settings.
#[derive(Debug, Clone)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub background: String,
    pub stroke: String,
    pub stroke_width: f64,
    /// Lower bound of the y axis; extended by the data when it dips below.
    pub y_min: f64,
    /// Upper bound of the y axis; extended by the data when it exceeds it.
    pub y_max: f64,
    /// Expected point count of a full ring, used for right alignment.
    pub max_count: usize,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            title: String::new(),
            background: "white".to_string(),
            stroke: "rgba(30,90,160,0.85)".to_string(),
            stroke_width: 1.5,
            y_min: 0.0,
            y_max: 0.0,
            max_count: 0,
        }
    }

    /// Build the polyline path for the given values.
    pub fn path(&self, values: &[f64]) -> String {
        if values.is_empty() {
            return String::new();
        }
        let mut min = self.y_min;
        let mut max = self.y_max;
        for v in values {
            min = min.min(*v);
            max = max.max(*v);
        }
        let width = f64::from(self.width) - 2.0;
        let height = f64::from(self.height) - 2.0;
        let (x_offset, x_width) = if self.max_count > values.len() {
            let offset = width / self.max_count as f64 * (self.max_count - values.len()) as f64;
            (offset, width - offset)
        } else {
            (0.0, width)
        };

        let mut path = String::new();
        for (i, v) in values.iter().enumerate() {
            let x = x_offset + (i + 1) as f64 / values.len() as f64 * x_width;
            let y = if max > min { (v - min) / (max - min) } else { 0.0 };
            let cmd = if i == 0 { 'M' } else { 'L' };
            path.push_str(&format!("{cmd}{:.2} {:.2} ", x, (1.0 - y) * height + 1.0));
        }
        path.trim_end().to_string()
    }

    /// Render the full SVG document.
    pub fn render(&self, values: &[f64]) -> String {
        let path = self.path(values);
        format!(
            concat!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" "#,
                r#"viewBox="0 0 {w} {h}">"#,
                r#"<rect width="{w}" height="{h}" fill="{bg}"/>"#,
                r#"<path d="{path}" fill="none" stroke="{stroke}" stroke-width="{sw}" "#,
                r#"stroke-linecap="round" stroke-linejoin="round"/>"#,
                r#"<text x="4" y="12" font-family="sans-serif" font-size="10" "#,
                r##"fill="#333">{title}</text>"##,
                "</svg>"
            ),
            w = self.width,
            h = self.height,
            bg = self.background,
            path = path,
            stroke = self.stroke,
            sw = self.stroke_width,
            title = escape(&self.title),
        )
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
