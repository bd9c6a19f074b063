//! Built-in HTTP dashboard.
//!
//! Serves the metric panels page, the snapshot JSON API, per-ring SVG
//! thumbnails and the health endpoint. Reader errors map to 404 at this
//! boundary; everything else is a 500.

use crate::health::HealthChecker;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use vitals_core::{Collector, VitalsError};

pub mod middleware;
pub mod svg;

/// Shared state of every dashboard handler.
#[derive(Clone)]
pub struct Dashboard {
    pub collector: Collector,
    pub health: HealthChecker,
    pub page_title: String,
    /// Route of the dashboard page.
    pub mount_path: String,
    /// Thumbnail refresh period in seconds.
    pub refresh_secs: u64,
}

impl Dashboard {
    pub fn new(collector: Collector, health: HealthChecker) -> Self {
        Self {
            collector,
            health,
            page_title: "vitals".to_string(),
            mount_path: "/".to_string(),
            refresh_secs: 5,
        }
    }

    /// Build the router, with every request metered back into the collector.
    pub fn router(self) -> Router {
        let meter = middleware::ServerMeter::new(self.collector.sender());
        let mount_path =
            if self.mount_path.starts_with('/') { self.mount_path.clone() } else { "/".to_string() };
        Router::new()
            .route(&mount_path, get(page))
            .route("/api/metrics", get(list_metrics))
            .route("/api/metrics/{name}/{index}", get(metric_snapshot))
            .route("/chart/{name}/{index}", get(metric_chart))
            .route("/healthz", get(healthz))
            .layer(axum::middleware::from_fn_with_state(meter, middleware::track))
            .with_state(self)
    }
}

#[derive(Debug)]
struct ApiError(VitalsError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            VitalsError::MetricNotFound { .. } | VitalsError::IndexOutOfRange { .. } => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

impl From<VitalsError> for ApiError {
    fn from(err: VitalsError) -> Self {
        Self(err)
    }
}

async fn list_metrics(State(dash): State<Dashboard>) -> Json<Vec<String>> {
    Json(dash.collector.publish_names().await)
}

async fn metric_snapshot(
    State(dash): State<Dashboard>,
    Path((name, index)): Path<(String, usize)>,
) -> Result<Response, ApiError> {
    let snapshot = dash.collector.snapshot(&name, index).await?;
    Ok(Json(snapshot).into_response())
}

async fn metric_chart(
    State(dash): State<Dashboard>,
    Path((name, index)): Path<(String, usize)>,
) -> Result<Response, ApiError> {
    let snapshot = dash.collector.snapshot(&name, index).await?;
    let unit = dash.collector.metric_type(&name).await?.unit();
    let title = dash
        .collector
        .series_ids()
        .get(index)
        .map(|id| id.title().to_string())
        .unwrap_or_default();

    let field = snapshot.values.last().map(|v| v.default_field()).unwrap_or("value");
    let values = snapshot.field_values(field);
    let last = values.last().copied().unwrap_or_default();

    let mut canvas = svg::Canvas::new(240, 100);
    canvas.title = format!("{name} ({title}) {}", unit.format(last, 1));
    canvas.max_count = snapshot.max_count;
    let body = canvas.render(&values);
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], body).into_response())
}

async fn healthz(State(dash): State<Dashboard>) -> Response {
    let health = dash.health.get_health().await;
    let status = if dash.health.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health)).into_response()
}

/// Percent-encode one path segment. Metric names may contain `/` (disk
/// mount points), which must not split the route.
fn encode_segment(name: &str) -> String {
    name.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b':' => {
                char::from(b).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

async fn page(State(dash): State<Dashboard>) -> Html<String> {
    let names = dash.collector.publish_names().await;
    let series: Vec<String> =
        dash.collector.series_ids().iter().map(|id| id.title().to_string()).collect();

    let mut panels = String::new();
    for name in &names {
        let encoded = encode_segment(name);
        panels.push_str("<div class=\"panel\">\n");
        for (index, title) in series.iter().enumerate() {
            panels.push_str(&format!(
                "  <img data-src=\"/chart/{encoded}/{index}\" src=\"/chart/{encoded}/{index}\" \
                 alt=\"{name} {title}\" title=\"{name} ({title})\">\n"
            ));
        }
        panels.push_str("</div>\n");
    }
    if names.is_empty() {
        panels.push_str("<p class=\"empty\">No metrics published yet.</p>\n");
    }

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
  body {{ font-family: sans-serif; margin: 1em; background: #f6f7f8; }}
  h1 {{ font-size: 1.2em; }}
  .grid {{ display: flex; flex-wrap: wrap; gap: 10px; }}
  .panel {{ background: white; border-radius: 4px; padding: 6px;
            box-shadow: 2px 2px 5px rgba(0,0,0,0.1); }}
  .panel img {{ display: block; margin-bottom: 4px; }}
  .empty {{ color: #777; }}
</style>
</head>
<body>
<h1>{title}</h1>
<div class="grid">
{panels}</div>
<script>
  setInterval(function() {{
    document.querySelectorAll('img[data-src]').forEach(function(img) {{
      img.src = img.dataset.src + '?t=' + Date.now();
    }});
  }}, {refresh_ms});
</script>
</body>
</html>
"#,
        title = dash.page_title,
        panels = panels,
        refresh_ms = dash.refresh_secs * 1000,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vitals_core::{Gather, MetricType, SeriesId, Unit};

    async fn dashboard_with_metric() -> Dashboard {
        let collector = Collector::builder()
            .series(SeriesId::new("1s", "1 sec.", Duration::from_secs(1), 3).unwrap())
            .build()
            .unwrap();
        collector.start().await.unwrap();
        let mut g = Gather::new("test", 100);
        g.add("cpu:percent", 42.0, MetricType::Gauge(Unit::Percent));
        collector.sender().send(g).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        Dashboard::new(collector, HealthChecker::new())
    }

    #[tokio::test]
    async fn test_snapshot_handler_found_and_missing() {
        let dash = dashboard_with_metric().await;

        let ok = metric_snapshot(
            State(dash.clone()),
            Path(("cpu:percent".to_string(), 0)),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(ok.status(), StatusCode::OK);

        let missing = metric_snapshot(State(dash.clone()), Path(("no:such".to_string(), 0)))
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let bad_index = metric_snapshot(
            State(dash.clone()),
            Path(("cpu:percent".to_string(), 9)),
        )
        .await
        .unwrap_err()
        .into_response();
        assert_eq!(bad_index.status(), StatusCode::NOT_FOUND);
        dash.collector.stop().await;
    }

    #[tokio::test]
    async fn test_chart_handler_returns_svg() {
        let dash = dashboard_with_metric().await;
        let response = metric_chart(
            State(dash.clone()),
            Path(("cpu:percent".to_string(), 0)),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/svg+xml"
        );
        dash.collector.stop().await;
    }

    #[tokio::test]
    async fn test_page_lists_published_metrics() {
        let dash = dashboard_with_metric().await;
        let Html(body) = page(State(dash.clone())).await;
        assert!(body.contains("/chart/cpu:percent/0"));
        dash.collector.stop().await;
    }

    #[test]
    fn test_encode_segment_keeps_colons_escapes_slashes() {
        assert_eq!(encode_segment("vitals:cpu:percent"), "vitals:cpu:percent");
        assert_eq!(encode_segment("vitals:disk:/:used"), "vitals:disk:%2F:used");
    }
}
