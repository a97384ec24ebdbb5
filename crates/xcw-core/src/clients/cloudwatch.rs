//! Metric sink backed by the CloudWatch `PutMetricData` API

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{epoch_seconds, MetricDatum, MetricUnit};

use super::http::AwsHttpClient;
use super::MetricSink;

const PUT_METRIC_DATA_TARGET: &str = "GraniteServiceVersion20100801.PutMetricData";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// Records metric data points over HTTP
pub struct CloudWatchMetricSink {
    http: AwsHttpClient,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutMetricDataRequest<'a> {
    namespace: &'a str,
    metric_data: [MetricDataEntry<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MetricDataEntry<'a> {
    metric_name: &'a str,
    timestamp: f64,
    value: f64,
    unit: MetricUnit,
}

impl CloudWatchMetricSink {
    /// Create a metric sink over an HTTP client
    pub fn new(http: AwsHttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MetricSink for CloudWatchMetricSink {
    async fn put_metric(&self, datum: &MetricDatum) -> Result<()> {
        let request = PutMetricDataRequest {
            namespace: &datum.namespace,
            metric_data: [MetricDataEntry {
                metric_name: &datum.metric_name,
                timestamp: epoch_seconds::to_f64(&datum.timestamp),
                value: datum.value,
                unit: datum.unit,
            }],
        };

        let _: serde_json::Value = self
            .http
            .post_target(PUT_METRIC_DATA_TARGET, CONTENT_TYPE, &request)
            .await?;

        Ok(())
    }
}
