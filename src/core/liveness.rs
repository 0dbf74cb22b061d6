use crate::common::error::{FaceGateError, Result};
use crate::common::LivenessConfig;
use crate::core::capabilities::{FaceRegion, LivenessGate};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::io::Cursor;
use std::time::Duration;

/// HTTP adapter for the external liveness-verification service. Posts the
/// face crop as base64 JPEG and reads back a liveness probability. All
/// timeouts are bounded; a slow or unreachable service surfaces as
/// `LivenessUnavailable` rather than blocking the caller.
pub struct HttpLivenessGate {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpLivenessGate {
    pub fn new(config: &LivenessConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms.max(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();

        Self {
            agent,
            endpoint: config.endpoint.clone(),
        }
    }
}

impl LivenessGate for HttpLivenessGate {
    fn check(&self, region: &FaceRegion) -> Result<f32> {
        if self.endpoint.is_empty() {
            return Err(FaceGateError::LivenessUnavailable(
                "no liveness endpoint configured".into(),
            ));
        }

        let mut jpeg = Vec::new();
        region
            .image
            .write_to(&mut Cursor::new(&mut jpeg), image::ImageOutputFormat::Jpeg(90))?;
        let payload = serde_json::json!([{
            "image": BASE64.encode(&jpeg),
            "image_type": "BASE64",
        }]);

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_json(payload)
            .map_err(|e| match e {
                ureq::Error::Status(status, _) => {
                    FaceGateError::LivenessUnavailable(format!("HTTP status {}", status))
                }
                ureq::Error::Transport(t) => FaceGateError::LivenessUnavailable(t.to_string()),
            })?;

        let body: serde_json::Value = response
            .into_json()
            .map_err(|e| FaceGateError::LivenessUnavailable(format!("bad response: {}", e)))?;

        let probability = body
            .get("result")
            .and_then(|r| r.get("face_list"))
            .and_then(|l| l.get(0))
            .and_then(|f| f.get("face_probability"))
            .and_then(|p| p.as_f64());

        match probability {
            Some(p) if (0.0..=1.0).contains(&p) => Ok(p as f32),
            Some(p) => Err(FaceGateError::LivenessUnavailable(format!(
                "probability out of range: {}",
                p
            ))),
            None => Err(FaceGateError::LivenessUnavailable(
                "missing face_probability in response".into(),
            )),
        }
    }
}
