use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct CompileMetrics {
    pub frames_sent: IntCounter,
    pub persist_frames_sent: IntCounter,
    /// Entities compiled, labelled by provisioning stage.
    pub entities_compiled: IntCounterVec,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub config: CompileMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let frames_sent = IntCounter::new("mcm_frames_sent", "Total configuration frames sent")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let persist_frames_sent = IntCounter::new(
            "mcm_persist_frames_sent",
            "Commit-to-storage frames among those sent",
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let entities_compiled = IntCounterVec::new(
            Opts::new("mcm_entities_compiled", "Configuration entities compiled"),
            &["stage"],
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let config = CompileMetrics {
            frames_sent,
            persist_frames_sent,
            entities_compiled,
        };
        let _ = registry.register(Box::new(config.frames_sent.clone()));
        let _ = registry.register(Box::new(config.persist_frames_sent.clone()));
        let _ = registry.register(Box::new(config.entities_compiled.clone()));
        Ok(Self { registry, config })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_as_text() {
        let hub = MetricsHub::new().unwrap();
        hub.config.frames_sent.inc_by(3);
        hub.config
            .entities_compiled
            .with_label_values(&["cards"])
            .inc();
        let text = hub.encode_text();
        assert!(text.contains("mcm_frames_sent 3"));
        assert!(text.contains("mcm_entities_compiled{stage=\"cards\"} 1"));
    }
}
