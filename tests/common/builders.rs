//! Test data builders for creating bridges

use linebridge::{BridgeConfig, LineBridge, ScriptedLink, StopToken};

/// Builder for a bridge over a scripted device with fast timings
pub struct BridgeBuilder {
    config: BridgeConfig,
    token: Option<StopToken>,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        let mut config = BridgeConfig::default();
        config.device.port = "mock0".to_string();
        config.bridge.read_timeout_ms = 5;
        config.bridge.retry_base_ms = 1;
        config.bridge.retry_max_ms = 5;
        Self {
            config,
            token: None,
        }
    }

    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.bridge.read_timeout_ms = ms;
        self
    }

    pub fn retry_ms(mut self, base: u64, max: u64) -> Self {
        self.config.bridge.retry_base_ms = base;
        self.config.bridge.retry_max_ms = max;
        self
    }

    pub fn max_line_length(mut self, len: usize) -> Self {
        self.config.bridge.max_line_length = len;
        self
    }

    pub fn token(mut self, token: StopToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Build the bridge and return it with a handle to drive the device
    pub fn build(self) -> (LineBridge, ScriptedLink) {
        let device = ScriptedLink::new();
        let bridge = match self.token {
            Some(token) => LineBridge::with_token(device.clone(), self.config, token),
            None => LineBridge::new(device.clone(), self.config),
        };
        (bridge, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_builder() {
        let (bridge, device) = BridgeBuilder::new().read_timeout_ms(7).build();
        assert_eq!(bridge.config().bridge.read_timeout_ms, 7);
        assert_eq!(bridge.config().device.port, "mock0");
        assert!(!device.is_device_open());
    }
}
