//! Payload handlers dispatched by `Config.app_logic_type`. The default
//! handler implements the original's market-data-to-trading-order trigger;
//! additional handlers register into the same small trait-object registry.

use crate::error::EngineError;
use rustc_hash::FxHashMap;
use std::time::{SystemTime, UNIX_EPOCH};

const MARKET_DATA_LEN: usize = 8 + 4 + 4 + 8;
const ORDER_LEN: usize = 8 + 4 + 4 + 1 + 8 + 16;
const PRICE_TRIGGER_THRESHOLD: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppOutcome {
    Nothing,
    Respond(Vec<u8>),
}

pub trait AppHandler: Send + Sync {
    fn handle(&self, payload: &[u8]) -> Result<AppOutcome, EngineError>;
}

/// Market data record: `symbol[8]`, `price:u32be`, `quantity:u32be`,
/// `timestamp:u64be`. Prices are in hundredths of a currency unit.
struct MarketDataHandler;

impl AppHandler for MarketDataHandler {
    fn handle(&self, payload: &[u8]) -> Result<AppOutcome, EngineError> {
        if payload.len() < MARKET_DATA_LEN {
            return Err(EngineError::Malformed);
        }
        let symbol = &payload[0..8];
        let price = u32::from_be_bytes(payload[8..12].try_into().unwrap());
        if price >= PRICE_TRIGGER_THRESHOLD {
            return Ok(AppOutcome::Nothing);
        }

        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let mut order = Vec::with_capacity(ORDER_LEN);
        order.extend_from_slice(symbol);
        order.extend_from_slice(&(price + 1).to_be_bytes());
        order.extend_from_slice(&100u32.to_be_bytes());
        order.push(0); // side: buy
        order.extend_from_slice(&now_ns.to_be_bytes());
        let cl_ord_id = format!("ORD{now_ns}");
        let mut cl_ord_id_field = [0u8; 16];
        let bytes = cl_ord_id.as_bytes();
        let len = bytes.len().min(16);
        cl_ord_id_field[..len].copy_from_slice(&bytes[..len]);
        order.extend_from_slice(&cl_ord_id_field);

        Ok(AppOutcome::Respond(order))
    }
}

pub struct AppLogicRegistry {
    handlers: FxHashMap<u8, Box<dyn AppHandler>>,
}

impl AppLogicRegistry {
    pub fn new() -> Self {
        let mut handlers: FxHashMap<u8, Box<dyn AppHandler>> = FxHashMap::default();
        handlers.insert(0, Box::new(MarketDataHandler));
        Self { handlers }
    }

    pub fn register(&mut self, app_logic_type: u8, handler: Box<dyn AppHandler>) {
        self.handlers.insert(app_logic_type, handler);
    }

    pub fn dispatch(&self, app_logic_type: u8, payload: &[u8]) -> Result<AppOutcome, EngineError> {
        match self.handlers.get(&app_logic_type) {
            Some(handler) => handler.handle(payload),
            None => Err(EngineError::Config(format!(
                "no app logic handler registered for type {app_logic_type}"
            ))),
        }
    }
}

impl Default for AppLogicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market_data(price: u32) -> Vec<u8> {
        let mut payload = Vec::with_capacity(MARKET_DATA_LEN);
        payload.extend_from_slice(b"AAPL\0\0\0\0");
        payload.extend_from_slice(&price.to_be_bytes());
        payload.extend_from_slice(&500u32.to_be_bytes());
        payload.extend_from_slice(&0u64.to_be_bytes());
        payload
    }

    #[test]
    fn low_price_triggers_a_response() {
        let registry = AppLogicRegistry::new();
        let outcome = registry.dispatch(0, &market_data(9_999)).unwrap();
        match outcome {
            AppOutcome::Respond(order) => {
                assert_eq!(order.len(), ORDER_LEN);
                assert_eq!(&order[0..8], b"AAPL\0\0\0\0");
                let price = u32::from_be_bytes(order[8..12].try_into().unwrap());
                assert_eq!(price, 10_000);
            }
            AppOutcome::Nothing => panic!("expected a response"),
        }
    }

    #[test]
    fn high_price_does_not_trigger() {
        let registry = AppLogicRegistry::new();
        let outcome = registry.dispatch(0, &market_data(20_000)).unwrap();
        assert_eq!(outcome, AppOutcome::Nothing);
    }

    #[test]
    fn short_payload_is_malformed() {
        let registry = AppLogicRegistry::new();
        let err = registry.dispatch(0, &[0u8; 4]).unwrap_err();
        assert_eq!(err, EngineError::Malformed);
    }

    #[test]
    fn unknown_handler_type_is_a_config_error() {
        let registry = AppLogicRegistry::new();
        let err = registry.dispatch(99, &market_data(1)).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
