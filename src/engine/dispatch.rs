//! Message entry point for the host ledger.

use super::core::Engine;
use super::results::{EngineError, MsgResponse};
use crate::msgs::{AddressValidator, Bech32Style, Msg};
use crate::store::KvStore;

impl<S: KvStore> Engine<S> {
    pub fn validator(&self) -> &Bech32Style {
        &self.validator
    }

    /// Validates `msg` with the engine's own address rules and routes it.
    pub fn deliver(&mut self, msg: Msg) -> Result<MsgResponse, EngineError> {
        let validator = self.validator.clone();
        self.deliver_with(msg, &validator)
    }

    /// Same as [`Engine::deliver`] with a host-supplied address check.
    pub fn deliver_with(&mut self, msg: Msg, validator: &dyn AddressValidator) -> Result<MsgResponse, EngineError> {
        match msg {
            Msg::OpenPosition(m) => {
                let req = m.validate_basic(validator)?;
                self.open_position(req).map(MsgResponse::Position)
            }
            Msg::IncreasePosition(m) => {
                let req = m.validate_basic(validator)?;
                self.increase_position(req).map(MsgResponse::Position)
            }
            Msg::DecreasePosition(m) => {
                let req = m.validate_basic(validator)?;
                self.decrease_position(req).map(MsgResponse::Position)
            }
            Msg::ClosePosition(m) => {
                let req = m.validate_basic(validator)?;
                self.close_position(req).map(MsgResponse::Position)
            }
            Msg::Liquidate(m) => {
                let req = m.validate_basic(validator)?;
                self.liquidate(req).map(MsgResponse::Liquidation)
            }
            Msg::AddMargin(m) => {
                let req = m.validate_basic(validator)?;
                self.add_margin(req).map(MsgResponse::Margin)
            }
            Msg::RemoveMargin(m) => {
                let req = m.validate_basic(validator)?;
                self.remove_margin(req).map(MsgResponse::Margin)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::market::MarketParams;
    use crate::msgs::{MsgClosePosition, MsgOpenPosition};
    use crate::types::{Address, Quote, Side};
    use rust_decimal_macros::dec;

    fn engine() -> Engine {
        let config = EngineConfig {
            address_prefix: Some("nibi".to_string()),
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config);
        engine
            .add_market("NIBI:USDN".parse().unwrap(), dec!(1_000_000), dec!(1_000_000), MarketParams::default())
            .unwrap();
        engine
    }

    fn open_msg(sender: &Address) -> Msg {
        Msg::OpenPosition(MsgOpenPosition {
            sender: sender.to_string(),
            token_pair: "NIBI:USDN".to_string(),
            side: Side::BUY,
            quote_asset_amount: "100".to_string(),
            leverage: "10".to_string(),
            base_asset_amount_limit: "1".to_string(),
        })
    }

    #[test]
    fn open_then_close_through_messages() {
        let mut engine = engine();
        let trader = Address::sample(1);
        engine.deposit(&trader, Quote::new(dec!(100))).unwrap();

        let opened = engine.deliver(open_msg(&trader)).unwrap();
        assert!(matches!(opened, MsgResponse::Position(ref r) if r.position.is_some()));

        let closed = engine
            .deliver(Msg::ClosePosition(MsgClosePosition {
                sender: trader.to_string(),
                token_pair: "NIBI:USDN".to_string(),
            }))
            .unwrap();
        assert!(matches!(closed, MsgResponse::Position(ref r) if r.position.is_none()));
    }

    #[test]
    fn foreign_prefix_rejected() {
        let mut engine = engine();
        let stranger = Address::new("cosmos1qpzry9x8gf2tvdw0s3jn54khce6mua7l");
        let err = engine.deliver(open_msg(&stranger)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAddress(_)));
        assert_eq!(engine.events().count(), 1);
    }

    #[test]
    fn msg_json_roundtrip_and_dispatch() {
        let mut engine = engine();
        let trader = Address::sample(2);
        engine.deposit(&trader, Quote::new(dec!(100))).unwrap();

        let text = serde_json::to_string(&open_msg(&trader)).unwrap();
        assert!(text.contains("\"type\":\"open_position\""));
        let msg: Msg = serde_json::from_str(&text).unwrap();
        assert!(engine.deliver(msg).is_ok());
    }
}
