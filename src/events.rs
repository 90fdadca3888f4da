// 11.0: every state change produces an event. used for audit trails and for the ledger to
// surface what a transaction did. events of a failed operation never leave the engine.

use crate::liquidation::LiquidationKind;
use crate::types::{Address, Pair, Price, Quote, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    // Market events
    MarketCreated(MarketCreatedEvent),
    FundingRateUpdated(FundingRateUpdatedEvent),

    // Position events
    PositionOpened(PositionOpenedEvent),
    PositionChanged(PositionChangedEvent),
    PositionClosed(PositionClosedEvent),
    FundingSettled(FundingSettledEvent),
    MarginChanged(MarginChangedEvent),

    // Risk events
    PositionLiquidated(PositionLiquidatedEvent),
    BadDebt(BadDebtEvent),
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::MarketCreated(_) => "market_created",
            EventPayload::FundingRateUpdated(_) => "funding_rate_updated",
            EventPayload::PositionOpened(_) => "position_opened",
            EventPayload::PositionChanged(_) => "position_changed",
            EventPayload::PositionClosed(_) => "position_closed",
            EventPayload::FundingSettled(_) => "funding_settled",
            EventPayload::MarginChanged(_) => "margin_changed",
            EventPayload::PositionLiquidated(_) => "position_liquidated",
            EventPayload::BadDebt(_) => "bad_debt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCreatedEvent {
    pub pair: Pair,
    pub base_reserve: Decimal,
    pub quote_reserve: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRateUpdatedEvent {
    pub pair: Pair,
    pub epoch: u64,
    pub mark_price: Price,
    pub index_price: Price,
    pub premium_fraction: Decimal,
    pub cumulative_premium_fraction: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub trader: Address,
    pub pair: Pair,
    pub side: Side,
    pub size: Decimal,
    pub margin: Quote,
    pub open_notional: Quote,
    pub exchange_fee: Quote,
    pub mark_price: Price,
}

/// Increase or partial decrease of an open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionChangedEvent {
    pub trader: Address,
    pub pair: Pair,
    /// Signed base change: positive grows the position.
    pub size_delta: Decimal,
    pub exchanged_quote: Quote,
    pub realized_pnl: Quote,
    pub exchange_fee: Quote,
    pub new_size: Decimal,
    pub new_margin: Quote,
    pub mark_price: Price,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub trader: Address,
    pub pair: Pair,
    pub side: Side,
    pub size: Decimal,
    pub exchanged_quote: Quote,
    pub realized_pnl: Quote,
    pub exchange_fee: Quote,
    pub payout: Quote,
    pub bad_debt: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingSettledEvent {
    pub trader: Address,
    pub pair: Pair,
    /// Positive = the position paid.
    pub payment: Quote,
    pub funding_index: Decimal,
    pub margin_after: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginChangedEvent {
    pub trader: Address,
    pub pair: Pair,
    pub delta: Quote,
    pub new_margin: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub trader: Address,
    pub liquidator: Address,
    pub pair: Pair,
    pub kind: LiquidationKind,
    pub size_liquidated: Decimal,
    pub exchanged_quote: Quote,
    pub realized_pnl: Quote,
    pub liquidation_fee: Quote,
    pub liquidator_reward: Quote,
    pub ecosystem_fund_share: Quote,
    pub margin_ratio_before: Decimal,
    /// `None` once the position is gone.
    pub margin_ratio_after: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadDebtEvent {
    pub trader: Address,
    pub pair: Pair,
    pub amount: Quote,
    pub ecosystem_fund_after: Quote,
}

pub trait EventEmitter {
    fn emit(&mut self, event: Event);
}

/// Bounded audit buffer. The oldest events fall off once `capacity` is reached.
#[derive(Debug)]
pub struct EventCollector {
    events: VecDeque<Event>,
    next_id: u64,
    capacity: usize,
}

impl EventCollector {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 1,
            capacity,
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Appends events staged by a committed operation, numbering them in order.
    pub fn extend(&mut self, timestamp: Timestamp, payloads: Vec<EventPayload>) {
        for payload in payloads {
            let event = Event::new(self.next_id(), timestamp, payload);
            self.emit(event);
        }
    }
}

impl EventEmitter for EventCollector {
    fn emit(&mut self, event: Event) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn margin_event(delta: Decimal) -> EventPayload {
        EventPayload::MarginChanged(MarginChangedEvent {
            trader: Address::sample(1),
            pair: "NIBI:USDN".parse().unwrap(),
            delta: Quote::new(delta),
            new_margin: Quote::new(dec!(100) + delta),
        })
    }

    #[test]
    fn event_collector() {
        let mut collector = EventCollector::new(10);
        let event = Event::new(collector.next_id(), Timestamp::from_millis(1000), margin_event(dec!(5)));

        collector.emit(event);
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.events().next().unwrap().id, EventId(1));
    }

    #[test]
    fn extend_numbers_in_order() {
        let mut collector = EventCollector::new(10);
        collector.extend(
            Timestamp::from_millis(5),
            vec![margin_event(dec!(1)), margin_event(dec!(2)), margin_event(dec!(3))],
        );

        let ids: Vec<u64> = collector.events().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(collector.events().all(|e| e.timestamp == Timestamp::from_millis(5)));
    }

    #[test]
    fn buffer_is_bounded() {
        let mut collector = EventCollector::new(2);
        collector.extend(
            Timestamp::from_millis(0),
            vec![margin_event(dec!(1)), margin_event(dec!(2)), margin_event(dec!(3))],
        );

        assert_eq!(collector.len(), 2);
        let ids: Vec<u64> = collector.events().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn payload_kinds() {
        assert_eq!(margin_event(dec!(1)).kind(), "margin_changed");
        let json = serde_json::to_string(&margin_event(dec!(1))).unwrap();
        assert!(json.contains("MarginChanged"));
    }
}
