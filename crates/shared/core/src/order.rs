//! Outbound order surface
//!
//! The strategy runtime emits `OrderRequest` records; routing them to an
//! actual order gateway is an external collaborator's concern.

use crate::segment::Segment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    /// +1 for long exposure, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// Order message handed to the external order gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub segment: Segment,
    pub token: u32,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: u32,
    pub limit_price: Option<f64>,
    pub product_type: String,
}

impl OrderRequest {
    pub fn market(segment: Segment, token: u32, side: OrderSide, quantity: u32) -> Self {
        Self {
            segment,
            token,
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            product_type: "NRML".to_string(),
        }
    }

    pub fn limit(
        segment: Segment,
        token: u32,
        side: OrderSide,
        quantity: u32,
        price: f64,
    ) -> Self {
        Self {
            segment,
            token,
            side,
            order_type: OrderType::Limit,
            quantity,
            limit_price: Some(price),
            product_type: "NRML".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_helpers() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.sign(), -1.0);
        assert_eq!(OrderSide::Buy.as_str(), "BUY");
    }

    #[test]
    fn test_market_order() {
        let o = OrderRequest::market(Segment::NseFo, 49508, OrderSide::Buy, 50);
        assert_eq!(o.order_type, OrderType::Market);
        assert_eq!(o.limit_price, None);
        assert_eq!(o.product_type, "NRML");
    }
}
