//! Random-flow strategy.
//!
//! Instead of packing, each wallet performs one weighted random action per
//! cycle. Prices and sizes follow the same non-crossing and collateral
//! rules as the packer, so random flow never crosses the book from a
//! limit order and never exceeds a wallet's budget.

use rust_decimal::Decimal;

use super::collateral::required_margin;
use super::market::{Action, OnChainOrder, Side};
use super::pricing::{crossing_buffer_ticks, draw, draw_size, quote_price, tick_distance};
use super::strategy::DecisionInput;

/// Relative weights of the flow actions.
const WEIGHT_PLACE_LIMIT: u64 = 40;
const WEIGHT_PLACE_MARKET: u64 = 15;
const WEIGHT_MODIFY: u64 = 25;
const WEIGHT_CANCEL: u64 = 20;
const WEIGHT_TOTAL: u64 = WEIGHT_PLACE_LIMIT + WEIGHT_PLACE_MARKET + WEIGHT_MODIFY + WEIGHT_CANCEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowChoice {
    PlaceLimit,
    PlaceMarket,
    Modify,
    Cancel,
}

fn choose(roll: u64) -> FlowChoice {
    let r = roll % WEIGHT_TOTAL;
    if r < WEIGHT_PLACE_LIMIT {
        FlowChoice::PlaceLimit
    } else if r < WEIGHT_PLACE_LIMIT + WEIGHT_PLACE_MARKET {
        FlowChoice::PlaceMarket
    } else if r < WEIGHT_PLACE_LIMIT + WEIGHT_PLACE_MARKET + WEIGHT_MODIFY {
        FlowChoice::Modify
    } else {
        FlowChoice::Cancel
    }
}

/// One weighted random action for the wallet.
///
/// Modify and cancel fall back to a limit placement when the wallet has
/// no resting orders.
pub fn decide_flow(input: &DecisionInput<'_>) -> Action {
    let index = input.wallet.wallet_index;
    let roll = draw(index, 0, input.seed);
    let side = if draw(index, 1, input.seed) % 2 == 0 { Side::Buy } else { Side::Sell };
    let orders = input.wallet.open_orders;

    match choose(roll) {
        FlowChoice::PlaceMarket => place_market(input, side),
        FlowChoice::Modify if !orders.is_empty() => modify_oldest(input, orders),
        FlowChoice::Cancel if !orders.is_empty() => {
            let pick = (draw(index, 2, input.seed) % orders.len() as u64) as usize;
            Action::CancelOne {
                order_id: orders[pick].order_id,
            }
        }
        _ => place_limit(input, side),
    }
}

fn place_limit(input: &DecisionInput<'_>, side: Side) -> Action {
    let config = input.config;
    let index = input.wallet.wallet_index;
    let level = input.wallet.open_orders.iter().filter(|o| o.side == side).count() as u32;
    let distance = tick_distance(config, index, side, level);
    let buffer = crossing_buffer_ticks(config.min_distance_ticks);

    let price = match quote_price(side, input.book, input.market.tick_size, distance, buffer) {
        Ok(price) => price,
        Err(skip) => return Action::skip(format!("{side} limit: {skip}")),
    };
    let amount = draw_size(config, index, level, input.seed);
    match input
        .budget()
        .fit(amount, price, input.margin_bps(side), config.dust_amount)
        .placement()
    {
        Some((amount, _)) => Action::PlaceLimit {
            side,
            price,
            amount,
            margin: config.use_margin_orders,
        },
        None => Action::skip(format!("{side} limit: below dust after collateral cap")),
    }
}

fn place_market(input: &DecisionInput<'_>, side: Side) -> Action {
    let config = input.config;
    let index = input.wallet.wallet_index;
    // A market buy fills against the asks, a market sell against the bids.
    let Some(fill_price) = input.book.best(side.opposite()).or_else(|| input.book.mid()) else {
        return Action::skip(format!("{side} market: no reference price"));
    };
    let amount = draw_size(config, index, u32::MAX, input.seed);
    match input
        .budget()
        .fit(amount, fill_price, input.margin_bps(side), config.dust_amount)
        .placement()
    {
        Some((amount, _)) => Action::PlaceMarket {
            side,
            amount,
            margin: config.use_margin_orders,
        },
        None => Action::skip(format!("{side} market: below dust after collateral cap")),
    }
}

fn modify_oldest(input: &DecisionInput<'_>, orders: &[OnChainOrder]) -> Action {
    let Some(oldest) = orders.iter().min_by_key(|o| (o.timestamp, o.order_id)) else {
        return Action::skip("modify: no resting orders");
    };
    let config = input.config;
    let distance = tick_distance(config, input.wallet.wallet_index, oldest.side, input.seed as u32);
    let buffer = crossing_buffer_ticks(config.min_distance_ticks);
    let price = match quote_price(oldest.side, input.book, input.market.tick_size, distance, buffer) {
        Ok(price) => price,
        Err(skip) => return Action::skip(format!("modify {}: {skip}", oldest.order_id)),
    };
    if price == oldest.price {
        return Action::skip(format!("modify {}: price unchanged", oldest.order_id));
    }

    if oldest.is_margin_order {
        let new_margin = required_margin(oldest.amount, price, input.margin_bps(oldest.side));
        let added = (new_margin - oldest.margin_required).max(Decimal::ZERO);
        if added > input.budget().remaining() {
            return Action::skip(format!("modify {}: exceeds collateral cap", oldest.order_id));
        }
    }

    Action::ModifyOldest {
        order_id: oldest.order_id,
        price,
        amount: oldest.amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{MarketMeta, TopOfBook};
    use crate::domain::params::{RunConfig, StrategyMode};
    use crate::domain::strategy::{decide, WalletView};
    use rust_decimal_macros::dec;

    fn market() -> MarketMeta {
        MarketMeta {
            market_id: format!("0x{}", "22".repeat(32)),
            symbol: "BTC-USD".into(),
            tick_size: dec!(0.01),
            price_decimals: 6,
            amount_decimals: 18,
            buy_margin_bps: 10_000,
            sell_margin_bps: 15_000,
        }
    }

    fn flow_config() -> RunConfig {
        RunConfig {
            mode: StrategyMode::RandomFlow,
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_weights_cover_every_choice() {
        assert_eq!(choose(0), FlowChoice::PlaceLimit);
        assert_eq!(choose(40), FlowChoice::PlaceMarket);
        assert_eq!(choose(55), FlowChoice::Modify);
        assert_eq!(choose(80), FlowChoice::Cancel);
        assert_eq!(choose(99), FlowChoice::Cancel);
    }

    #[test]
    fn test_flow_yields_single_action_without_crossing() {
        let (cfg, market) = (flow_config(), market());
        let book = TopOfBook {
            best_bid: Some(dec!(99)),
            best_ask: Some(dec!(101)),
            mark_price: None,
        };
        for seed in 0..200 {
            let input = DecisionInput {
                book: &book,
                wallet: WalletView {
                    wallet_index: 1,
                    available_collateral: dec!(5000),
                    open_orders: &[],
                },
                config: &cfg,
                market: &market,
                seed,
            };
            let actions = decide(&input);
            assert_eq!(actions.len(), 1);
            match &actions[0] {
                Action::PlaceLimit { side: Side::Buy, price, .. } => assert!(*price < dec!(101)),
                Action::PlaceLimit { side: Side::Sell, price, .. } => assert!(*price > dec!(99)),
                Action::PlaceMarket { .. } | Action::Skip { .. } => {}
                other => panic!("no resting orders, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_modify_targets_oldest_order() {
        let (cfg, market) = (flow_config(), market());
        let book = TopOfBook {
            best_bid: Some(dec!(99)),
            best_ask: Some(dec!(101)),
            mark_price: None,
        };
        let orders = vec![
            OnChainOrder {
                order_id: 5,
                trader: "0xabc".into(),
                price: dec!(95),
                amount: dec!(0.02),
                side: Side::Buy,
                timestamp: 50,
                margin_required: dec!(1.9),
                is_margin_order: true,
            },
            OnChainOrder {
                order_id: 3,
                trader: "0xabc".into(),
                price: dec!(96),
                amount: dec!(0.02),
                side: Side::Buy,
                timestamp: 10,
                margin_required: dec!(1.92),
                is_margin_order: true,
            },
        ];
        let input = DecisionInput {
            book: &book,
            wallet: WalletView {
                wallet_index: 0,
                available_collateral: dec!(5000),
                open_orders: &orders,
            },
            config: &cfg,
            market: &market,
            seed: 3,
        };
        match modify_oldest(&input, &orders) {
            Action::ModifyOldest { order_id, price, amount } => {
                assert_eq!(order_id, 3);
                assert_eq!(amount, dec!(0.02));
                assert!(price < dec!(101));
            }
            other => panic!("expected modify, got {other:?}"),
        }
    }
}
