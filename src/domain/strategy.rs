//! Decision strategy - book packing.
//!
//! Pure function from a market snapshot and one wallet's state to an
//! ordered list of actions. The orchestrator performs all I/O; nothing
//! here touches the network or the clock.
//!
//! Packing keeps `orders_per_side_per_wallet` resting orders on each side:
//! 1. sides holding more than twice the target are trimmed oldest-first,
//! 2. missing buys are placed, then missing sells,
//! 3. every placement gets a fresh price/size draw and reserves its
//!    margin before the next one is sized.

use rust_decimal::Decimal;

use super::collateral::CollateralBudget;
use super::flow;
use super::market::{Action, MarketMeta, OnChainOrder, Side, TopOfBook};
use super::params::{RunConfig, StrategyMode};
use super::pricing::{crossing_buffer_ticks, draw_size, quote_price, tick_distance};

/// Margin rate used when margin orders are disabled (fully collateralized).
pub const FULL_COLLATERAL_BPS: u32 = 10_000;

/// One wallet's state as seen by the strategy.
#[derive(Debug, Clone, Copy)]
pub struct WalletView<'a> {
    /// Position of the wallet in the configured pool.
    pub wallet_index: usize,
    /// Free collateral reported by the collateral contract.
    pub available_collateral: Decimal,
    /// The wallet's resting orders, freshly read from chain.
    pub open_orders: &'a [OnChainOrder],
}

/// Everything a decision depends on.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub book: &'a TopOfBook,
    pub wallet: WalletView<'a>,
    pub config: &'a RunConfig,
    pub market: &'a MarketMeta,
    /// Per-cycle seed; same seed and inputs give the same actions.
    pub seed: u64,
}

impl DecisionInput<'_> {
    /// Margin rate applied to a new order on `side`.
    pub const fn margin_bps(&self, side: Side) -> u32 {
        if self.config.use_margin_orders {
            self.market.margin_bps(side)
        } else {
            FULL_COLLATERAL_BPS
        }
    }

    /// Fresh collateral budget for this wallet and cycle.
    pub fn budget(&self) -> CollateralBudget {
        CollateralBudget::new(
            self.wallet.available_collateral,
            self.config.max_wallet_utilization_fraction,
            self.wallet.open_orders,
        )
    }
}

/// Decide the actions for one wallet in the configured mode.
pub fn decide(input: &DecisionInput<'_>) -> Vec<Action> {
    match input.config.mode {
        StrategyMode::Packer => pack(input),
        StrategyMode::RandomFlow => vec![flow::decide_flow(input)],
    }
}

/// Orders of one side, oldest first (timestamp, then id).
pub fn oldest_first(orders: &[OnChainOrder], side: Side) -> Vec<&OnChainOrder> {
    let mut side_orders: Vec<&OnChainOrder> = orders.iter().filter(|o| o.side == side).collect();
    side_orders.sort_by_key(|o| (o.timestamp, o.order_id));
    side_orders
}

/// Packing plan for one wallet.
pub fn pack(input: &DecisionInput<'_>) -> Vec<Action> {
    let config = input.config;
    let target = config.orders_per_side_per_wallet as usize;
    let ceiling = target * 2;

    let mut actions = Vec::new();
    let mut counts = [0usize; 2];

    for (slot, side) in [Side::Buy, Side::Sell].into_iter().enumerate() {
        let resting = oldest_first(input.wallet.open_orders, side);
        let excess = resting.len().saturating_sub(ceiling);
        actions.extend(
            resting
                .iter()
                .take(excess)
                .map(|o| Action::CancelOne { order_id: o.order_id }),
        );
        counts[slot] = resting.len() - excess;
    }

    let mut budget = input.budget();
    let buffer = crossing_buffer_ticks(config.min_distance_ticks);

    for (slot, side) in [Side::Buy, Side::Sell].into_iter().enumerate() {
        let current = counts[slot];
        let need = target.saturating_sub(current);
        for k in 0..need {
            let level = (current + k) as u32;
            let distance = tick_distance(config, input.wallet.wallet_index, side, level);
            let price = match quote_price(side, input.book, input.market.tick_size, distance, buffer) {
                Ok(price) => price,
                Err(skip) => {
                    actions.push(Action::skip(format!("{side} level {level}: {skip}")));
                    continue;
                }
            };

            let amount = draw_size(config, input.wallet.wallet_index, level, input.seed ^ side_salt(side));
            let sizing = budget.fit(amount, price, input.margin_bps(side), config.dust_amount);
            let Some((amount, margin)) = sizing.placement() else {
                actions.push(Action::skip(format!("{side} level {level}: below dust after collateral cap")));
                continue;
            };
            budget.reserve(margin);

            actions.push(Action::PlaceLimit {
                side,
                price,
                amount,
                margin: config.use_margin_orders,
            });
        }
    }

    if actions.is_empty() {
        actions.push(Action::skip("book already packed"));
    }
    actions
}

const fn side_salt(side: Side) -> u64 {
    match side {
        Side::Buy => 0x0B0B,
        Side::Sell => 0x5E11,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market() -> MarketMeta {
        MarketMeta {
            market_id: format!("0x{}", "11".repeat(32)),
            symbol: "ETH-USD".into(),
            tick_size: dec!(0.01),
            price_decimals: 6,
            amount_decimals: 18,
            buy_margin_bps: 10_000,
            sell_margin_bps: 15_000,
        }
    }

    fn order(id: u64, side: Side, ts: u64) -> OnChainOrder {
        OnChainOrder {
            order_id: id,
            trader: "0xabc".into(),
            price: dec!(100),
            amount: dec!(0.01),
            side,
            timestamp: ts,
            margin_required: dec!(1),
            is_margin_order: true,
        }
    }

    fn book() -> TopOfBook {
        TopOfBook {
            best_bid: Some(dec!(99)),
            best_ask: Some(dec!(101)),
            mark_price: None,
        }
    }

    fn config() -> RunConfig {
        RunConfig {
            orders_per_side_per_wallet: 2,
            min_distance_ticks: 10,
            max_distance_ticks: 20,
            ..RunConfig::default()
        }
    }

    fn input<'a>(
        book: &'a TopOfBook,
        orders: &'a [OnChainOrder],
        config: &'a RunConfig,
        market: &'a MarketMeta,
    ) -> DecisionInput<'a> {
        DecisionInput {
            book,
            wallet: WalletView {
                wallet_index: 0,
                available_collateral: dec!(10000),
                open_orders: orders,
            },
            config,
            market,
            seed: 7,
        }
    }

    #[test]
    fn test_empty_wallet_places_buys_then_sells() {
        let (book, cfg, market) = (book(), config(), market());
        let actions = decide(&input(&book, &[], &cfg, &market));
        let sides: Vec<Side> = actions
            .iter()
            .filter_map(|a| match a {
                Action::PlaceLimit { side, .. } => Some(*side),
                _ => None,
            })
            .collect();
        assert_eq!(sides, vec![Side::Buy, Side::Buy, Side::Sell, Side::Sell]);
        for action in &actions {
            if let Action::PlaceLimit { side, price, .. } = action {
                match side {
                    Side::Buy => assert!(*price < dec!(101)),
                    Side::Sell => assert!(*price > dec!(99)),
                }
            }
        }
    }

    #[test]
    fn test_full_book_is_skip() {
        let (book, cfg, market) = (book(), config(), market());
        let orders = vec![
            order(1, Side::Buy, 1),
            order(2, Side::Buy, 2),
            order(3, Side::Sell, 3),
            order(4, Side::Sell, 4),
        ];
        let actions = decide(&input(&book, &orders, &cfg, &market));
        assert_eq!(actions.len(), 1);
        assert!(actions[0].is_skip());
    }

    #[test]
    fn test_excess_side_cancelled_oldest_first() {
        let (book, cfg, market) = (book(), config(), market());
        // Five buys against a ceiling of four; oldest is id 9.
        let mut orders: Vec<OnChainOrder> = (1..=4).map(|i| order(i, Side::Buy, 10 + i)).collect();
        orders.push(order(9, Side::Buy, 1));
        orders.push(order(20, Side::Sell, 5));
        orders.push(order(21, Side::Sell, 6));

        let actions = decide(&input(&book, &orders, &cfg, &market));
        assert_eq!(actions[0], Action::CancelOne { order_id: 9 });
        assert!(!actions.iter().any(|a| matches!(a, Action::PlaceLimit { .. })));
    }

    #[test]
    fn test_deterministic_for_same_seed() {
        let (book, cfg, market) = (book(), config(), market());
        let a = decide(&input(&book, &[], &cfg, &market));
        let b = decide(&input(&book, &[], &cfg, &market));
        assert_eq!(a, b);
    }

    #[test]
    fn test_starved_wallet_skips_as_dust() {
        let (book, market) = (book(), market());
        let cfg = RunConfig {
            dust_amount: dec!(1),
            ..config()
        };
        let mut inp = input(&book, &[], &cfg, &market);
        inp.wallet.available_collateral = dec!(1);
        let actions = decide(&inp);
        assert!(actions.iter().all(Action::is_skip));
    }

    #[test]
    fn test_non_margin_orders_use_full_collateral() {
        let (book, market) = (book(), market());
        let cfg = RunConfig {
            use_margin_orders: false,
            ..config()
        };
        let inp = input(&book, &[], &cfg, &market);
        assert_eq!(inp.margin_bps(Side::Sell), FULL_COLLATERAL_BPS);
        let actions = decide(&inp);
        assert!(actions
            .iter()
            .all(|a| !matches!(a, Action::PlaceLimit { margin: true, .. })));
    }
}
