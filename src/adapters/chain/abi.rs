//! Contract bindings generated with `sol!`.

use alloy::sol;

sol! {
    /// Order as stored by the order-book contract.
    #[derive(Debug)]
    struct BookOrder {
        uint256 orderId;
        address trader;
        uint256 price;
        uint256 amount;
        bool isBuy;
        uint256 timestamp;
        uint256 nextOrderId;
        uint256 marginRequired;
        bool isMarginOrder;
    }

    #[sol(rpc)]
    interface IOrderBook {
        function getUserOrders(address trader) external view returns (uint256[] orderIds);
        function getOrder(uint256 orderId) external view returns (BookOrder order);
        function bestBid() external view returns (uint256 price);
        function bestAsk() external view returns (uint256 price);
        function calculateMarkPrice() external view returns (uint256 price);
    }

    #[sol(rpc)]
    interface ICollateralVault {
        function getAvailableCollateral(address user) external view returns (uint256 available);
    }

    #[sol(rpc)]
    interface IDepositReceiver {
        function processDeposit(bytes32 depositId, address recipient, uint256 amount) external;
        function processedDeposits(bytes32 depositId) external view returns (bool processed, address recipient, uint256 amount);
    }
}
