use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IOriginWrappedETH {
        function denomination() external view returns (uint256);
        function getLastRoot() external view returns (bytes32);

        function deposit(bytes32 commitment) external payable;
        function releaseFunds(address payable recipient, uint256 amount) external;

        event Deposit(bytes32 indexed commitment, uint32 leafIndex, bytes32 root);
    }

    #[sol(rpc)]
    interface IDestinationWrappedETH {
        function isKnownRoot(bytes32 root) external view returns (bool);
        function isSpent(bytes32 nullifierHash) external view returns (bool);
        function balanceOf(address account) external view returns (uint256);

        function submitRoot(bytes32 root) external;

        function withdraw(
            bytes calldata proof,
            bytes32 root,
            bytes32 nullifierHash,
            address payable recipient,
            address payable relayer,
            uint256 fee,
            uint256 refund
        ) external payable;

        function reclaim(address recipient, uint256 amount) external;
        function transfer(address recipient, uint256 amount) external returns (bool);

        event Reclaim(address recipient, uint256 amount);
    }
}
