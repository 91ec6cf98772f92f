//! Solidity definitions of the calls made while wiring the guild contracts.

use alloy_sol_types::sol;

sol! {
    /// Upgradeable contracts without initializer arguments.
    interface IInitializable {
        function initialize() external;
    }

    interface IPermissionRegistry {
        function setETHPermissionDelay(address from, uint256 delayTime) external;
    }

    interface IGuildRegistry {
        event AddGuild(address guildAddress);
        event RemoveGuild(address guildAddress);

        function addGuild(address guildAddress) external;
        function getGuildsAddresses() external view returns (address[] memory);
    }

    interface IERC20SnapshotRep {
        function initialize(string memory name, string memory symbol) external;
        function mint(address account, uint256 amount) external;
        function transferOwnership(address newOwner) external;
    }

    interface ISnapshotRepERC20Guild {
        function initialize(
            address token,
            uint256 proposalTime,
            uint256 timeForExecution,
            uint256 votingPowerPercentageForProposalExecution,
            uint256 votingPowerPercentageForProposalCreation,
            string memory name,
            uint256 voteGas,
            uint256 maxGasPrice,
            uint256 maxActiveProposals,
            uint256 lockTime,
            address permissionRegistry
        ) external;
    }
}
