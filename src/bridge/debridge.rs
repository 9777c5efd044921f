// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! DeBridge gate client for cross-chain transfer execution.
//!
//! The gate exposes two entrypoints this service needs: `getDebridge` for
//! the per-token transfer parameters and `send` for initiating a transfer.
//! Moving ERC-20 value through the gate additionally requires an allowance
//! approval on the token contract before `send`.

use std::collections::HashMap;

use alloy::{
    network::{Ethereum, EthereumWallet},
    primitives::{keccak256, Address, Bytes, TxHash, B256, U256},
    providers::{
        fillers::{
            BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller,
            WalletFiller,
        },
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    signers::local::PrivateKeySigner,
    sol,
};
use tracing::info;

use super::types::{BridgeTokenParams, BridgeTxStatus, Chain, TransferSubmission, DEBRIDGE_GATE};
use super::{Bridge, BridgeError, RetryPolicy};

// Define the DeBridge gate interface using alloy's sol! macro
sol! {
    #[sol(rpc)]
    interface IDeBridgeGate {
        function send(
            bytes32 _debridgeId,
            uint256 _amount,
            uint256 _chainIdTo,
            address _receiver,
            bytes _permit,
            bool _useAssetFee,
            uint32 _referralCode,
            bytes _autoParams
        ) external payable returns (bytes32);

        function getDebridge(bytes32 _debridgeId) external view returns (
            uint256 minAmount,
            uint256 maxAmount,
            uint256 fee,
            uint256 collectedFees,
            uint256 supply,
            uint256 chainId,
            address tokenAddress,
            uint256 minReserves,
            uint256 maxReserves,
            bool isNative,
            bool isEnabled
        );
    }
}

// ERC-20 surface needed for gate allowance management
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

/// Read-only HTTP provider type (with all fillers).
type ReadProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// Signing HTTP provider type (read fillers plus a wallet filler).
type SignerProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider<Ethereum>,
>;

/// Compute the gate's asset identifier for a token on a chain:
/// `keccak256(abi.encodePacked(uint256 chainId, address token))`.
pub fn debridge_id(chain: Chain, token: Address) -> B256 {
    let mut packed = Vec::with_capacity(32 + 20);
    packed.extend_from_slice(&U256::from(chain.id()).to_be_bytes::<32>());
    packed.extend_from_slice(token.as_slice());
    keccak256(&packed)
}

/// DeBridge gate client over the supported chains.
pub struct DebridgeGateway {
    /// Read providers per chain, for parameter and status queries.
    providers: HashMap<Chain, ReadProvider>,
    /// RPC endpoints per chain, for building per-request signing providers.
    rpc_urls: HashMap<Chain, url::Url>,
    /// Retry policy for read calls and the allowance approval.
    retry: RetryPolicy,
}

impl DebridgeGateway {
    /// Create a gateway for the given per-chain RPC endpoints.
    pub fn new(rpc_urls: &HashMap<Chain, String>) -> Result<Self, BridgeError> {
        let mut providers = HashMap::new();
        let mut urls = HashMap::new();

        for chain in Chain::ALL {
            let raw = rpc_urls
                .get(&chain)
                .ok_or_else(|| BridgeError::InvalidRpcUrl(format!("missing RPC URL for {chain}")))?;
            let url: url::Url = raw
                .parse()
                .map_err(|e: url::ParseError| BridgeError::InvalidRpcUrl(e.to_string()))?;

            providers.insert(chain, ProviderBuilder::new().connect_http(url.clone()));
            urls.insert(chain, url);
        }

        Ok(Self {
            providers,
            rpc_urls: urls,
            retry: RetryPolicy::default(),
        })
    }

    fn provider(&self, chain: Chain) -> &ReadProvider {
        // Constructor guarantees an entry per supported chain.
        &self.providers[&chain]
    }

    /// Create a signer from a private key (hex string, optional 0x prefix).
    fn create_signer(private_key_hex: &str) -> Result<PrivateKeySigner, BridgeError> {
        let trimmed = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);
        let key_bytes =
            alloy::hex::decode(trimmed).map_err(|_| BridgeError::InvalidPrivateKey)?;
        PrivateKeySigner::from_slice(&key_bytes).map_err(|_| BridgeError::InvalidPrivateKey)
    }

    /// Build a signing provider for one broadcast sequence.
    fn signer_provider(&self, chain: Chain, signer: PrivateKeySigner) -> SignerProvider {
        let wallet = EthereumWallet::from(signer);
        ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.rpc_urls[&chain].clone())
    }

    /// Ensure the gate's allowance covers `total_debit`, approving if needed.
    async fn ensure_allowance(
        &self,
        provider: &SignerProvider,
        token: Address,
        owner: Address,
        total_debit: U256,
    ) -> Result<(), BridgeError> {
        let erc20 = IERC20::new(token, provider.clone());

        let allowance = self
            .retry
            .run("erc20_allowance", || async {
                erc20
                    .allowance(owner, DEBRIDGE_GATE)
                    .call()
                    .await
                    .map_err(|e| BridgeError::Rpc(e.to_string()))
            })
            .await?;

        if allowance >= total_debit {
            return Ok(());
        }

        // approve() sets an absolute allowance, so a retried approval after
        // an ambiguous timeout converges to the same state.
        self.retry
            .run("erc20_approve", || async {
                let pending = erc20
                    .approve(DEBRIDGE_GATE, total_debit)
                    .send()
                    .await
                    .map_err(|e| BridgeError::Rpc(e.to_string()))?;
                let receipt = pending
                    .get_receipt()
                    .await
                    .map_err(|e| BridgeError::Rpc(e.to_string()))?;
                if !receipt.status() {
                    return Err(BridgeError::TransactionFailed(
                        "allowance approval reverted".to_string(),
                    ));
                }
                Ok(())
            })
            .await
    }
}

impl Bridge for DebridgeGateway {
    async fn token_params(
        &self,
        chain: Chain,
        token: Address,
    ) -> Result<BridgeTokenParams, BridgeError> {
        let gate = IDeBridgeGate::new(DEBRIDGE_GATE, self.provider(chain).clone());
        let id = debridge_id(chain, token);

        let info = self
            .retry
            .run("get_debridge", || async {
                gate.getDebridge(id)
                    .call()
                    .await
                    .map_err(|e| BridgeError::Contract(e.to_string()))
            })
            .await?;

        Ok(BridgeTokenParams {
            min_amount: info.minAmount,
            max_amount: info.maxAmount,
            fee_bps: info.fee,
            is_enabled: info.isEnabled,
        })
    }

    async fn send_transfer(
        &self,
        from_chain: Chain,
        to_chain: Chain,
        token: Address,
        amount: U256,
        total_debit: U256,
        receiver: Address,
        private_key_hex: &str,
    ) -> Result<TransferSubmission, BridgeError> {
        let signer = Self::create_signer(private_key_hex)?;
        let sender = signer.address();
        let provider = self.signer_provider(from_chain, signer);

        self.ensure_allowance(&provider, token, sender, total_debit)
            .await?;

        let gate = IDeBridgeGate::new(DEBRIDGE_GATE, provider);
        let id = debridge_id(from_chain, token);

        info!(
            %sender,
            from_chain = %from_chain,
            to_chain = %to_chain,
            amount = %amount,
            "Initiating bridge transfer"
        );

        // The send is broadcast exactly once: a retry after an ambiguous
        // timeout could move value twice. An in-flight send that times out
        // is left for reconciliation to resolve.
        let pending = tokio::time::timeout(
            self.retry.attempt_timeout,
            gate.send(
                id,
                amount,
                U256::from(to_chain.id()),
                receiver,
                Bytes::default(),
                false,
                0u32,
                Bytes::default(),
            )
            .send(),
        )
        .await
        .map_err(|_| BridgeError::Timeout("gate_send"))?
        .map_err(|e| BridgeError::TransactionFailed(e.to_string()))?;

        let transaction_hash = format!("{:?}", pending.tx_hash());
        info!(tx_hash = %transaction_hash, "Bridge transfer broadcast");

        Ok(TransferSubmission {
            transaction_hash,
            bridge_transfer_id: id.to_string(),
        })
    }

    async fn transfer_status(
        &self,
        chain: Chain,
        transaction_hash: &str,
    ) -> Result<BridgeTxStatus, BridgeError> {
        let hash: TxHash = transaction_hash
            .parse()
            .map_err(|_| BridgeError::InvalidAddress(format!("bad tx hash: {transaction_hash}")))?;

        let provider = self.provider(chain);
        let receipt = self
            .retry
            .run("get_receipt", || async {
                provider
                    .get_transaction_receipt(hash)
                    .await
                    .map_err(|e| BridgeError::Rpc(e.to_string()))
            })
            .await?;

        Ok(match receipt {
            None => BridgeTxStatus::Processing,
            Some(r) if r.status() => BridgeTxStatus::Confirmed,
            Some(_) => BridgeTxStatus::Reverted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn debridge_id_is_deterministic() {
        let token = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
        let a = debridge_id(Chain::Polygon, token);
        let b = debridge_id(Chain::Polygon, token);
        assert_eq!(a, b);
    }

    #[test]
    fn debridge_id_differs_per_chain_and_token() {
        let usdc = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
        let usdt = address!("c2132D05D31c914a87C6611C10748AEb04B58e8F");
        assert_ne!(
            debridge_id(Chain::Polygon, usdc),
            debridge_id(Chain::Arbitrum, usdc)
        );
        assert_ne!(
            debridge_id(Chain::Polygon, usdc),
            debridge_id(Chain::Polygon, usdt)
        );
    }

    #[test]
    fn create_signer_accepts_prefixed_and_bare_hex() {
        let key = "4c0883a69102937d6231471b5dbb6204fe512961708279feb1be6ae5538da033";
        let bare = DebridgeGateway::create_signer(key).unwrap();
        let prefixed = DebridgeGateway::create_signer(&format!("0x{key}")).unwrap();
        assert_eq!(bare.address(), prefixed.address());
    }

    #[test]
    fn create_signer_rejects_garbage() {
        assert!(matches!(
            DebridgeGateway::create_signer("not-hex"),
            Err(BridgeError::InvalidPrivateKey)
        ));
        assert!(matches!(
            DebridgeGateway::create_signer("abcd"),
            Err(BridgeError::InvalidPrivateKey)
        ));
    }

    #[test]
    fn gateway_requires_all_chain_urls() {
        let mut urls = HashMap::new();
        urls.insert(Chain::Ethereum, "https://eth.example.com".to_string());
        // polygon and arbitrum missing
        assert!(matches!(
            DebridgeGateway::new(&urls),
            Err(BridgeError::InvalidRpcUrl(_))
        ));
    }
}
