//! EIP-1559 transaction signing and nonce sequencing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::eips::eip2930::AccessList;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use anyhow::{Context, Result};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::rpc::{RpcClient, RpcResult};

/// Fields of an EIP-1559 transaction prior to signing.
/// Invariant: `max_fee_per_gas >= max_priority_fee_per_gas`.
#[derive(Debug, Clone)]
pub struct TxFields {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Signing wallet around a 32-byte secp256k1 key. The address is derived
/// from the public key at construction; signing is fatal-at-startup on a bad
/// key, never at execution time.
pub struct Wallet {
    signer: PrivateKeySigner,
    address: Address,
}

impl Wallet {
    /// Parse a hex private key (with or without `0x` prefix).
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .trim_start_matches("0x")
            .parse()
            .context("invalid private key")?;
        let address = signer.address();
        Ok(Self { signer, address })
    }

    /// The signer's 20-byte address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign the given fields as a typed EIP-1559 transaction and return the
    /// raw `0x02`-prefixed envelope as 0x-hex, ready for
    /// `eth_sendRawTransaction`.
    pub fn sign_eip1559(&self, fields: &TxFields) -> Result<String> {
        let tx = TxEip1559 {
            chain_id: fields.chain_id,
            nonce: fields.nonce,
            gas_limit: fields.gas_limit,
            max_fee_per_gas: fields.max_fee_per_gas,
            max_priority_fee_per_gas: fields.max_priority_fee_per_gas,
            to: TxKind::Call(fields.to),
            value: fields.value,
            access_list: AccessList::default(),
            input: fields.data.clone(),
        };
        let signature = self.signer.sign_hash_sync(&tx.signature_hash())?;
        let envelope = TxEnvelope::Eip1559(tx.into_signed(signature));
        Ok(format!("0x{}", alloy::hex::encode(envelope.encoded_2718())))
    }
}

/// Process-lifetime nonce counter. Initialized once from the chain's
/// `pending` transaction count, then advanced atomically; `reset` exists for
/// external recovery after a sequencer desync.
pub struct NonceManager {
    rpc: Arc<RpcClient>,
    address: Address,
    current: AtomicU64,
    init: OnceCell<()>,
}

impl NonceManager {
    pub fn new(rpc: Arc<RpcClient>, address: Address) -> Self {
        Self {
            rpc,
            address,
            current: AtomicU64::new(0),
            init: OnceCell::new(),
        }
    }

    async fn ensure_init(&self) -> RpcResult<()> {
        self.init
            .get_or_try_init(|| async {
                let n = self.rpc.transaction_count(self.address, "pending").await?;
                self.current.store(n, Ordering::SeqCst);
                info!(address = %self.address, nonce = n, "nonce initialized from pending count");
                Ok(())
            })
            .await
            .map(|_| ())
    }

    /// Allocate the next nonce. The only safe way to obtain one.
    pub async fn next(&self) -> RpcResult<u64> {
        self.ensure_init().await?;
        Ok(self.current.fetch_add(1, Ordering::SeqCst))
    }

    /// Current counter value without allocating.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Force the counter; external recovery only.
    pub fn reset(&self, nonce: u64) {
        debug!(nonce, "nonce counter reset");
        self.current.store(nonce, Ordering::SeqCst);
    }
}
