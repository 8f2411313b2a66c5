use anchor_lang::AccountDeserialize;
use anchor_spl::token::TokenAccount;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{v0, AddressLookupTableAccount, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signature, Signer};
use solana_sdk::transaction::VersionedTransaction;
use stellalpha_vault::state::{GlobalConfig, TraderState, UserVault};

/// Fixed metadata prefix of an address lookup table account; the addresses
/// follow as packed 32-byte keys.
const LOOKUP_TABLE_META_SIZE: usize = 56;

/// What the relayer reads from and writes to the ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Key that signs and pays for relayed swaps.
    fn authority(&self) -> Pubkey;

    async fn trader_state(&self, address: &Pubkey) -> Result<Option<TraderState>>;

    async fn vault(&self, address: &Pubkey) -> Result<Option<UserVault>>;

    async fn global_config(&self, address: &Pubkey) -> Result<GlobalConfig>;

    /// `None` when the token account does not exist yet.
    async fn token_balance(&self, token_account: &Pubkey) -> Result<Option<u64>>;

    async fn submit(
        &self,
        instructions: Vec<Instruction>,
        lookup_tables: &[Pubkey],
    ) -> Result<Signature>;
}

pub struct RpcLedger {
    rpc: RpcClient,
    authority: Keypair,
}

impl RpcLedger {
    pub fn new(rpc_url: &str, keypair_path: &str) -> Result<Self> {
        let authority = read_keypair_file(keypair_path)
            .map_err(|error| anyhow!("failed reading authority keypair {keypair_path}: {error}"))?;
        Ok(Self {
            rpc: RpcClient::new_with_commitment(
                rpc_url.trim().to_string(),
                CommitmentConfig::confirmed(),
            ),
            authority,
        })
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.rpc.commitment())
            .await
            .with_context(|| format!("failed fetching account {address}"))?;
        Ok(response.value.map(|account| account.data))
    }

    async fn lookup_table_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let accounts = self
            .rpc
            .get_multiple_accounts(addresses)
            .await
            .context("failed fetching address lookup tables")?;
        addresses
            .iter()
            .zip(accounts)
            .map(|(key, account)| {
                let account =
                    account.ok_or_else(|| anyhow!("address lookup table {key} not found"))?;
                Ok(AddressLookupTableAccount {
                    key: *key,
                    addresses: lookup_table_addresses(&account.data)
                        .with_context(|| format!("malformed address lookup table {key}"))?,
                })
            })
            .collect()
    }
}

fn lookup_table_addresses(data: &[u8]) -> Result<Vec<Pubkey>> {
    let body = data
        .get(LOOKUP_TABLE_META_SIZE..)
        .ok_or_else(|| anyhow!("account shorter than lookup table header"))?;
    if body.len() % 32 != 0 {
        return Err(anyhow!("lookup table body is not a whole number of keys"));
    }
    body.chunks_exact(32)
        .map(|chunk| {
            <[u8; 32]>::try_from(chunk)
                .map(Pubkey::new_from_array)
                .map_err(|_| anyhow!("bad key length"))
        })
        .collect()
}

fn decode_account<T: AccountDeserialize>(data: &[u8], what: &str) -> Result<T> {
    let mut slice = data;
    T::try_deserialize(&mut slice).map_err(|error| anyhow!("failed decoding {what}: {error}"))
}

#[async_trait]
impl Ledger for RpcLedger {
    fn authority(&self) -> Pubkey {
        self.authority.pubkey()
    }

    async fn trader_state(&self, address: &Pubkey) -> Result<Option<TraderState>> {
        self.account_data(address)
            .await?
            .map(|data| decode_account(&data, "trader state"))
            .transpose()
    }

    async fn vault(&self, address: &Pubkey) -> Result<Option<UserVault>> {
        self.account_data(address)
            .await?
            .map(|data| decode_account(&data, "vault"))
            .transpose()
    }

    async fn global_config(&self, address: &Pubkey) -> Result<GlobalConfig> {
        let data = self
            .account_data(address)
            .await?
            .ok_or_else(|| anyhow!("global config {address} is not initialised"))?;
        decode_account(&data, "global config")
    }

    async fn token_balance(&self, token_account: &Pubkey) -> Result<Option<u64>> {
        self.account_data(token_account)
            .await?
            .map(|data| decode_account::<TokenAccount>(&data, "token account").map(|a| a.amount))
            .transpose()
    }

    async fn submit(
        &self,
        instructions: Vec<Instruction>,
        lookup_tables: &[Pubkey],
    ) -> Result<Signature> {
        let tables = self.lookup_table_accounts(lookup_tables).await?;
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .context("failed fetching latest blockhash")?;
        let message =
            v0::Message::try_compile(&self.authority.pubkey(), &instructions, &tables, blockhash)
                .context("failed compiling v0 message")?;
        let transaction =
            VersionedTransaction::try_new(VersionedMessage::V0(message), &[&self.authority])
                .context("failed signing transaction")?;
        self.rpc
            .send_and_confirm_transaction(&transaction)
            .await
            .context("transaction was not confirmed")
    }
}
