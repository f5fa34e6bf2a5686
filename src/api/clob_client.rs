//! Polymarket CLOB client for order execution.
//!
//! The CLOB is Polymarket's off-chain order matching engine settling on
//! Polygon. This client covers what the order gateway needs: order book
//! reads, EIP-712 order signing, and fill-or-kill order submission.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{keccak256, Address, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const CLOB_URL: &str = "https://clob.polymarket.com";

/// Polymarket CTF Exchange contract on Polygon.
pub const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Order direction in the CLOB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    fn as_u8(&self) -> u8 {
        match self {
            OrderSide::Buy => 0,
            OrderSide::Sell => 1,
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Good-til-cancelled limit order
    Gtc,
    /// Fill-or-kill market order
    Fok,
}

/// Order signed and ready for submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub salt: String,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub side: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub signature_type: u8,
    pub signature: String,
}

/// Submission body for the /order endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order: SignedOrder,
    pub owner: String,
    pub order_type: OrderType,
}

/// Response from order placement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub error_msg: String,
    pub status: Option<String>,
    pub transaction_hash: Option<String>,
}

/// One price level of the order book.
#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    pub price: String,
    pub size: String,
}

/// Order book for one outcome token.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// CLOB API client holding the signing key and API credentials.
pub struct ClobClient {
    http: Client,
    signer: PrivateKeySigner,
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    chain_id: u64,
}

impl ClobClient {
    pub fn new(
        private_key: &str,
        api_key: &str,
        api_secret: &str,
        api_passphrase: &str,
        chain_id: u64,
    ) -> Result<Self> {
        let pk = private_key.strip_prefix("0x").unwrap_or(private_key);
        let signer = PrivateKeySigner::from_str(pk).context("Invalid private key")?;

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            signer,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            api_passphrase: api_passphrase.to_string(),
            chain_id,
        })
    }

    /// Create from environment variables:
    /// - POLYMARKET_PRIVATE_KEY
    /// - POLYMARKET_API_KEY
    /// - POLYMARKET_API_SECRET
    /// - POLYMARKET_API_PASSPHRASE
    /// - POLYMARKET_CHAIN_ID (defaults to 137)
    pub fn from_env() -> Result<Self> {
        let private_key =
            std::env::var("POLYMARKET_PRIVATE_KEY").context("POLYMARKET_PRIVATE_KEY not set")?;
        let api_key = std::env::var("POLYMARKET_API_KEY").context("POLYMARKET_API_KEY not set")?;
        let api_secret =
            std::env::var("POLYMARKET_API_SECRET").context("POLYMARKET_API_SECRET not set")?;
        let api_passphrase = std::env::var("POLYMARKET_API_PASSPHRASE")
            .context("POLYMARKET_API_PASSPHRASE not set")?;
        let chain_id: u64 = std::env::var("POLYMARKET_CHAIN_ID")
            .unwrap_or_else(|_| "137".to_string())
            .parse()
            .context("Invalid POLYMARKET_CHAIN_ID")?;

        Self::new(&private_key, &api_key, &api_secret, &api_passphrase, chain_id)
    }

    /// Wallet address of the signing key.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Fetch the order book for a token.
    pub async fn get_order_book(&self, token_id: &str) -> Result<OrderBook> {
        let url = format!("{}/book?token_id={}", CLOB_URL, token_id);
        let resp = self
            .http
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to get order book: {} - {}", status, text));
        }

        resp.json().await.context("Failed to parse order book")
    }

    /// Best bid price for a token, if any.
    pub async fn get_best_bid(&self, token_id: &str) -> Result<Option<Decimal>> {
        let book = self.get_order_book(token_id).await?;
        book.bids
            .first()
            .map(|level| Decimal::from_str(&level.price).context("Bad bid price"))
            .transpose()
    }

    /// Best ask price for a token, if any.
    pub async fn get_best_ask(&self, token_id: &str) -> Result<Option<Decimal>> {
        let book = self.get_order_book(token_id).await?;
        book.asks
            .first()
            .map(|level| Decimal::from_str(&level.price).context("Bad ask price"))
            .transpose()
    }

    /// Sign and submit an order.
    pub async fn place_order(
        &self,
        token_id: &str,
        side: OrderSide,
        size: Decimal,
        price: Decimal,
        order_type: OrderType,
    ) -> Result<OrderResponse> {
        let order = self.build_signed_order(token_id, side, size, price).await?;

        let payload = OrderPayload {
            order,
            owner: format!("{:?}", self.address()),
            order_type,
        };

        let url = format!("{}/order", CLOB_URL);
        let resp = self
            .http
            .post(&url)
            .headers(self.auth_headers()?)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Order placement failed: {} - {}", status, text));
        }

        resp.json().await.context("Failed to parse order response")
    }

    async fn build_signed_order(
        &self,
        token_id: &str,
        side: OrderSide,
        size: Decimal,
        price: Decimal,
    ) -> Result<SignedOrder> {
        let maker = format!("{:?}", self.address());

        // BUY gives USDC for shares, SELL gives shares for USDC.
        let usdc_amount = size * price;
        let (maker_amount, taker_amount) = match side {
            OrderSide::Buy => (to_usdc_units(usdc_amount), to_usdc_units(size)),
            OrderSide::Sell => (to_usdc_units(size), to_usdc_units(usdc_amount)),
        };

        let salt = random_u128_string();
        let nonce = random_u128_string();
        let expiration = (SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() + 3600).to_string();
        let fee_rate_bps = "0".to_string();

        let signature = self
            .sign_order(
                &salt,
                &maker,
                token_id,
                &maker_amount,
                &taker_amount,
                &expiration,
                &nonce,
                &fee_rate_bps,
                side.as_u8(),
            )
            .await?;

        Ok(SignedOrder {
            salt,
            signer: maker.clone(),
            maker,
            taker: ZERO_ADDRESS.to_string(),
            token_id: token_id.to_string(),
            maker_amount,
            taker_amount,
            side: side.as_str().to_string(),
            expiration,
            nonce,
            fee_rate_bps,
            signature_type: 0, // EOA
            signature,
        })
    }

    /// EIP-712 signature over the CTF Exchange order struct.
    async fn sign_order(
        &self,
        salt: &str,
        maker: &str,
        token_id: &str,
        maker_amount: &str,
        taker_amount: &str,
        expiration: &str,
        nonce: &str,
        fee_rate_bps: &str,
        side: u8,
    ) -> Result<String> {
        let type_hash = keccak256(
            b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)"
        );

        let mut encoded = Vec::with_capacity(13 * 32);
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(&word_uint(salt)?);
        encoded.extend_from_slice(&word_address(maker)?);
        encoded.extend_from_slice(&word_address(maker)?);
        encoded.extend_from_slice(&word_address(ZERO_ADDRESS)?);
        encoded.extend_from_slice(&word_uint(token_id)?);
        encoded.extend_from_slice(&word_uint(maker_amount)?);
        encoded.extend_from_slice(&word_uint(taker_amount)?);
        encoded.extend_from_slice(&word_uint(expiration)?);
        encoded.extend_from_slice(&word_uint(nonce)?);
        encoded.extend_from_slice(&word_uint(fee_rate_bps)?);
        encoded.extend_from_slice(&word_u8(side));
        encoded.extend_from_slice(&word_u8(0)); // EOA signature type
        let order_hash = keccak256(&encoded);

        let domain_hash = self.domain_separator()?;

        // keccak256("\x19\x01" || domainSeparator || orderHash)
        let mut message = Vec::with_capacity(2 + 64);
        message.extend_from_slice(&[0x19, 0x01]);
        message.extend_from_slice(domain_hash.as_slice());
        message.extend_from_slice(order_hash.as_slice());
        let digest = keccak256(&message);

        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .context("Failed to sign order")?;

        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }

    fn domain_separator(&self) -> Result<alloy_primitives::B256> {
        let type_hash = keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let name_hash = keccak256(b"Polymarket CTF Exchange");
        let version_hash = keccak256(b"1");

        let mut encoded = Vec::with_capacity(5 * 32);
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(name_hash.as_slice());
        encoded.extend_from_slice(version_hash.as_slice());
        encoded.extend_from_slice(&word_uint(&self.chain_id.to_string())?);
        encoded.extend_from_slice(&word_address(CTF_EXCHANGE)?);

        Ok(keccak256(&encoded))
    }

    /// Authentication headers expected by the CLOB API.
    fn auth_headers(&self) -> Result<HeaderMap> {
        let timestamp = Utc::now().timestamp().to_string();
        let digest = keccak256(format!("{}{}", timestamp, self.api_secret).as_bytes());
        let signature = format!("0x{}", hex::encode(digest.as_slice()));

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("poly-address"),
            HeaderValue::from_str(&format!("{:?}", self.address()))?,
        );
        headers.insert(
            HeaderName::from_static("poly-signature"),
            HeaderValue::from_str(&signature)?,
        );
        headers.insert(
            HeaderName::from_static("poly-timestamp"),
            HeaderValue::from_str(&timestamp)?,
        );
        headers.insert(
            HeaderName::from_static("poly-api-key"),
            HeaderValue::from_str(&self.api_key)?,
        );
        headers.insert(
            HeaderName::from_static("poly-passphrase"),
            HeaderValue::from_str(&self.api_passphrase)?,
        );

        Ok(headers)
    }
}

/// Convert a USDC/share amount to integer base units (6 decimals).
fn to_usdc_units(amount: Decimal) -> String {
    let units = amount * Decimal::from(1_000_000u64);
    units
        .to_string()
        .split('.')
        .next()
        .unwrap_or("0")
        .to_string()
}

/// ABI-encode a uint256 given as a decimal string.
fn word_uint(value: &str) -> Result<[u8; 32]> {
    let n = U256::from_str(value).unwrap_or(U256::ZERO);
    Ok(n.to_be_bytes())
}

/// ABI-encode an address, left-padded to 32 bytes.
fn word_address(addr: &str) -> Result<[u8; 32]> {
    let addr = Address::from_str(addr.strip_prefix("0x").unwrap_or(addr))?;
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(addr.as_slice());
    Ok(word)
}

/// ABI-encode a uint8, left-padded to 32 bytes.
fn word_u8(value: u8) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[31] = value;
    word
}

fn random_u128_string() -> String {
    uuid::Uuid::new_v4().as_u128().to_string()
}
